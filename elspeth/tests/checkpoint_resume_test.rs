// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Crash and resume: a failed 10-row run with rows 0-4 already completed
//! at the sink resumes from its checkpoints, replays exactly rows 5-9
//! against their original row and token identities, and finishes with all
//! ten rows COMPLETED and the checkpoints deleted.

mod common;

use elspeth::application::services::{build_pipeline, Orchestrator, RecoveryManager};
use elspeth::infrastructure::config::RuntimeConfig;
use elspeth_domain::entities::{NodeRegistration, NodeStateStatus, NodeType, TerminalState};
use elspeth_domain::repositories::{LandscapeInspector, LandscapeRecorder};
use elspeth_domain::services::CANONICAL_VERSION;
use elspeth_domain::value_objects::RoutingMode;
use elspeth_domain::{Determinism, RunStatus};
use serde_json::json;

fn ten_row_settings() -> elspeth::infrastructure::config::Settings {
    let rows: Vec<serde_json::Value> = (0..10).map(|i| json!({"value": i})).collect();
    common::settings_with(common::linear_pipeline(
        rows,
        vec![common::plugin("multiply", json!({"field": "value", "factor": 2.0}))],
        &["default"],
    ))
}

#[tokio::test]
async fn failed_run_resumes_only_unprocessed_rows() {
    let settings = ten_row_settings();
    let harness = common::harness(settings.clone()).await;
    let recorder: &dyn LandscapeRecorder = harness.landscape.as_ref();

    // ---- Fixture: a run that failed after rows 0-4 reached the sink ----
    let run = recorder
        .begin_run(&settings.to_json().unwrap(), CANONICAL_VERSION)
        .await
        .unwrap();
    let run_id = run.run_id;

    let source_node = recorder
        .register_node(
            run_id,
            NodeRegistration {
                plugin_name: "memory".to_string(),
                plugin_version: "1.0.0".to_string(),
                node_type: NodeType::Source,
                determinism: Determinism::Deterministic,
                config: json!({"rows": 10}),
                schema_hash: None,
                sequence_in_pipeline: Some(0),
            },
        )
        .await
        .unwrap();
    let transform_node = recorder
        .register_node(
            run_id,
            NodeRegistration {
                plugin_name: "multiply".to_string(),
                plugin_version: "1.0.0".to_string(),
                node_type: NodeType::Transform,
                determinism: Determinism::Deterministic,
                config: json!({"field": "value", "factor": 2.0}),
                schema_hash: None,
                sequence_in_pipeline: Some(1),
            },
        )
        .await
        .unwrap();
    let sink_node = recorder
        .register_node(
            run_id,
            NodeRegistration {
                plugin_name: "default".to_string(),
                plugin_version: "1.0.0".to_string(),
                node_type: NodeType::Sink,
                determinism: Determinism::IoWrite,
                config: json!({"sink_name": "default"}),
                schema_hash: None,
                sequence_in_pipeline: Some(2),
            },
        )
        .await
        .unwrap();
    recorder
        .register_edge(
            run_id,
            transform_node.node_id,
            sink_node.node_id,
            "continue",
            RoutingMode::Move,
        )
        .await
        .unwrap();

    for i in 0..10i64 {
        let data = json!({"value": i});
        let row = recorder
            .create_row(run_id, source_node.node_id, i, &data)
            .await
            .unwrap();
        let token = recorder.create_token(row.row_id).await.unwrap();

        if i < 5 {
            let doubled = json!({"value": i * 2});
            let transform_state = recorder
                .begin_node_state(token.token_id, transform_node.node_id, 1, &data)
                .await
                .unwrap();
            recorder
                .complete_node_state(
                    transform_state.state_id,
                    NodeStateStatus::Completed,
                    Some(&doubled),
                    1,
                    None,
                )
                .await
                .unwrap();

            let sink_state = recorder
                .begin_node_state(token.token_id, sink_node.node_id, 2, &doubled)
                .await
                .unwrap();
            recorder
                .complete_node_state(
                    sink_state.state_id,
                    NodeStateStatus::Completed,
                    Some(&doubled),
                    1,
                    None,
                )
                .await
                .unwrap();

            recorder
                .create_checkpoint(run_id, token.token_id, sink_node.node_id, i + 1, None)
                .await
                .unwrap();
        }
    }

    recorder
        .complete_run(run_id, RunStatus::Failed, None)
        .await
        .unwrap();

    // ---- Read path: resumability and the unprocessed set ----
    assert!(harness.landscape.can_resume(run_id).await.unwrap());

    let recovery = RecoveryManager::new(harness.landscape.clone());
    let (run, resume_point) = recovery.prepare_resume(run_id).await.unwrap();
    assert_eq!(resume_point.sequence_number, 5);

    let unprocessed = harness.landscape.unprocessed_rows(run_id).await.unwrap();
    assert_eq!(
        unprocessed.iter().map(|r| r.row_index).collect::<Vec<_>>(),
        vec![5, 6, 7, 8, 9]
    );

    // ---- Resume through the normal orchestrator machinery ----
    let run_settings =
        elspeth::infrastructure::config::Settings::from_run_settings(&run.settings_json).unwrap();
    let config = RuntimeConfig::from_settings(&run_settings).unwrap();
    let pipeline = build_pipeline(&run_settings.pipeline).unwrap();
    let orchestrator = Orchestrator::new(
        harness.landscape.clone(),
        harness.landscape.clone(),
        config,
        run_settings,
        pipeline,
        None,
        None,
        resume_point.sequence_number,
    );

    let report = orchestrator.resume(run, resume_point).await.unwrap();
    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.summary.rows_seen, 5);
    assert_eq!(report.summary.rows_completed, 5);

    // All ten rows now derive COMPLETED through their original tokens.
    let rows = harness.landscape.list_rows(run_id).await.unwrap();
    assert_eq!(rows.len(), 10);
    for row in &rows {
        let lineage = harness.landscape.explain_row(run_id, row.row_id).await.unwrap();
        assert_eq!(lineage.tokens.len(), 1, "resume reuses the original token");
        assert_eq!(lineage.tokens[0].terminal_state, TerminalState::Completed);
    }

    assert!(harness.landscape.unprocessed_rows(run_id).await.unwrap().is_empty());

    // Checkpoints are deleted on successful completion, so the run can no
    // longer resume.
    assert!(!harness.landscape.can_resume(run_id).await.unwrap());
}

#[tokio::test]
async fn resume_refuses_completed_runs() {
    let settings = ten_row_settings();
    let harness = common::harness(settings).await;

    let report = common::execute(&harness).await.unwrap();
    let recovery = RecoveryManager::new(harness.landscape.clone());

    let error = recovery.prepare_resume(report.run.run_id).await.unwrap_err();
    assert!(matches!(
        error,
        elspeth_domain::EngineError::ResumeRefused(_)
    ));
    assert!(error.to_string().contains("already completed"));
}
