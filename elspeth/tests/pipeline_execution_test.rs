// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end: a three-row linear pipeline (source → multiply → sink)
//! leaves complete audit evidence: one row and token per source row,
//! completed node-states at the transform and sink, one artifact with a
//! content hash, and a FULL_REPRODUCIBLE grade.

mod common;

use elspeth_domain::entities::{NodeStateStatus, NodeType, TerminalState};
use elspeth_domain::repositories::LandscapeInspector;
use elspeth_domain::services::canonical_hash;
use elspeth_domain::{ReproducibilityGrade, RunStatus};
use serde_json::json;

#[tokio::test]
async fn three_row_linear_pipeline_records_full_lineage() {
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"value": 1}), json!({"value": 2}), json!({"value": 3})],
        vec![common::plugin("multiply", json!({"field": "value", "factor": 2.0}))],
        &["default"],
    ));
    let harness = common::harness(settings).await;

    let report = common::execute(&harness).await.expect("run should complete");
    let run_id = report.run.run_id;

    // Run-level evidence.
    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(
        report.run.reproducibility_grade,
        Some(ReproducibilityGrade::FullReproducible)
    );
    assert_eq!(report.summary.rows_seen, 3);
    assert_eq!(report.summary.rows_completed, 3);
    assert_eq!(report.summary.rows_failed, 0);
    assert_eq!(report.summary.artifacts_written, 1);

    // Graph evidence: source + transform + sink.
    let nodes = harness.landscape.load_nodes(run_id).await.unwrap();
    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().any(|n| n.node_type == NodeType::Source));
    assert!(nodes.iter().any(|n| n.node_type == NodeType::Transform));
    assert!(nodes.iter().any(|n| n.node_type == NodeType::Sink));

    let transform_node = nodes
        .iter()
        .find(|n| n.node_type == NodeType::Transform)
        .unwrap();
    let sink_node = nodes.iter().find(|n| n.node_type == NodeType::Sink).unwrap();

    // Row-level evidence.
    let rows = harness.landscape.list_rows(run_id).await.unwrap();
    assert_eq!(rows.len(), 3);

    for (index, row) in rows.iter().enumerate() {
        assert_eq!(row.row_index, index as i64);
        let original = json!({"value": (index as i64) + 1});
        assert_eq!(row.source_data_hash, canonical_hash(&original).unwrap());

        let lineage = harness.landscape.explain_row(run_id, row.row_id).await.unwrap();
        assert!(lineage.payload_available);
        assert_eq!(lineage.source_data, Some(original));
        assert_eq!(lineage.tokens.len(), 1);

        let token = &lineage.tokens[0];
        assert_eq!(token.terminal_state, TerminalState::Completed);

        let transform_state = token
            .states
            .iter()
            .find(|s| s.node_id == transform_node.node_id)
            .expect("transform state recorded");
        assert_eq!(transform_state.status, NodeStateStatus::Completed);
        let doubled = json!({"value": ((index as i64) + 1) * 2});
        assert_eq!(
            transform_state.output_hash.as_deref(),
            Some(canonical_hash(&doubled).unwrap().as_str())
        );

        let sink_state = token
            .states
            .iter()
            .find(|s| s.node_id == sink_node.node_id)
            .expect("sink state recorded");
        assert_eq!(sink_state.status, NodeStateStatus::Completed);

        // One artifact per sink write, with hash and size present.
        assert_eq!(lineage.artifacts.len(), 1);
        let artifact = &lineage.artifacts[0];
        assert!(!artifact.content_hash.is_empty());
        assert!(artifact.size_bytes > 0);
    }

    // Checkpoints are deleted on successful completion.
    assert!(!harness.landscape.can_resume(run_id).await.unwrap());

    // Nothing is left unprocessed.
    assert!(harness.landscape.unprocessed_rows(run_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn business_error_fails_only_the_row() {
    // Row 2 is missing the field the transform needs; the other rows
    // complete and the run itself still completes.
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"value": 1}), json!({"other": 9}), json!({"value": 3})],
        vec![common::plugin("multiply", json!({"field": "value", "factor": 2.0}))],
        &["default"],
    ));
    let harness = common::harness(settings).await;

    let report = common::execute(&harness).await.expect("run should complete");
    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.summary.rows_completed, 2);
    assert_eq!(report.summary.rows_failed, 1);

    let rows = harness.landscape.list_rows(report.run.run_id).await.unwrap();
    let failed = harness
        .landscape
        .explain_row(report.run.run_id, rows[1].row_id)
        .await
        .unwrap();
    assert_eq!(failed.tokens[0].terminal_state, TerminalState::Failed);
    let state = failed.tokens[0].states.last().unwrap();
    assert_eq!(state.status, NodeStateStatus::Failed);
    assert_eq!(
        state.error_json.as_ref().unwrap()["reason"],
        json!("missing_field")
    );
}
