// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Recorder integrity: the audit invariants the Landscape enforces at the
//! write path: monotonic attempts, one-shot state completion, the batch
//! lifecycle, edge label uniqueness, artifact requirements, and content
//! fidelity between hashes and stored payloads.

mod common;

use elspeth_domain::entities::{BatchStatus, NodeRegistration, NodeStateStatus, NodeType};
use elspeth_domain::repositories::{LandscapeInspector, LandscapeRecorder, PayloadStore};
use elspeth_domain::services::{canonical_hash, CANONICAL_VERSION};
use elspeth_domain::value_objects::RoutingMode;
use elspeth_domain::{Determinism, EngineError};
use serde_json::json;

struct Fixture {
    harness: common::Harness,
    run_id: elspeth_domain::value_objects::RunId,
    node_id: elspeth_domain::value_objects::NodeId,
    token_id: elspeth_domain::value_objects::TokenId,
}

async fn fixture() -> Fixture {
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"value": 1})],
        vec![],
        &["default"],
    ));
    let harness = common::harness(settings.clone()).await;
    let recorder: &dyn LandscapeRecorder = harness.landscape.as_ref();

    let run = recorder
        .begin_run(&settings.to_json().unwrap(), CANONICAL_VERSION)
        .await
        .unwrap();
    let node = recorder
        .register_node(
            run.run_id,
            NodeRegistration {
                plugin_name: "probe".to_string(),
                plugin_version: "1.0.0".to_string(),
                node_type: NodeType::Transform,
                determinism: Determinism::Deterministic,
                config: json!({}),
                schema_hash: None,
                sequence_in_pipeline: Some(1),
            },
        )
        .await
        .unwrap();
    let row = recorder
        .create_row(run.run_id, node.node_id, 0, &json!({"value": 1}))
        .await
        .unwrap();
    let token = recorder.create_token(row.row_id).await.unwrap();

    Fixture {
        run_id: run.run_id,
        node_id: node.node_id,
        token_id: token.token_id,
        harness,
    }
}

fn recorder_of(harness: &common::Harness) -> &dyn LandscapeRecorder {
    harness.landscape.as_ref()
}

#[tokio::test]
async fn attempts_are_monotonic_without_gaps() {
    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);

    for expected in 1..=3i64 {
        let state = recorder
            .begin_node_state(fx.token_id, fx.node_id, 1, &json!({"value": 1}))
            .await
            .unwrap();
        assert_eq!(state.attempt, expected);
        recorder
            .complete_node_state(
                state.state_id,
                NodeStateStatus::Failed,
                None,
                1,
                Some(&json!({"reason": "test_error"})),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn state_completion_is_one_shot() {
    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);

    let state = recorder
        .begin_node_state(fx.token_id, fx.node_id, 1, &json!({"value": 1}))
        .await
        .unwrap();
    recorder
        .complete_node_state(state.state_id, NodeStateStatus::Completed, Some(&json!({"v": 2})), 1, None)
        .await
        .unwrap();

    let second = recorder
        .complete_node_state(state.state_id, NodeStateStatus::Failed, None, 1, None)
        .await;
    assert!(matches!(second, Err(EngineError::IntegrityViolation(_))));
}

#[tokio::test]
async fn open_is_not_a_completion_status() {
    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);

    let state = recorder
        .begin_node_state(fx.token_id, fx.node_id, 1, &json!({"value": 1}))
        .await
        .unwrap();
    let result = recorder
        .complete_node_state(state.state_id, NodeStateStatus::Open, None, 1, None)
        .await;
    assert!(matches!(result, Err(EngineError::IntegrityViolation(_))));
}

#[tokio::test]
async fn batch_lifecycle_is_enforced() {
    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);

    let batch = recorder.create_batch(fx.run_id, fx.node_id).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Draft);

    recorder
        .add_batch_member(batch.batch_id, fx.token_id, 0)
        .await
        .unwrap();

    // Draft cannot jump straight to completed.
    let skip = recorder
        .update_batch_status(batch.batch_id, BatchStatus::Completed, None)
        .await;
    assert!(matches!(skip, Err(EngineError::IntegrityViolation(_))));

    recorder
        .update_batch_status(batch.batch_id, BatchStatus::Executing, Some("test"))
        .await
        .unwrap();

    // Executing forbids new members.
    let late = recorder.add_batch_member(batch.batch_id, fx.token_id, 1).await;
    assert!(matches!(late, Err(EngineError::IntegrityViolation(_))));

    let done = recorder
        .update_batch_status(batch.batch_id, BatchStatus::Completed, None)
        .await
        .unwrap();
    assert_eq!(done.status, BatchStatus::Completed);
    assert!(done.flushed_at.is_some());

    // Terminal states admit no further transitions.
    let reopen = recorder
        .update_batch_status(batch.batch_id, BatchStatus::Executing, None)
        .await;
    assert!(matches!(reopen, Err(EngineError::IntegrityViolation(_))));
}

#[tokio::test]
async fn edge_labels_are_unique_per_source_node() {
    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);

    recorder
        .register_edge(fx.run_id, fx.node_id, fx.node_id, "out", RoutingMode::Move)
        .await
        .unwrap();
    let duplicate = recorder
        .register_edge(fx.run_id, fx.node_id, fx.node_id, "out", RoutingMode::Copy)
        .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn artifacts_require_a_content_hash() {
    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);

    let state = recorder
        .begin_node_state(fx.token_id, fx.node_id, 1, &json!({"value": 1}))
        .await
        .unwrap();

    let result = recorder
        .register_artifact(
            fx.run_id,
            state.state_id,
            fx.node_id,
            elspeth_domain::ArtifactType::File,
            "out.jsonl",
            "",
            0,
            None,
        )
        .await;
    assert!(matches!(result, Err(EngineError::IntegrityViolation(_))));
}

#[tokio::test]
async fn stored_payload_rehashes_to_the_recorded_hash() {
    let fx = fixture().await;

    let rows = fx.harness.landscape.list_rows(fx.run_id).await.unwrap();
    let row = &rows[0];

    let blob = fx
        .harness
        .payloads
        .retrieve(row.source_data_ref.as_ref().unwrap())
        .await
        .unwrap()
        .expect("payload stored at ingestion");
    let value: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    assert_eq!(canonical_hash(&value).unwrap(), row.source_data_hash);
}

#[tokio::test]
async fn fail_open_states_closes_only_open_states() {
    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);

    let completed = recorder
        .begin_node_state(fx.token_id, fx.node_id, 1, &json!({"value": 1}))
        .await
        .unwrap();
    recorder
        .complete_node_state(completed.state_id, NodeStateStatus::Completed, None, 1, None)
        .await
        .unwrap();

    let open = recorder
        .begin_node_state(fx.token_id, fx.node_id, 1, &json!({"value": 1}))
        .await
        .unwrap();

    let closed = recorder.fail_open_states(fx.run_id, "cancelled").await.unwrap();
    assert_eq!(closed, 1);

    let lineage = fx
        .harness
        .landscape
        .explain_row(fx.run_id, fx.harness.landscape.list_rows(fx.run_id).await.unwrap()[0].row_id)
        .await
        .unwrap();
    let states = &lineage.tokens[0].states;
    let reopened = states.iter().find(|s| s.state_id == open.state_id).unwrap();
    assert_eq!(reopened.status, NodeStateStatus::Failed);
    assert_eq!(reopened.error_json.as_ref().unwrap()["cancelled"], json!(true));
    let untouched = states
        .iter()
        .find(|s| s.state_id == completed.state_id)
        .unwrap();
    assert_eq!(untouched.status, NodeStateStatus::Completed);
}

#[tokio::test]
async fn fork_and_coalesce_parentage_drive_terminal_states() {
    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);
    let rows = fx.harness.landscape.list_rows(fx.run_id).await.unwrap();
    let row_id = rows[0].row_id;

    let branches = vec!["left".to_string(), "right".to_string()];
    let children = recorder
        .fork_token(fx.token_id, row_id, &branches, 2)
        .await
        .unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].branch_name.as_deref(), Some("left"));

    assert_eq!(
        fx.harness
            .landscape
            .derive_terminal_state(fx.token_id)
            .await
            .unwrap(),
        elspeth_domain::TerminalState::Forked
    );

    let child_ids: Vec<_> = children.iter().map(|c| c.token_id).collect();
    let merged = recorder.coalesce_tokens(&child_ids, row_id, 3).await.unwrap();
    for child in &children {
        assert_eq!(
            fx.harness
                .landscape
                .derive_terminal_state(child.token_id)
                .await
                .unwrap(),
            elspeth_domain::TerminalState::Coalesced
        );
    }
    assert_eq!(
        fx.harness
            .landscape
            .derive_terminal_state(merged.token_id)
            .await
            .unwrap(),
        elspeth_domain::TerminalState::InFlight
    );
}

#[tokio::test]
async fn external_calls_attach_to_their_state_with_payload_refs() {
    use elspeth_domain::entities::{CallDraft, CallStatus, CallType, TokenUsage};

    let fx = fixture().await;
    let recorder = recorder_of(&fx.harness);

    let state = recorder
        .begin_node_state(fx.token_id, fx.node_id, 1, &json!({"value": 1}))
        .await
        .unwrap();

    let call = recorder
        .record_call(
            state.state_id,
            CallDraft {
                call_type: CallType::Llm,
                provider: "azure".to_string(),
                status: CallStatus::Success,
                latency_ms: 420,
                request: Some(json!({"prompt": "double it"})),
                response: Some(json!({"completion": "2"})),
                token_usage: Some(TokenUsage {
                    prompt_tokens: Some(12),
                    completion_tokens: Some(1),
                    total_tokens: Some(13),
                }),
            },
        )
        .await
        .unwrap();

    assert_eq!(call.state_id, state.state_id);
    let request_ref = call.request_ref.expect("request payload stored");
    let blob = fx
        .harness
        .payloads
        .retrieve(&request_ref)
        .await
        .unwrap()
        .expect("request blob resolvable");
    let value: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    assert_eq!(canonical_hash(&value).unwrap(), request_ref);
}
