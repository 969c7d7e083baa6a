// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end retry: a transform that fails twice then succeeds leaves
//! three node-state rows: attempts 1 and 2 failed with error payloads,
//! attempt 3 completed with an output hash.

mod common;

use elspeth_domain::entities::{NodeStateStatus, NodeType, TerminalState};
use elspeth_domain::repositories::LandscapeInspector;
use elspeth_domain::RunStatus;
use serde_json::json;

#[tokio::test]
async fn retry_records_one_state_per_attempt() {
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"value": 7})],
        vec![common::plugin_with_retry(
            "flaky",
            json!({"fail_times": 2, "mode": "exception"}),
            3,
        )],
        &["default"],
    ));
    let harness = common::harness(settings).await;

    let report = common::execute(&harness).await.expect("run should complete");
    let run_id = report.run.run_id;
    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.summary.rows_completed, 1);

    let nodes = harness.landscape.load_nodes(run_id).await.unwrap();
    let transform_node = nodes
        .iter()
        .find(|n| n.node_type == NodeType::Transform)
        .unwrap();

    let rows = harness.landscape.list_rows(run_id).await.unwrap();
    let lineage = harness.landscape.explain_row(run_id, rows[0].row_id).await.unwrap();
    let token = &lineage.tokens[0];
    assert_eq!(token.terminal_state, TerminalState::Completed);

    let mut attempts: Vec<_> = token
        .states
        .iter()
        .filter(|s| s.node_id == transform_node.node_id)
        .collect();
    attempts.sort_by_key(|s| s.attempt);

    // Monotonic attempts 1..=3 with no gaps.
    assert_eq!(
        attempts.iter().map(|s| s.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    for failed in &attempts[0..2] {
        assert_eq!(failed.status, NodeStateStatus::Failed);
        assert!(failed.error_json.is_some());
        assert!(failed.output_hash.is_none());
    }

    let succeeded = attempts[2];
    assert_eq!(succeeded.status, NodeStateStatus::Completed);
    assert!(succeeded.output_hash.is_some());
}

#[tokio::test]
async fn exhausted_retries_fail_the_row_not_the_run() {
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"value": 7}), json!({"value": 8})],
        vec![common::plugin_with_retry(
            "flaky",
            json!({"fail_times": 100, "mode": "exception"}),
            2,
        )],
        &["default"],
    ));
    let harness = common::harness(settings).await;

    let report = common::execute(&harness).await.expect("run continues past failed rows");
    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.summary.rows_failed, 2);
    assert_eq!(report.summary.rows_completed, 0);

    let rows = harness.landscape.list_rows(report.run.run_id).await.unwrap();
    let lineage = harness
        .landscape
        .explain_row(report.run.run_id, rows[0].row_id)
        .await
        .unwrap();
    let token = &lineage.tokens[0];
    assert_eq!(token.terminal_state, TerminalState::Failed);
    // Two attempts, both failed.
    assert_eq!(token.states.len(), 2);
    assert!(token
        .states
        .iter()
        .all(|s| s.status == NodeStateStatus::Failed));
}
