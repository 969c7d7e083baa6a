// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Aggregation batching: accepted tokens become batch members in
//! acceptance order, the size trigger flushes one batch mid-run, the end
//! of source flushes the remainder, and consumed tokens derive
//! CONSUMED_IN_BATCH.

mod common;

use elspeth_domain::entities::{NodeStateStatus, NodeType, TerminalState};
use elspeth_domain::repositories::LandscapeInspector;
use elspeth_domain::RunStatus;
use serde_json::json;

#[tokio::test]
async fn batches_flush_on_trigger_and_end_of_source() {
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})],
        vec![common::plugin("count_batch", json!({"batch_size": 2}))],
        &["default"],
    ));
    let harness = common::harness(settings).await;

    let report = common::execute(&harness).await.expect("run should complete");
    let run_id = report.run.run_id;
    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.summary.rows_consumed, 3);
    // Consumed tokens go to no sink.
    assert_eq!(report.summary.artifacts_written, 0);

    let nodes = harness.landscape.load_nodes(run_id).await.unwrap();
    let agg_node = nodes
        .iter()
        .find(|n| n.node_type == NodeType::Aggregation)
        .unwrap();

    let rows = harness.landscape.list_rows(run_id).await.unwrap();
    for row in &rows {
        let lineage = harness.landscape.explain_row(run_id, row.row_id).await.unwrap();
        let token = &lineage.tokens[0];
        assert_eq!(token.terminal_state, TerminalState::ConsumedInBatch);

        let accept_state = token
            .states
            .iter()
            .find(|s| s.node_id == agg_node.node_id)
            .expect("acceptance recorded as a node-state");
        assert_eq!(accept_state.status, NodeStateStatus::Completed);
    }

    // Checkpoints were taken at both aggregation boundaries, but are
    // deleted once the run completes.
    assert!(!harness.landscape.can_resume(run_id).await.unwrap());
}
