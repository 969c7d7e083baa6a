// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end gate behavior: threshold routing with complete routing
//! evidence, the missing-edge hard failure, and fork parentage.

mod common;

use elspeth_domain::entities::{NodeStateStatus, NodeType, TerminalState};
use elspeth_domain::repositories::LandscapeInspector;
use elspeth_domain::{EngineError, RunStatus};
use serde_json::json;

#[tokio::test]
async fn threshold_gate_routes_with_bound_routing_event() {
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"val": 10}), json!({"val": 100}), json!({"val": 20})],
        vec![common::plugin(
            "threshold",
            json!({"field": "val", "threshold": 50.0, "route_to": "high"}),
        )],
        &["default", "high"],
    ));
    let harness = common::harness(settings).await;

    let report = common::execute(&harness).await.expect("run should complete");
    let run_id = report.run.run_id;
    assert_eq!(report.summary.rows_completed, 2);
    assert_eq!(report.summary.rows_routed, 1);
    // Two sinks received tokens, so two artifacts.
    assert_eq!(report.summary.artifacts_written, 2);

    let nodes = harness.landscape.load_nodes(run_id).await.unwrap();
    let gate_node = nodes.iter().find(|n| n.node_type == NodeType::Gate).unwrap();
    let edges = harness.landscape.load_edges(run_id).await.unwrap();
    let high_edge = edges
        .iter()
        .find(|e| e.from_node_id == gate_node.node_id && e.label == "high")
        .expect("gate->high edge registered");

    let rows = harness.landscape.list_rows(run_id).await.unwrap();

    // The routed row: exactly one routing event, bound to the registered
    // edge, and a completed state at the high sink.
    let routed = harness.landscape.explain_row(run_id, rows[1].row_id).await.unwrap();
    let routed_token = &routed.tokens[0];
    assert_eq!(routed_token.routing_events.len(), 1);
    assert_eq!(routed_token.routing_events[0].edge_id, high_edge.edge_id);
    assert_eq!(routed_token.terminal_state, TerminalState::Completed);

    let high_sink = nodes
        .iter()
        .find(|n| {
            n.node_type == NodeType::Sink
                && n.config_json.get("sink_name") == Some(&json!("high"))
        })
        .unwrap();
    assert!(routed_token
        .states
        .iter()
        .any(|s| s.node_id == high_sink.node_id && s.status == NodeStateStatus::Completed));

    // The other two rows completed at the default sink with no routing
    // events.
    let default_sink = nodes
        .iter()
        .find(|n| {
            n.node_type == NodeType::Sink
                && n.config_json.get("sink_name") == Some(&json!("default"))
        })
        .unwrap();
    for index in [0usize, 2] {
        let lineage = harness
            .landscape
            .explain_row(run_id, rows[index].row_id)
            .await
            .unwrap();
        let token = &lineage.tokens[0];
        assert!(token.routing_events.is_empty());
        assert!(token
            .states
            .iter()
            .any(|s| s.node_id == default_sink.node_id && s.status == NodeStateStatus::Completed));
    }
}

#[tokio::test]
async fn routing_to_unregistered_edge_is_fatal() {
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"val": 100})],
        vec![common::plugin(
            "threshold",
            json!({"field": "val", "threshold": 50.0, "route_to": "unregistered"}),
        )],
        &["default"],
    ));
    let harness = common::harness(settings).await;

    let error = common::execute(&harness).await.expect_err("run must fail");
    match &error {
        EngineError::MissingEdge { label, .. } => assert_eq!(label, "unregistered"),
        other => panic!("expected MissingEdge, got {:?}", other),
    }

    // The run is finalized failed.
    let runs = harness.landscape.list_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
    let run_id = runs[0].run_id;
    assert_eq!(runs[0].status, RunStatus::Failed);

    // The gate state is recorded as failed, and no routing event was
    // written for the unresolvable label.
    let rows = harness.landscape.list_rows(run_id).await.unwrap();
    let lineage = harness.landscape.explain_row(run_id, rows[0].row_id).await.unwrap();
    let token = &lineage.tokens[0];
    assert!(token.routing_events.is_empty());

    let gate_state = token.states.last().unwrap();
    assert_eq!(gate_state.status, NodeStateStatus::Failed);
    assert_eq!(
        gate_state.error_json.as_ref().unwrap()["reason"],
        json!("missing_edge")
    );
    assert_eq!(token.terminal_state, TerminalState::Failed);
}

#[tokio::test]
async fn fork_creates_children_with_parentage() {
    let settings = common::settings_with(common::linear_pipeline(
        vec![json!({"doc": "a"})],
        vec![common::plugin("fork", json!({"branches": ["default", "archive"]}))],
        &["default", "archive"],
    ));
    let harness = common::harness(settings).await;

    let report = common::execute(&harness).await.expect("run should complete");
    let run_id = report.run.run_id;
    assert_eq!(report.summary.rows_forked, 1);
    assert_eq!(report.summary.artifacts_written, 2);

    let rows = harness.landscape.list_rows(run_id).await.unwrap();
    let lineage = harness.landscape.explain_row(run_id, rows[0].row_id).await.unwrap();

    // Parent plus one child per branch.
    assert_eq!(lineage.tokens.len(), 3);

    let parent = lineage
        .tokens
        .iter()
        .find(|t| t.branch_name.is_none())
        .expect("parent token");
    assert_eq!(parent.terminal_state, TerminalState::Forked);
    // One routing event per branch, recorded before the gate state
    // completed.
    assert_eq!(parent.routing_events.len(), 2);

    for branch in ["default", "archive"] {
        let child = lineage
            .tokens
            .iter()
            .find(|t| t.branch_name.as_deref() == Some(branch))
            .expect("child token per branch");
        assert_eq!(child.terminal_state, TerminalState::Completed);
    }
}
