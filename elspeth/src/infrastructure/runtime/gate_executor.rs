// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Gate Executor
//!
//! Wraps one gate evaluation in its audit record and turns the routing
//! decision into routing events bound to registered edges.
//!
//! Routing completeness is enforced here: every destination label must
//! resolve through the edge map built at graph registration. A label with
//! no registered edge completes the state as failed and raises
//! `MissingEdge`; the engine does not proceed past an unaudited routing
//! decision. Routing events are recorded before the state completes.
//!
//! Fork semantics: children are created through the token manager with
//! mode `copy`; the parent token ends here (terminal state FORKED is
//! derived from the parentage records, the gate state itself completes as
//! `completed`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::debug;

use elspeth_domain::entities::EdgeKey;
use elspeth_domain::repositories::LandscapeRecorder;
use elspeth_domain::services::plugin::{GatePlugin, PluginContext};
use elspeth_domain::value_objects::{EdgeId, NodeId, RoutingKind, RoutingMode, TokenInfo};
use elspeth_domain::{EngineError, NodeStateStatus};

use super::token_manager::TokenManager;

/// What a gate did with a token.
pub enum GateOutcome {
    /// The token continues down the pipeline.
    Continue(TokenInfo),
    /// The token leaves for a named sink.
    Routed { token: TokenInfo, sink_name: String },
    /// The token forked; the parent terminates and the children surface.
    Forked { children: Vec<TokenInfo> },
}

/// Executes gates, enforcing routing completeness against the registered
/// edge map.
pub struct GateExecutor {
    recorder: Arc<dyn LandscapeRecorder>,
}

impl GateExecutor {
    pub fn new(recorder: Arc<dyn LandscapeRecorder>) -> Self {
        GateExecutor { recorder }
    }

    /// Runs one gate evaluation for `token`.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        plugin: &dyn GatePlugin,
        node_id: NodeId,
        token: &TokenInfo,
        step_index: i64,
        ctx: &mut PluginContext,
        edge_map: &HashMap<EdgeKey, EdgeId>,
        token_manager: &TokenManager,
    ) -> Result<GateOutcome, EngineError> {
        let state = self
            .recorder
            .begin_node_state(token.token_id, node_id, step_index, &token.row_data)
            .await?;

        let started = Instant::now();
        let evaluation = plugin.evaluate(&token.row_data, ctx).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        for draft in ctx.take_calls() {
            self.recorder.record_call(state.state_id, draft).await?;
        }

        let gate_result = match evaluation {
            Err(error) => {
                let error_json = json!({
                    "exception": error.to_string(),
                    "type": "plugin_exception",
                });
                self.recorder
                    .complete_node_state(
                        state.state_id,
                        NodeStateStatus::Failed,
                        None,
                        duration_ms,
                        Some(&error_json),
                    )
                    .await?;
                return Err(error);
            }
            Ok(result) => result,
        };

        let action = gate_result.action;
        let row = gate_result.row;

        match action.kind {
            RoutingKind::Continue => {
                self.recorder
                    .complete_node_state(
                        state.state_id,
                        NodeStateStatus::Completed,
                        Some(&row),
                        duration_ms,
                        None,
                    )
                    .await?;
                Ok(GateOutcome::Continue(token.clone().with_row_data(row)))
            }

            RoutingKind::Route => {
                let label = action.destinations.first().cloned().ok_or_else(|| {
                    EngineError::integrity("route decision carried no destination label")
                })?;

                let edge_id = match edge_map.get(&(node_id, label.clone())) {
                    Some(edge_id) => *edge_id,
                    None => {
                        return self
                            .fail_missing_edge(state.state_id, node_id, &label, duration_ms)
                            .await;
                    }
                };

                self.recorder
                    .record_routing_event(state.state_id, edge_id, action.mode, &action.reason)
                    .await?;
                self.recorder
                    .complete_node_state(
                        state.state_id,
                        NodeStateStatus::Completed,
                        Some(&row),
                        duration_ms,
                        None,
                    )
                    .await?;

                debug!(token_id = %token.token_id, node_id = %node_id, sink = %label, "token routed");
                Ok(GateOutcome::Routed {
                    token: token.clone().with_row_data(row),
                    sink_name: label,
                })
            }

            RoutingKind::Fork => {
                if action.destinations.is_empty() {
                    return Err(EngineError::integrity(
                        "fork decision carried no destination labels",
                    ));
                }

                // Resolve every edge before recording anything, so a
                // missing edge leaves no partial routing evidence. Fork
                // mode is always copy.
                let mut routes: Vec<(EdgeId, RoutingMode)> =
                    Vec::with_capacity(action.destinations.len());
                for label in &action.destinations {
                    match edge_map.get(&(node_id, label.clone())) {
                        Some(edge_id) => routes.push((*edge_id, RoutingMode::Copy)),
                        None => {
                            return self
                                .fail_missing_edge(state.state_id, node_id, label, duration_ms)
                                .await;
                        }
                    }
                }

                self.recorder
                    .record_routing_events(state.state_id, &routes, &action.reason)
                    .await?;

                let children = token_manager
                    .fork_token(token, &action.destinations, step_index, &row)
                    .await?;

                self.recorder
                    .complete_node_state(
                        state.state_id,
                        NodeStateStatus::Completed,
                        Some(&row),
                        duration_ms,
                        None,
                    )
                    .await?;

                debug!(
                    token_id = %token.token_id,
                    node_id = %node_id,
                    branches = children.len(),
                    "token forked"
                );
                Ok(GateOutcome::Forked { children })
            }
        }
    }

    /// Records the missing-edge failure on the state and raises the fatal
    /// error. No routing event is written for the unresolvable label.
    async fn fail_missing_edge(
        &self,
        state_id: elspeth_domain::value_objects::StateId,
        node_id: NodeId,
        label: &str,
        duration_ms: i64,
    ) -> Result<GateOutcome, EngineError> {
        let error_json = json!({
            "reason": "missing_edge",
            "label": label,
        });
        self.recorder
            .complete_node_state(
                state_id,
                NodeStateStatus::Failed,
                None,
                duration_ms,
                Some(&error_json),
            )
            .await?;

        Err(EngineError::MissingEdge {
            node_id: node_id.to_string(),
            label: label.to_string(),
        })
    }
}
