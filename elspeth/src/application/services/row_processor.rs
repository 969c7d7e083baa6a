// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Row Processor
//!
//! Drives one source row through the linear sequence of transforms,
//! gates, and aggregations. Owns the step index, incremented once per
//! plugin, and dispatches over the tag fixed at registration.
//!
//! Outcome mapping:
//!
//! - gate routed → `Routed` with the sink name
//! - gate forked → `Forked`, children surfaced to the orchestrator
//! - aggregation accepted → `Consumed` (flush runs inline when triggered)
//! - transform business error or exhausted retries → `Failed`
//! - end of sequence → `Completed` with the final token
//!
//! Fatal audit-integrity errors propagate; everything else fails only the
//! row and the run continues. Telemetry for a step is emitted strictly
//! after the step's Landscape writes succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use chrono::Utc;
use elspeth_domain::entities::EdgeKey;
use elspeth_domain::events::PipelineEvent;
use elspeth_domain::repositories::RateLimit;
use elspeth_domain::services::plugin::{PluginContext, StepPlugin, TransformOutcome};
use elspeth_domain::value_objects::{
    EdgeId, NodeId, RoutingKind, RowResult, RunId, TokenInfo,
};
use elspeth_domain::EngineError;

use crate::infrastructure::runtime::{
    default_is_retryable, execute_with_retry, AggregationExecutor, GateExecutor, GateOutcome,
    RetryPolicy, SinkExecutor, TokenManager, TransformExecutor,
};
use crate::infrastructure::telemetry::EventBus;

use super::checkpoint_manager::CheckpointManager;

/// A registered mid-pipeline step: node identity, classified plugin, and
/// retry policy.
pub struct RegisteredStep {
    pub node_id: NodeId,
    pub plugin: StepPlugin,
    pub retry: RetryPolicy,
}

/// Executes one row at a time through the registered steps.
pub struct RowProcessor {
    transform_executor: TransformExecutor,
    gate_executor: GateExecutor,
    aggregation_executor: AggregationExecutor,
    pub(crate) sink_executor: SinkExecutor,
    token_manager: Arc<TokenManager>,
    checkpoints: Arc<CheckpointManager>,
    rate_limiter: Arc<dyn RateLimit>,
}

impl RowProcessor {
    pub fn new(
        transform_executor: TransformExecutor,
        gate_executor: GateExecutor,
        aggregation_executor: AggregationExecutor,
        sink_executor: SinkExecutor,
        token_manager: Arc<TokenManager>,
        checkpoints: Arc<CheckpointManager>,
        rate_limiter: Arc<dyn RateLimit>,
    ) -> Self {
        RowProcessor {
            transform_executor,
            gate_executor,
            aggregation_executor,
            sink_executor,
            token_manager,
            checkpoints,
            rate_limiter,
        }
    }

    fn make_ctx(&self, run_id: RunId, node_id: NodeId, step_index: i64) -> PluginContext {
        PluginContext::new(run_id, Some(node_id), step_index)
            .with_rate_limiter(Arc::clone(&self.rate_limiter))
    }

    /// The draft batch open at an aggregation node, if any (final-flush
    /// path in the orchestrator).
    pub fn open_batch(&self, node_id: NodeId) -> Option<elspeth_domain::value_objects::BatchId> {
        self.aggregation_executor.open_batch_id(node_id)
    }

    /// Flushes an aggregation outside the row loop (end of source), with
    /// its boundary checkpoint.
    pub async fn flush_aggregation(
        &mut self,
        run_id: RunId,
        step: &mut RegisteredStep,
        step_index: i64,
        trigger_reason: &str,
        checkpoint_token: elspeth_domain::value_objects::TokenId,
    ) -> Result<Vec<serde_json::Value>, EngineError> {
        let plugin = match &mut step.plugin {
            StepPlugin::Aggregation(p) => p.as_mut(),
            _ => return Ok(Vec::new()),
        };

        let mut ctx = PluginContext::new(run_id, Some(step.node_id), step_index)
            .with_rate_limiter(Arc::clone(&self.rate_limiter));
        let flushed = self
            .aggregation_executor
            .flush(plugin, step.node_id, trigger_reason, &mut ctx)
            .await?;

        let outputs = match flushed {
            Some((_, outputs)) => outputs,
            None => return Ok(Vec::new()),
        };

        let state = json!({ step.node_id.to_string(): plugin.buffer_state() });
        self.checkpoints
            .checkpoint_aggregation(run_id, checkpoint_token, step.node_id, &state)
            .await?;

        Ok(outputs)
    }

    /// Processes one row through the step sequence.
    pub async fn process_row(
        &mut self,
        run_id: RunId,
        mut token: TokenInfo,
        steps: &mut [RegisteredStep],
        edge_map: &HashMap<EdgeKey, EdgeId>,
        bus: &EventBus,
    ) -> Result<RowResult, EngineError> {
        let mut last_node: Option<NodeId> = None;

        for index in 0..steps.len() {
            let step_index = (index + 1) as i64;
            let step = &mut steps[index];
            let node_id = step.node_id;
            let retry = step.retry.clone();

            match &mut step.plugin {
                StepPlugin::Transform(plugin) => {
                    let plugin: &dyn elspeth_domain::services::plugin::TransformPlugin =
                        plugin.as_ref();
                    let executor = &self.transform_executor;
                    let rate_limiter = Arc::clone(&self.rate_limiter);
                    let token_ref = &token;

                    let attempt_result =
                        execute_with_retry(&retry, default_is_retryable, || {
                            let mut ctx = PluginContext::new(run_id, Some(node_id), step_index)
                                .with_rate_limiter(Arc::clone(&rate_limiter));
                            async move {
                                executor
                                    .execute(plugin, node_id, token_ref, step_index, &mut ctx)
                                    .await
                            }
                        })
                        .await;

                    match attempt_result {
                        Ok((result, updated)) => {
                            let success = result.is_success();
                            bus.publish(&PipelineEvent::TransformCompleted {
                                event_id: Uuid::new_v4(),
                                timestamp: Utc::now(),
                                run_id,
                                token_id: token.token_id,
                                node_id,
                                success,
                                duration_ms: result.duration_ms.unwrap_or(0),
                            })?;

                            if success {
                                token = updated;
                                last_node = Some(node_id);
                            } else {
                                let error = match &result.outcome {
                                    TransformOutcome::Error(reason) => Some(reason.to_error_json()),
                                    TransformOutcome::Success(_) => None,
                                };
                                return Ok(RowResult::failed(Some(token), error).at_node(node_id));
                            }
                        }
                        Err(error) if error.is_fatal() => return Err(error),
                        Err(error) => {
                            warn!(
                                token_id = %token.token_id,
                                node_id = %node_id,
                                error = %error,
                                "row failed in transform"
                            );
                            let error_json = json!({ "exception": error.to_string() });
                            return Ok(
                                RowResult::failed(Some(token), Some(error_json)).at_node(node_id)
                            );
                        }
                    }
                }

                StepPlugin::Gate(plugin) => {
                    let mut ctx = self.make_ctx(run_id, node_id, step_index);
                    let outcome = self
                        .gate_executor
                        .execute(
                            plugin.as_ref(),
                            node_id,
                            &token,
                            step_index,
                            &mut ctx,
                            edge_map,
                            &self.token_manager,
                        )
                        .await;

                    match outcome {
                        Ok(outcome) => {
                            let (kind, destinations) = match &outcome {
                                GateOutcome::Continue(_) => (RoutingKind::Continue, Vec::new()),
                                GateOutcome::Routed { sink_name, .. } => {
                                    (RoutingKind::Route, vec![sink_name.clone()])
                                }
                                GateOutcome::Forked { children } => (
                                    RoutingKind::Fork,
                                    children
                                        .iter()
                                        .filter_map(|c| c.branch_name.clone())
                                        .collect(),
                                ),
                            };
                            bus.publish(&PipelineEvent::GateEvaluated {
                                event_id: Uuid::new_v4(),
                                timestamp: Utc::now(),
                                run_id,
                                token_id: token.token_id,
                                node_id,
                                kind,
                                destinations,
                            })?;

                            match outcome {
                                GateOutcome::Continue(updated) => {
                                    token = updated;
                                    last_node = Some(node_id);
                                }
                                GateOutcome::Routed { token: routed, sink_name } => {
                                    return Ok(
                                        RowResult::routed(routed, sink_name).at_node(node_id)
                                    );
                                }
                                GateOutcome::Forked { children } => {
                                    return Ok(RowResult::forked(children).at_node(node_id));
                                }
                            }
                        }
                        Err(error) if error.is_fatal() => return Err(error),
                        Err(error) => {
                            warn!(
                                token_id = %token.token_id,
                                node_id = %node_id,
                                error = %error,
                                "row failed in gate"
                            );
                            let error_json = json!({ "exception": error.to_string() });
                            return Ok(
                                RowResult::failed(Some(token), Some(error_json)).at_node(node_id)
                            );
                        }
                    }
                }

                StepPlugin::Aggregation(plugin) => {
                    let mut ctx = self.make_ctx(run_id, node_id, step_index);
                    let accept_result = self
                        .aggregation_executor
                        .accept(plugin.as_mut(), node_id, &token, step_index, &mut ctx)
                        .await;

                    match accept_result {
                        Ok(result) if result.accepted => {
                            let mut outputs = Vec::new();
                            if result.trigger {
                                let mut flush_ctx = self.make_ctx(run_id, node_id, step_index);
                                if let Some((_, flushed)) = self
                                    .aggregation_executor
                                    .flush(
                                        plugin.as_mut(),
                                        node_id,
                                        "batch_size_reached",
                                        &mut flush_ctx,
                                    )
                                    .await?
                                {
                                    outputs = flushed;
                                }

                                let state =
                                    json!({ node_id.to_string(): plugin.buffer_state() });
                                self.checkpoints
                                    .checkpoint_aggregation(
                                        run_id,
                                        token.token_id,
                                        node_id,
                                        &state,
                                    )
                                    .await?;
                            }
                            return Ok(RowResult::consumed()
                                .at_node(node_id)
                                .with_flush_outputs(outputs));
                        }
                        Ok(_) => {
                            // Rejected: not a batch member; the token
                            // continues down the pipeline.
                            last_node = Some(node_id);
                        }
                        Err(error) if error.is_fatal() => return Err(error),
                        Err(error) => {
                            warn!(
                                token_id = %token.token_id,
                                node_id = %node_id,
                                error = %error,
                                "row failed in aggregation"
                            );
                            let error_json = json!({ "exception": error.to_string() });
                            return Ok(
                                RowResult::failed(Some(token), Some(error_json)).at_node(node_id)
                            );
                        }
                    }
                }
            }
        }

        let mut result = RowResult::completed(token);
        if let Some(node_id) = last_node {
            result = result.at_node(node_id);
        }
        Ok(result)
    }
}
