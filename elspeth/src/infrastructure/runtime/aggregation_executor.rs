// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Aggregation Executor
//!
//! Drives the two aggregation operations and keeps the batch lifecycle
//! honest:
//!
//! - **accept**: lazily opens a draft batch on first acceptance, records
//!   the offer as a node-state (`completed` for accepted tokens,
//!   `rejected` for declined ones), and appends accepted tokens to
//!   batch_members in acceptance order.
//! - **flush**: walks the batch through executing → completed | failed
//!   around the plugin's flush, returning the aggregated outputs to the
//!   caller.
//!
//! The executor owns the open-batch bookkeeping per aggregation node; the
//! plugin owns its buffer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::debug;

use elspeth_domain::entities::BatchStatus;
use elspeth_domain::repositories::LandscapeRecorder;
use elspeth_domain::services::plugin::{AcceptResult, AggregationPlugin, PluginContext};
use elspeth_domain::value_objects::{BatchId, NodeId, TokenInfo};
use elspeth_domain::{EngineError, NodeStateStatus};

struct OpenBatch {
    batch_id: BatchId,
    next_ordinal: i64,
}

/// Executes aggregation accept/flush with batch lifecycle recording.
pub struct AggregationExecutor {
    recorder: Arc<dyn LandscapeRecorder>,
    open_batches: HashMap<NodeId, OpenBatch>,
}

impl AggregationExecutor {
    pub fn new(recorder: Arc<dyn LandscapeRecorder>) -> Self {
        AggregationExecutor {
            recorder,
            open_batches: HashMap::new(),
        }
    }

    /// The draft batch currently open for an aggregation node, if any.
    pub fn open_batch_id(&self, node_id: NodeId) -> Option<BatchId> {
        self.open_batches.get(&node_id).map(|b| b.batch_id)
    }

    /// Offers `token` to the aggregation.
    pub async fn accept(
        &mut self,
        plugin: &mut dyn AggregationPlugin,
        node_id: NodeId,
        token: &TokenInfo,
        step_index: i64,
        ctx: &mut PluginContext,
    ) -> Result<AcceptResult, EngineError> {
        if !self.open_batches.contains_key(&node_id) {
            let batch = self.recorder.create_batch(ctx.run_id, node_id).await?;
            debug!(batch_id = %batch.batch_id, node_id = %node_id, "draft batch opened");
            self.open_batches.insert(
                node_id,
                OpenBatch {
                    batch_id: batch.batch_id,
                    next_ordinal: 0,
                },
            );
        }

        let state = self
            .recorder
            .begin_node_state(token.token_id, node_id, step_index, &token.row_data)
            .await?;

        let started = Instant::now();
        let invocation = plugin.accept(&token.row_data, ctx).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        for draft in ctx.take_calls() {
            self.recorder.record_call(state.state_id, draft).await?;
        }

        let mut result = match invocation {
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

        let open = match self.open_batches.get_mut(&node_id) {
            Some(open) => open,
            None => {
                return Err(EngineError::integrity(
                    "aggregation batch disappeared between open and accept",
                ));
            }
        };

        if result.accepted {
            self.recorder
                .add_batch_member(open.batch_id, token.token_id, open.next_ordinal)
                .await?;
            open.next_ordinal += 1;
            result.batch_id = Some(open.batch_id);

            self.recorder
                .complete_node_state(
                    state.state_id,
                    NodeStateStatus::Completed,
                    Some(&token.row_data),
                    duration_ms,
                    None,
                )
                .await?;
        } else {
            // Declined: the token is not a batch member and continues on.
            self.recorder
                .complete_node_state(
                    state.state_id,
                    NodeStateStatus::Rejected,
                    None,
                    duration_ms,
                    None,
                )
                .await?;
        }

        Ok(result)
    }

    /// Flushes the open batch, if any. Returns the batch id and the
    /// aggregated outputs.
    pub async fn flush(
        &mut self,
        plugin: &mut dyn AggregationPlugin,
        node_id: NodeId,
        trigger_reason: &str,
        ctx: &mut PluginContext,
    ) -> Result<Option<(BatchId, Vec<Value>)>, EngineError> {
        let open = match self.open_batches.remove(&node_id) {
            Some(open) => open,
            None => return Ok(None),
        };

        self.recorder
            .update_batch_status(open.batch_id, BatchStatus::Executing, Some(trigger_reason))
            .await?;

        let started = Instant::now();
        let flushed = plugin.flush(ctx).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match flushed {
            Ok(outputs) => {
                self.recorder
                    .update_batch_status(open.batch_id, BatchStatus::Completed, None)
                    .await?;
                debug!(
                    batch_id = %open.batch_id,
                    outputs = outputs.len(),
                    duration_ms,
                    trigger = trigger_reason,
                    "batch flushed"
                );
                Ok(Some((open.batch_id, outputs)))
            }
            Err(error) => {
                self.recorder
                    .update_batch_status(open.batch_id, BatchStatus::Failed, None)
                    .await?;
                Err(error)
            }
        }
    }
}
