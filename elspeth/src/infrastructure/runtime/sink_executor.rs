// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sink Executor
//!
//! Writes a batch of tokens' rows through a sink plugin. Each token gets
//! its own node-state at the sink node (that state is what lets the
//! COMPLETED terminal state be derived), and the write as a whole
//! registers one artifact carrying the content hash and size the sink
//! reported (both required).
//!
//! On write failure every per-token state is completed as failed and the
//! error propagates; a partial write never shows up as completion.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::debug;

use elspeth_domain::entities::Artifact;
use elspeth_domain::repositories::LandscapeRecorder;
use elspeth_domain::services::plugin::{PluginContext, SinkPlugin};
use elspeth_domain::value_objects::{NodeId, TokenInfo};
use elspeth_domain::{EngineError, NodeStateStatus};

/// Executes sink writes with per-token audit states and artifact
/// registration.
pub struct SinkExecutor {
    recorder: Arc<dyn LandscapeRecorder>,
}

impl SinkExecutor {
    pub fn new(recorder: Arc<dyn LandscapeRecorder>) -> Self {
        SinkExecutor { recorder }
    }

    /// Writes `tokens` through `sink`. Returns the registered artifact,
    /// or `None` when there was nothing to write.
    pub async fn execute(
        &self,
        sink: &mut dyn SinkPlugin,
        sink_node_id: NodeId,
        tokens: &[TokenInfo],
        step_index: i64,
        ctx: &mut PluginContext,
    ) -> Result<Option<Artifact>, EngineError> {
        if tokens.is_empty() {
            return Ok(None);
        }

        let mut states = Vec::with_capacity(tokens.len());
        for token in tokens {
            let state = self
                .recorder
                .begin_node_state(token.token_id, sink_node_id, step_index, &token.row_data)
                .await?;
            states.push(state);
        }

        let rows: Vec<Value> = tokens.iter().map(|t| t.row_data.clone()).collect();

        let started = Instant::now();
        let written = sink.write(&rows, ctx).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        // Calls from the sink (webhook POSTs, SQL inserts) anchor to the
        // first state of the batch.
        let first_state_id = states[0].state_id;
        for draft in ctx.take_calls() {
            self.recorder.record_call(first_state_id, draft).await?;
        }

        match written {
            Ok(receipt) => {
                for (state, token) in states.iter().zip(tokens.iter()) {
                    self.recorder
                        .complete_node_state(
                            state.state_id,
                            NodeStateStatus::Completed,
                            Some(&token.row_data),
                            duration_ms,
                            None,
                        )
                        .await?;
                }

                let artifact = self
                    .recorder
                    .register_artifact(
                        ctx.run_id,
                        first_state_id,
                        sink_node_id,
                        sink.artifact_type(),
                        &receipt.path_or_uri,
                        &receipt.content_hash,
                        receipt.size_bytes,
                        receipt.metadata.as_ref(),
                    )
                    .await?;

                debug!(
                    sink_node_id = %sink_node_id,
                    tokens = tokens.len(),
                    artifact_id = %artifact.artifact_id,
                    size_bytes = receipt.size_bytes,
                    "sink write completed"
                );
                Ok(Some(artifact))
            }
            Err(error) => {
                let error_json = json!({
                    "exception": error.to_string(),
                    "type": "sink_write_failed",
                });
                for state in &states {
                    self.recorder
                        .complete_node_state(
                            state.state_id,
                            NodeStateStatus::Failed,
                            None,
                            duration_ms,
                            Some(&error_json),
                        )
                        .await?;
                }
                Err(error)
            }
        }
    }
}
