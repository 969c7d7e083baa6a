// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transform Executor
//!
//! Wraps exactly one transform invocation in its audit record: one
//! invocation, one node-state. The sequence is fixed:
//!
//! 1. `begin_node_state` (input hashed and stored, attempt allocated).
//! 2. Timed `plugin.process`.
//! 3. External calls reported through the context are recorded against
//!    the state.
//! 4. The state completes exactly once: `completed` with the output on
//!    success, `failed` with the structured reason on business error,
//!    `failed` with the exception payload when the plugin raised. In that
//!    last case the error still propagates after being recorded.
//!
//! Retry lives outside: each attempt re-enters this executor and gets its
//! own node-state.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::debug;

use elspeth_domain::repositories::LandscapeRecorder;
use elspeth_domain::services::plugin::{
    PluginContext, TransformOutcome, TransformPlugin, TransformResult,
};
use elspeth_domain::value_objects::{NodeId, TokenInfo};
use elspeth_domain::{EngineError, NodeStateStatus};

/// Executes transforms one attempt at a time, recording each boundary
/// crossing.
pub struct TransformExecutor {
    recorder: Arc<dyn LandscapeRecorder>,
}

impl TransformExecutor {
    pub fn new(recorder: Arc<dyn LandscapeRecorder>) -> Self {
        TransformExecutor { recorder }
    }

    /// Runs one attempt of `plugin` on `token`, returning the result and
    /// the token to continue with (updated on success, unchanged on
    /// business error).
    pub async fn execute(
        &self,
        plugin: &dyn TransformPlugin,
        node_id: NodeId,
        token: &TokenInfo,
        step_index: i64,
        ctx: &mut PluginContext,
    ) -> Result<(TransformResult, TokenInfo), EngineError> {
        let state = self
            .recorder
            .begin_node_state(token.token_id, node_id, step_index, &token.row_data)
            .await?;

        let started = Instant::now();
        let invocation = plugin.process(&token.row_data, ctx).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        // Calls are evidence of what the state did; they are written
        // before the state reaches its terminal status.
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

        result.input_hash = Some(state.input_hash.clone());
        result.duration_ms = Some(duration_ms);

        match &result.outcome {
            TransformOutcome::Success(row) => {
                let completed = self
                    .recorder
                    .complete_node_state(
                        state.state_id,
                        NodeStateStatus::Completed,
                        Some(row),
                        duration_ms,
                        None,
                    )
                    .await?;
                result.output_hash = completed.output_hash.clone();
                debug!(
                    token_id = %token.token_id,
                    node_id = %node_id,
                    attempt = state.attempt,
                    duration_ms,
                    "transform completed"
                );
                let updated = token.clone().with_row_data(row.clone());
                Ok((result, updated))
            }
            TransformOutcome::Error(reason) => {
                let error_json = reason.to_error_json();
                self.recorder
                    .complete_node_state(
                        state.state_id,
                        NodeStateStatus::Failed,
                        None,
                        duration_ms,
                        Some(&error_json),
                    )
                    .await?;
                debug!(
                    token_id = %token.token_id,
                    node_id = %node_id,
                    attempt = state.attempt,
                    reason = reason.category(),
                    "transform reported business failure"
                );
                Ok((result, token.clone()))
            }
        }
    }
}
