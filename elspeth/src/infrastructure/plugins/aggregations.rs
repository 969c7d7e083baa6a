// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Built-in aggregation plugin: count-triggered batching.

use async_trait::async_trait;
use serde_json::{json, Value};

use elspeth_domain::services::plugin::{AcceptResult, AggregationPlugin, PluginContext};
use elspeth_domain::{Determinism, EngineError};

/// Buffers rows and triggers a flush when the buffer reaches the
/// configured size. Flush emits one summary row carrying the batch.
pub struct CountBatchAggregation {
    batch_size: usize,
    buffer: Vec<Value>,
}

impl CountBatchAggregation {
    pub fn new(batch_size: usize) -> Self {
        CountBatchAggregation {
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
        }
    }

    pub fn from_options(options: &Value) -> Result<Self, EngineError> {
        let batch_size = options
            .get("batch_size")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(
                    "batch aggregation requires a 'batch_size' option".to_string(),
                )
            })?;
        Ok(CountBatchAggregation::new(batch_size as usize))
    }

    /// Rows currently buffered (for tests and checkpoint assertions).
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[async_trait]
impl AggregationPlugin for CountBatchAggregation {
    fn name(&self) -> &str {
        "count_batch"
    }

    fn plugin_version(&self) -> &str {
        "1.0.0"
    }

    fn determinism(&self) -> Determinism {
        Determinism::Deterministic
    }

    fn config(&self) -> Value {
        json!({ "batch_size": self.batch_size })
    }

    async fn accept(
        &mut self,
        row: &Value,
        _ctx: &mut PluginContext,
    ) -> Result<AcceptResult, EngineError> {
        self.buffer.push(row.clone());
        Ok(AcceptResult {
            accepted: true,
            trigger: self.buffer.len() >= self.batch_size,
            batch_id: None,
        })
    }

    async fn flush(&mut self, _ctx: &mut PluginContext) -> Result<Vec<Value>, EngineError> {
        let rows = std::mem::take(&mut self.buffer);
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![json!({
            "count": rows.len(),
            "rows": rows,
        })])
    }

    fn buffer_state(&self) -> Value {
        json!({
            "batch_size": self.batch_size,
            "buffer": self.buffer,
        })
    }

    fn restore_state(&mut self, state: &Value) -> Result<(), EngineError> {
        let buffer = state
            .get("buffer")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                EngineError::ResumeRefused(
                    "aggregation checkpoint state is missing the 'buffer' array".to_string(),
                )
            })?;
        self.buffer = buffer;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elspeth_domain::value_objects::RunId;

    #[tokio::test]
    async fn triggers_at_batch_size() {
        let mut agg = CountBatchAggregation::new(2);
        let mut ctx = PluginContext::new(RunId::new(), None, 1);

        let first = agg.accept(&json!({"n": 1}), &mut ctx).await.unwrap();
        assert!(first.accepted);
        assert!(!first.trigger);

        let second = agg.accept(&json!({"n": 2}), &mut ctx).await.unwrap();
        assert!(second.trigger);

        let outputs = agg.flush(&mut ctx).await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0]["count"], 2);
        assert_eq!(agg.buffered(), 0);
    }

    #[tokio::test]
    async fn buffer_state_round_trips() {
        let mut agg = CountBatchAggregation::new(5);
        let mut ctx = PluginContext::new(RunId::new(), None, 1);
        agg.accept(&json!({"n": 1}), &mut ctx).await.unwrap();

        let state = agg.buffer_state();
        let mut restored = CountBatchAggregation::new(5);
        restored.restore_state(&state).unwrap();
        assert_eq!(restored.buffered(), 1);
    }
}
