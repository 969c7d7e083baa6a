// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Built-in source plugins: an in-memory row list and a JSON-lines file
//! reader.

use async_trait::async_trait;
use serde_json::{json, Value};

use elspeth_domain::services::plugin::{PluginContext, SourcePlugin};
use elspeth_domain::{Determinism, EngineError};

/// Source over a fixed list of rows, configured inline. Used by tests and
/// demo configurations.
pub struct InMemorySource {
    rows: Vec<Value>,
}

impl InMemorySource {
    pub fn new(rows: Vec<Value>) -> Self {
        InMemorySource { rows }
    }

    /// Builds from options: `{ "rows": [ {...}, ... ] }`.
    pub fn from_options(options: &Value) -> Result<Self, EngineError> {
        let rows = options
            .get("rows")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(
                    "memory source requires a 'rows' array option".to_string(),
                )
            })?;
        Ok(InMemorySource::new(rows))
    }
}

#[async_trait]
impl SourcePlugin for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn plugin_version(&self) -> &str {
        "1.0.0"
    }

    fn determinism(&self) -> Determinism {
        Determinism::Deterministic
    }

    fn config(&self) -> Value {
        json!({ "rows": self.rows.len() })
    }

    async fn load(&mut self, _ctx: &mut PluginContext) -> Result<Vec<Value>, EngineError> {
        Ok(self.rows.clone())
    }
}

/// Reads one JSON object per line from a file.
pub struct JsonLinesSource {
    path: String,
}

impl JsonLinesSource {
    pub fn from_options(options: &Value) -> Result<Self, EngineError> {
        let path = options
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(
                    "jsonl source requires a 'path' option".to_string(),
                )
            })?;
        Ok(JsonLinesSource {
            path: path.to_string(),
        })
    }
}

#[async_trait]
impl SourcePlugin for JsonLinesSource {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn plugin_version(&self) -> &str {
        "1.0.0"
    }

    fn determinism(&self) -> Determinism {
        Determinism::IoRead
    }

    fn config(&self) -> Value {
        json!({ "path": self.path })
    }

    async fn load(&mut self, _ctx: &mut PluginContext) -> Result<Vec<Value>, EngineError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::plugin("jsonl", format!("cannot read '{}': {}", self.path, e))
        })?;

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    EngineError::plugin(
                        "jsonl",
                        format!("line {} of '{}' is not JSON: {}", index + 1, self.path, e),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elspeth_domain::value_objects::RunId;

    #[tokio::test]
    async fn memory_source_yields_configured_rows() {
        let mut source =
            InMemorySource::from_options(&json!({"rows": [{"value": 1}, {"value": 2}]})).unwrap();
        let mut ctx = PluginContext::new(RunId::new(), None, 0);
        let rows = source.load(&mut ctx).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["value"], 1);
    }

    #[tokio::test]
    async fn jsonl_source_reads_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        tokio::fs::write(&path, "{\"a\":1}\n\n{\"a\":2}\n")
            .await
            .unwrap();

        let mut source =
            JsonLinesSource::from_options(&json!({"path": path.to_str().unwrap()})).unwrap();
        let mut ctx = PluginContext::new(RunId::new(), None, 0);
        let rows = source.load(&mut ctx).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["a"], 2);
    }
}
