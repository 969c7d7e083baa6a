// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Built-in sink plugins: JSON-lines file output and an in-memory sink
//! for tests. Both report the artifact receipt (path, content hash, size)
//! the sink executor records.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

use elspeth_domain::services::canonical;
use elspeth_domain::services::plugin::{PluginContext, SinkPlugin, SinkReceipt};
use elspeth_domain::{ArtifactType, Determinism, EngineError};

/// Appends one JSON object per line to a file.
pub struct JsonLinesSink {
    name: String,
    path: String,
}

impl JsonLinesSink {
    pub fn from_options(name: &str, options: &Value) -> Result<Self, EngineError> {
        let path = options
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(format!(
                    "jsonl sink '{}' requires a 'path' option",
                    name
                ))
            })?;
        Ok(JsonLinesSink {
            name: name.to_string(),
            path: path.to_string(),
        })
    }
}

#[async_trait]
impl SinkPlugin for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_version(&self) -> &str {
        "1.0.0"
    }

    fn determinism(&self) -> Determinism {
        Determinism::IoWrite
    }

    fn config(&self) -> Value {
        json!({ "path": self.path })
    }

    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::File
    }

    async fn write(
        &mut self,
        rows: &[Value],
        _ctx: &mut PluginContext,
    ) -> Result<SinkReceipt, EngineError> {
        let mut contents = String::new();
        for row in rows {
            contents.push_str(&serde_json::to_string(row)?);
            contents.push('\n');
        }

        tokio::fs::write(&self.path, contents.as_bytes())
            .await
            .map_err(|e| {
                EngineError::plugin(
                    self.name.clone(),
                    format!("cannot write '{}': {}", self.path, e),
                )
            })?;

        Ok(SinkReceipt {
            path_or_uri: self.path.clone(),
            content_hash: canonical::hash_bytes(contents.as_bytes()),
            size_bytes: contents.len() as i64,
            metadata: Some(json!({ "rows": rows.len() })),
        })
    }
}

/// Collects rows in memory behind a shared handle so tests can observe
/// exactly what arrived.
pub struct MemorySink {
    name: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        MemorySink {
            name: name.into(),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A handle to everything the sink has received.
    pub fn handle(&self) -> Arc<Mutex<Vec<Value>>> {
        Arc::clone(&self.received)
    }
}

#[async_trait]
impl SinkPlugin for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_version(&self) -> &str {
        "1.0.0"
    }

    fn determinism(&self) -> Determinism {
        Determinism::IoWrite
    }

    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::File
    }

    async fn write(
        &mut self,
        rows: &[Value],
        _ctx: &mut PluginContext,
    ) -> Result<SinkReceipt, EngineError> {
        self.received.lock().extend(rows.iter().cloned());

        let contents = canonical::canonicalize(&Value::Array(rows.to_vec()))?;
        Ok(SinkReceipt {
            path_or_uri: format!("memory://{}", self.name),
            content_hash: canonical::hash_bytes(contents.as_bytes()),
            size_bytes: contents.len() as i64,
            metadata: Some(json!({ "rows": rows.len() })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elspeth_domain::value_objects::RunId;

    #[tokio::test]
    async fn memory_sink_collects_rows() {
        let mut sink = MemorySink::new("default");
        let handle = sink.handle();
        let mut ctx = PluginContext::new(RunId::new(), None, 2);

        let receipt = sink
            .write(&[json!({"a": 1}), json!({"a": 2})], &mut ctx)
            .await
            .unwrap();

        assert_eq!(handle.lock().len(), 2);
        assert_eq!(receipt.size_bytes > 0, true);
        assert_eq!(receipt.content_hash.len(), 64);
    }

    #[tokio::test]
    async fn jsonl_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let mut sink = JsonLinesSink::from_options(
            "default",
            &json!({"path": path.to_str().unwrap()}),
        )
        .unwrap();
        let mut ctx = PluginContext::new(RunId::new(), None, 2);

        let receipt = sink.write(&[json!({"v": 1})], &mut ctx).await.unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "{\"v\":1}\n");
        assert_eq!(receipt.size_bytes, written.len() as i64);
    }
}
