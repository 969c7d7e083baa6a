// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Telemetry Exporters
//!
//! The exporter contract and the built-in implementations: a tracing-log
//! exporter (default) and an in-memory capture exporter used by tests.
//!
//! Contract: `configure` fails fast on bad options; `export` should absorb
//! its own failures where it can (returning an error is the signal for the
//! manager's failure accounting, and must never panic); `flush` drains any
//! internal buffer; `close` is idempotent. `name` is required: it is how
//! configuration refers to the exporter.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use elspeth_domain::events::PipelineEvent;
use elspeth_domain::EngineError;

/// A telemetry destination.
pub trait TelemetryExporter: Send + Sync {
    /// Identifier used in configuration. Required.
    fn name(&self) -> &str;

    /// Applies exporter options. Called once before the first export;
    /// unknown or invalid options fail fast.
    fn configure(&mut self, options: &Value) -> Result<(), EngineError>;

    /// Exports one event. Errors feed the manager's failure accounting;
    /// implementations must not panic.
    fn export(&self, event: &PipelineEvent) -> Result<(), EngineError>;

    /// Drains any internal buffering.
    fn flush(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Releases resources. Idempotent.
    fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Default exporter: structured events into the tracing log stream.
pub struct TracingExporter {
    closed: AtomicBool,
}

impl TracingExporter {
    pub fn new() -> Self {
        TracingExporter {
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for TracingExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryExporter for TracingExporter {
    fn name(&self) -> &str {
        "log"
    }

    fn configure(&mut self, options: &Value) -> Result<(), EngineError> {
        match options {
            Value::Null => Ok(()),
            Value::Object(map) if map.is_empty() => Ok(()),
            other => Err(EngineError::InvalidConfiguration(format!(
                "log exporter accepts no options, got {}",
                other
            ))),
        }
    }

    fn export(&self, event: &PipelineEvent) -> Result<(), EngineError> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(());
        }
        info!(
            target: "elspeth::telemetry",
            event = event.event_name(),
            run_id = %event.run_id(),
            "telemetry event"
        );
        Ok(())
    }

    fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Captures events in memory; used by tests to assert emission ordering
/// and filtering.
#[derive(Default)]
pub struct MemoryExporter {
    name: String,
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemoryExporter {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryExporter {
            name: name.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything exported so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }
}

impl TelemetryExporter for MemoryExporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, _options: &Value) -> Result<(), EngineError> {
        Ok(())
    }

    fn export(&self, event: &PipelineEvent) -> Result<(), EngineError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
