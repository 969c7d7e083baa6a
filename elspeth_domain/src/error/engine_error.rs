// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! Hierarchical error type for the auditable pipeline engine. The variants
//! fall into the dispositions of the engine's error model:
//!
//! - **Configuration errors** (`InvalidConfiguration`, `UnknownDeterminism`,
//!   `SchemaViolation`): rejected at graph build, before any row flows.
//! - **Audit integrity errors** (`MissingEdge`, `IntegrityViolation`,
//!   `HashMismatch`): fatal to the run. The engine refuses to proceed past
//!   them; there is no fallback path.
//! - **Infrastructure errors** (`DatabaseError`, `PayloadStoreError`,
//!   `SerializationError`): surfaced from the recorder or payload store.
//!   A recorder write failure fails the current row and suppresses any
//!   downstream effect for that write.
//! - **Plugin errors** (`PluginError`, `MaxRetriesExceeded`): raised from
//!   plugin invocations. The enclosing executor records the failure in the
//!   audit store before the error propagates.
//! - **Operational errors** (`NotFound`, `ResumeRefused`, `Cancelled`):
//!   user-visible failures with a clear message.
//!
//! Business failures (a transform deciding a row is bad) are **not** errors:
//! they travel inside `TransformResult` with a structured reason and surface
//! as a failed node-state. Exceptions are reserved for conditions the engine
//! cannot absorb.

use thiserror::Error;

/// Domain-specific errors for the auditable pipeline engine.
///
/// Each variant carries enough context to be actionable in logs and in the
/// audit store's `error_json` payloads. Errors are cloneable so they can be
/// recorded and re-raised without loss.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Configuration was malformed, incomplete, or referenced unimplemented
    /// options. Detected at settings parse or graph registration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A node was registered without a recognized determinism declaration.
    /// There is no default determinism; registration fails instead.
    #[error("Unknown determinism '{value}' for plugin '{plugin}'")]
    UnknownDeterminism { plugin: String, value: String },

    /// A consumer's required fields are not guaranteed by its upstream.
    /// Detected at graph build, never at row time.
    #[error("Schema violation at '{node}': {detail}")]
    SchemaViolation { node: String, detail: String },

    /// A gate routed to a label with no registered edge. Fatal: proceeding
    /// would leave a routing decision without audit evidence.
    #[error("No registered edge from node '{node_id}' with label '{label}'")]
    MissingEdge { node_id: String, label: String },

    /// The relational audit contract was violated (non-open state update,
    /// batch lifecycle breach, attempt gap). Fatal to the run.
    #[error("Audit integrity violation: {0}")]
    IntegrityViolation(String),

    /// A stored payload no longer hashes to its recorded content hash.
    #[error("Content hash mismatch for {entity}: recorded {recorded}, computed {computed}")]
    HashMismatch {
        entity: String,
        recorded: String,
        computed: String,
    },

    /// A value could not be canonicalized for hashing.
    #[error("Canonical hash error: {0}")]
    HashError(String),

    /// Audit store read/write failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Payload store read/write failure.
    #[error("Payload store error: {0}")]
    PayloadStoreError(String),

    /// JSON (de)serialization failure at a boundary.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A plugin invocation raised instead of returning a result.
    #[error("Plugin error in '{plugin}': {message}")]
    PluginError { plugin: String, message: String },

    /// Retry policy exhausted without a successful attempt.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    /// A referenced run, row, token, or node does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resume was requested for a run that cannot be resumed.
    #[error("Resume refused: {0}")]
    ResumeRefused(String),

    /// The run was cancelled cooperatively at a row boundary.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Telemetry was configured to crash on total exporter failure and the
    /// failure threshold was reached.
    #[error("Telemetry failure: {0}")]
    TelemetryFailure(String),
}

impl EngineError {
    /// Convenience constructor for database failures.
    pub fn database_error(message: impl Into<String>) -> Self {
        EngineError::DatabaseError(message.into())
    }

    /// Convenience constructor for payload store failures.
    pub fn payload_store_error(message: impl Into<String>) -> Self {
        EngineError::PayloadStoreError(message.into())
    }

    /// Convenience constructor for integrity violations.
    pub fn integrity(message: impl Into<String>) -> Self {
        EngineError::IntegrityViolation(message.into())
    }

    /// Convenience constructor for serialization failures.
    pub fn serialization(message: impl Into<String>) -> Self {
        EngineError::SerializationError(message.into())
    }

    /// Convenience constructor for plugin exceptions.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::PluginError {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// True for errors that must abort the run rather than fail one row.
    ///
    /// Fatal errors are the audit integrity class: continuing past them
    /// would produce an audit trail that cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::MissingEdge { .. }
                | EngineError::IntegrityViolation(_)
                | EngineError::HashMismatch { .. }
                | EngineError::InvalidConfiguration(_)
                | EngineError::UnknownDeterminism { .. }
                | EngineError::SchemaViolation { .. }
                | EngineError::TelemetryFailure(_)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_edge_is_fatal() {
        let err = EngineError::MissingEdge {
            node_id: "node-1".to_string(),
            label: "unregistered".to_string(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("unregistered"));
    }

    #[test]
    fn plugin_error_is_not_fatal() {
        let err = EngineError::plugin("embedder", "connection reset");
        assert!(!err.is_fatal());
    }

    #[test]
    fn database_error_is_not_fatal() {
        // A recorder failure fails the row; the orchestrator decides whether
        // the run can continue.
        assert!(!EngineError::database_error("locked").is_fatal());
    }
}
