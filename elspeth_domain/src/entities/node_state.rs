// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Node-State and Routing Event Entities
//!
//! A node-state records one attempt of one token at one node: the boundary
//! crossing at the heart of the audit contract. Attempts for a given
//! (token, node) pair start at 1 and increase by 1 with no gaps; the input
//! and output hashes are canonical hashes of exactly what the plugin saw
//! and produced.
//!
//! A state begins `open` and transitions exactly once to `completed`,
//! `failed`, or `rejected`. Updating a non-open state is an integrity
//! violation the recorder refuses.
//!
//! Routing events hang off a gate's node-state, one per destination, each
//! bound to a registered edge. They are written before the state completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::value_objects::ids::{EdgeId, NodeId, RoutingEventId, StateId, TokenId};
use crate::value_objects::routing::RoutingMode;

/// Status of a node-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStateStatus {
    /// Begun, outcome not yet recorded.
    Open,
    /// Plugin invocation succeeded.
    Completed,
    /// Plugin invocation failed (business error or exception).
    Failed,
    /// Aggregation declined the token; it is not a batch member.
    Rejected,
}

impl NodeStateStatus {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStateStatus::Open => "open",
            NodeStateStatus::Completed => "completed",
            NodeStateStatus::Failed => "failed",
            NodeStateStatus::Rejected => "rejected",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "open" => Ok(NodeStateStatus::Open),
            "completed" => Ok(NodeStateStatus::Completed),
            "failed" => Ok(NodeStateStatus::Failed),
            "rejected" => Ok(NodeStateStatus::Rejected),
            other => Err(EngineError::serialization(format!(
                "unknown node state status '{}'",
                other
            ))),
        }
    }

    /// True for statuses a completion may set. `open` is only ever set by
    /// `begin_node_state`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeStateStatus::Open)
    }
}

/// The node-state record as persisted in the Landscape.
/// Unique on (token_id, node_id, attempt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub state_id: StateId,
    pub token_id: TokenId,
    pub node_id: NodeId,
    /// 1-based attempt counter, monotonic with no gaps.
    pub attempt: i64,
    /// The orchestrator-owned position in the pipeline.
    pub step_index: i64,
    pub status: NodeStateStatus,
    pub input_hash: String,
    pub output_hash: Option<String>,
    pub input_ref: Option<String>,
    pub output_ref: Option<String>,
    pub duration_ms: Option<i64>,
    pub error_json: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeState {
    /// True if the recorded error payload carries the quarantine flag.
    pub fn is_quarantined(&self) -> bool {
        self.error_json
            .as_ref()
            .and_then(|e| e.get("quarantine"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A routing event: one destination of a gate's routing decision, bound to
/// the deciding state and a registered edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEvent {
    pub event_id: RoutingEventId,
    pub state_id: StateId,
    pub edge_id: EdgeId,
    pub mode: RoutingMode,
    pub reason_json: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Key for edge lookups at routing time: (from node, label).
pub type EdgeKey = (NodeId, String);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_with_error(error: Option<Value>) -> NodeState {
        NodeState {
            state_id: StateId::new(),
            token_id: TokenId::new(),
            node_id: NodeId::new(),
            attempt: 1,
            step_index: 1,
            status: NodeStateStatus::Failed,
            input_hash: "abc".to_string(),
            output_hash: None,
            input_ref: None,
            output_ref: None,
            duration_ms: Some(3),
            error_json: error,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn quarantine_flag_is_read_from_error_json() {
        let quarantined = state_with_error(Some(json!({
            "reason": "content_safety_violation",
            "quarantine": true
        })));
        assert!(quarantined.is_quarantined());

        let plain = state_with_error(Some(json!({"reason": "api_error"})));
        assert!(!plain.is_quarantined());

        let no_error = state_with_error(None);
        assert!(!no_error.is_quarantined());
    }

    #[test]
    fn open_is_not_terminal() {
        assert!(!NodeStateStatus::Open.is_terminal());
        assert!(NodeStateStatus::Rejected.is_terminal());
    }
}
