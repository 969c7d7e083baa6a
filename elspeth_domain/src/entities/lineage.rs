// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Row Lineage Read Model
//!
//! The answer to "what happened to this row": every node-state, routing
//! event, and artifact joined back through its tokens, plus the source
//! payload if it still resolves. This is a read model assembled from the
//! Landscape; nothing here is stored as such.
//!
//! Terminal token states live here too. They are **derived** from
//! relational evidence, never persisted. Deliberate: the audit
//! store cannot disagree with itself about how a token ended.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::artifact::Artifact;
use crate::entities::node_state::{NodeState, RoutingEvent};
use crate::value_objects::ids::{RowId, RunId, TokenId};

/// Derived classification of how a token's journey ended.
///
/// Exactly one holds for any token with evidence; the derivation applies
/// the failure checks first, then completion, then structural relations:
///
/// 1. `Quarantined`: latest state failed with the quarantine flag.
/// 2. `Failed`: latest state failed without it.
/// 3. `Completed`: latest state at a sink node completed.
/// 4. `Forked`: parent in token_parents with kind=fork.
/// 5. `Coalesced`: parent in token_parents with kind=coalesce.
/// 6. `ConsumedInBatch`: member of a batch.
/// 7. `Routed`: a routing event exists on one of its states (routed but
///    never sink-completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Completed,
    Routed,
    Forked,
    Coalesced,
    ConsumedInBatch,
    Quarantined,
    Failed,
    /// No terminal evidence yet (run still in flight or token lost to a
    /// crash before any state completed).
    InFlight,
}

/// One token's journey: its states in step order and any routing events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLineage {
    pub token_id: TokenId,
    pub branch_name: Option<String>,
    pub terminal_state: TerminalState,
    pub states: Vec<NodeState>,
    pub routing_events: Vec<RoutingEvent>,
}

/// Full lineage of one source row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowLineage {
    pub run_id: RunId,
    pub row_id: RowId,
    pub row_index: i64,
    pub source_data_hash: String,
    /// The source payload, when the blob still resolves.
    pub source_data: Option<Value>,
    /// False once the payload store no longer holds the referenced blobs.
    pub payload_available: bool,
    pub tokens: Vec<TokenLineage>,
    pub artifacts: Vec<Artifact>,
}
