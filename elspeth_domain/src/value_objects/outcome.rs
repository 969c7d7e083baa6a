// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Row Processing Outcomes
//!
//! What the row processor reports back to the orchestrator for each source
//! row. The outcome decides the token's next hop: completed tokens go to
//! the default sink, routed tokens to their named sink, forked children to
//! the sinks their branch labels name, failed tokens to the error sink if
//! one is configured, consumed tokens nowhere.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value_objects::ids::NodeId;
use crate::value_objects::token_info::TokenInfo;

/// How a row's journey through the transform sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// Ran the full sequence; token awaits the default sink.
    Completed,
    /// A gate routed the token to a named sink.
    Routed,
    /// A gate forked the token; children surfaced to the orchestrator.
    Forked,
    /// An aggregation consumed the token into a batch.
    Consumed,
    /// A transform failed (business error or exhausted retries).
    Failed,
}

/// The row processor's report for one source row.
#[derive(Debug, Clone)]
pub struct RowResult {
    pub outcome: RowOutcome,
    /// The surviving token for `Completed`/`Routed`, or the failed token
    /// for `Failed` (so an error sink can still receive it).
    pub token: Option<TokenInfo>,
    /// Destination sink for `Routed`.
    pub sink_name: Option<String>,
    /// Fork children for `Forked`, each carrying its branch label.
    pub child_tokens: Vec<TokenInfo>,
    /// The recorded error payload for `Failed`.
    pub error: Option<Value>,
    /// The last node the token completed, for checkpoint placement.
    pub last_node_id: Option<NodeId>,
    /// Aggregated outputs when an acceptance triggered a flush.
    pub flush_outputs: Vec<Value>,
}

impl RowResult {
    /// A row that ran the full sequence.
    pub fn completed(token: TokenInfo) -> Self {
        RowResult {
            outcome: RowOutcome::Completed,
            token: Some(token),
            sink_name: None,
            child_tokens: Vec::new(),
            error: None,
            last_node_id: None,
            flush_outputs: Vec::new(),
        }
    }

    /// A row routed to a named sink by a gate.
    pub fn routed(token: TokenInfo, sink_name: impl Into<String>) -> Self {
        RowResult {
            outcome: RowOutcome::Routed,
            token: Some(token),
            sink_name: Some(sink_name.into()),
            child_tokens: Vec::new(),
            error: None,
            last_node_id: None,
            flush_outputs: Vec::new(),
        }
    }

    /// A row forked into child tokens.
    pub fn forked(children: Vec<TokenInfo>) -> Self {
        RowResult {
            outcome: RowOutcome::Forked,
            token: None,
            sink_name: None,
            child_tokens: children,
            error: None,
            last_node_id: None,
            flush_outputs: Vec::new(),
        }
    }

    /// A row consumed into an aggregation batch.
    pub fn consumed() -> Self {
        RowResult {
            outcome: RowOutcome::Consumed,
            token: None,
            sink_name: None,
            child_tokens: Vec::new(),
            error: None,
            last_node_id: None,
            flush_outputs: Vec::new(),
        }
    }

    /// A row that failed in a transform.
    pub fn failed(token: Option<TokenInfo>, error: Option<Value>) -> Self {
        RowResult {
            outcome: RowOutcome::Failed,
            token,
            sink_name: None,
            child_tokens: Vec::new(),
            error,
            last_node_id: None,
            flush_outputs: Vec::new(),
        }
    }

    /// Annotates the result with the last node the token completed.
    pub fn at_node(mut self, node_id: NodeId) -> Self {
        self.last_node_id = Some(node_id);
        self
    }

    /// Attaches flush outputs produced by a triggered aggregation.
    pub fn with_flush_outputs(mut self, outputs: Vec<Value>) -> Self {
        self.flush_outputs = outputs;
        self
    }
}

/// Aggregate counts for a finished run, printed by the CLI and mirrored in
/// the run-completed telemetry event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub rows_seen: u64,
    pub rows_completed: u64,
    pub rows_routed: u64,
    pub rows_forked: u64,
    pub rows_consumed: u64,
    pub rows_failed: u64,
    pub artifacts_written: u64,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Tallies one row result into the summary.
    pub fn record(&mut self, outcome: RowOutcome) {
        self.rows_seen += 1;
        match outcome {
            RowOutcome::Completed => self.rows_completed += 1,
            RowOutcome::Routed => self.rows_routed += 1,
            RowOutcome::Forked => self.rows_forked += 1,
            RowOutcome::Consumed => self.rows_consumed += 1,
            RowOutcome::Failed => self.rows_failed += 1,
        }
    }
}
