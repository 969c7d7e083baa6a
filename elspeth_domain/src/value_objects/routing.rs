// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Routing Value Objects
//!
//! A gate's decision about a token: continue down the pipeline, route to a
//! named sink, or fork onto several branches. The decision is a value; the
//! gate executor turns it into routing events bound to registered edges,
//! and a decision naming an unregistered edge is fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Whether the token moves along the edge or a copy does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    Move,
    Copy,
}

impl RoutingMode {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMode::Move => "move",
            RoutingMode::Copy => "copy",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "move" => Ok(RoutingMode::Move),
            "copy" => Ok(RoutingMode::Copy),
            other => Err(EngineError::serialization(format!(
                "unknown routing mode '{}'",
                other
            ))),
        }
    }
}

/// The shape of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKind {
    /// Proceed to the next node; no routing event.
    Continue,
    /// Leave the pipeline for the sink named by the single destination.
    Route,
    /// Fork one child per destination label; the parent terminates here.
    Fork,
}

/// A gate's routing decision with its structured reason.
///
/// Constructed through the factory methods so the kind/destination
/// combinations stay coherent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingAction {
    pub kind: RoutingKind,
    /// Edge labels; empty for `Continue`, exactly one for `Route`.
    pub destinations: Vec<String>,
    pub mode: RoutingMode,
    /// Structured explanation recorded on every routing event.
    pub reason: Value,
}

impl RoutingAction {
    /// The token continues down the pipeline.
    pub fn continue_() -> Self {
        RoutingAction {
            kind: RoutingKind::Continue,
            destinations: Vec::new(),
            mode: RoutingMode::Move,
            reason: Value::Null,
        }
    }

    /// Route the token to the sink registered under `label`.
    pub fn route_to_sink(label: impl Into<String>, reason: Value) -> Self {
        RoutingAction {
            kind: RoutingKind::Route,
            destinations: vec![label.into()],
            mode: RoutingMode::Move,
            reason,
        }
    }

    /// Fork a child token onto each labeled branch. Fork mode is always
    /// `copy`: each child carries its own copy of the row data.
    pub fn fork_to_paths(labels: Vec<String>, reason: Value) -> Self {
        RoutingAction {
            kind: RoutingKind::Fork,
            destinations: labels,
            mode: RoutingMode::Copy,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn continue_has_no_destinations() {
        let action = RoutingAction::continue_();
        assert_eq!(action.kind, RoutingKind::Continue);
        assert!(action.destinations.is_empty());
    }

    #[test]
    fn route_carries_single_label() {
        let action = RoutingAction::route_to_sink("high", json!({"threshold": 50}));
        assert_eq!(action.kind, RoutingKind::Route);
        assert_eq!(action.destinations, vec!["high".to_string()]);
        assert_eq!(action.mode, RoutingMode::Move);
    }

    #[test]
    fn fork_is_always_copy() {
        let action =
            RoutingAction::fork_to_paths(vec!["a".to_string(), "b".to_string()], Value::Null);
        assert_eq!(action.mode, RoutingMode::Copy);
        assert_eq!(action.destinations.len(), 2);
    }
}
