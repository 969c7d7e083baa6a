// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Node Entity
//!
//! A registered vertex of the execution graph. Nodes are created during
//! graph registration and immutable thereafter; every plugin invocation
//! is recorded as a node-state against its node.
//!
//! Two declarations are mandatory at registration and deliberately have no
//! default:
//!
//! - **node_type** classifies the plugin once; runtime dispatch is over this
//!   tag, never over attribute probing.
//! - **determinism** drives the reproducibility grade. A node without a
//!   determinism declaration fails registration (there is no "unknown").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::value_objects::ids::{NodeId, RunId};

/// The engine's tagged view of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Source,
    Transform,
    Gate,
    Aggregation,
    Coalesce,
    Sink,
}

impl NodeType {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Source => "source",
            NodeType::Transform => "transform",
            NodeType::Gate => "gate",
            NodeType::Aggregation => "aggregation",
            NodeType::Coalesce => "coalesce",
            NodeType::Sink => "sink",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "source" => Ok(NodeType::Source),
            "transform" => Ok(NodeType::Transform),
            "gate" => Ok(NodeType::Gate),
            "aggregation" => Ok(NodeType::Aggregation),
            "coalesce" => Ok(NodeType::Coalesce),
            "sink" => Ok(NodeType::Sink),
            other => Err(EngineError::serialization(format!(
                "unknown node type '{}'",
                other
            ))),
        }
    }
}

/// Declared determinism of a node. Required at registration; no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Determinism {
    /// Pure function of its input.
    Deterministic,
    /// Deterministic given the stored seed.
    Seeded,
    /// Reads external state but does not mutate it.
    IoRead,
    /// Writes external state.
    IoWrite,
    /// Calls an external service whose response is not a pure function of
    /// the request (LLMs, remote APIs).
    ExternalCall,
    /// Not reproducible even in principle.
    NonDeterministic,
}

impl Determinism {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            Determinism::Deterministic => "deterministic",
            Determinism::Seeded => "seeded",
            Determinism::IoRead => "io_read",
            Determinism::IoWrite => "io_write",
            Determinism::ExternalCall => "external_call",
            Determinism::NonDeterministic => "non_deterministic",
        }
    }

    /// Parses the Landscape string form. Unknown values are a registration
    /// error, surfaced as `UnknownDeterminism` by the caller.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deterministic" => Some(Determinism::Deterministic),
            "seeded" => Some(Determinism::Seeded),
            "io_read" => Some(Determinism::IoRead),
            "io_write" => Some(Determinism::IoWrite),
            "external_call" => Some(Determinism::ExternalCall),
            "non_deterministic" => Some(Determinism::NonDeterministic),
            _ => None,
        }
    }
}

/// Parameters for registering a node, gathered from the plugin's declared
/// attributes and its configuration.
#[derive(Debug, Clone)]
pub struct NodeRegistration {
    pub plugin_name: String,
    pub plugin_version: String,
    pub node_type: NodeType,
    pub determinism: Determinism,
    pub config: Value,
    pub schema_hash: Option<String>,
    pub sequence_in_pipeline: Option<i64>,
}

/// The node record as persisted in the Landscape. Immutable after
/// registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub run_id: RunId,
    pub plugin_name: String,
    pub plugin_version: String,
    pub node_type: NodeType,
    pub determinism: Determinism,
    pub config_hash: String,
    pub config_json: Value,
    pub sequence_in_pipeline: Option<i64>,
    pub schema_hash: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trips() {
        for t in [
            NodeType::Source,
            NodeType::Transform,
            NodeType::Gate,
            NodeType::Aggregation,
            NodeType::Coalesce,
            NodeType::Sink,
        ] {
            assert_eq!(NodeType::parse(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn determinism_has_no_default() {
        // parse returns None rather than falling back; registration turns
        // that into UnknownDeterminism.
        assert!(Determinism::parse("unknown").is_none());
        assert_eq!(
            Determinism::parse("external_call"),
            Some(Determinism::ExternalCall)
        );
    }
}
