// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Edge Entity
//!
//! A registered connection between two nodes. Edges are created explicitly
//! at graph build (one per gate x sink label pair plus the linear "continue"
//! edges), never synthesized at routing time. A routing decision that
//! names a label with no registered edge is a `MissingEdge` integrity error.
//!
//! Label uniqueness is `(from_node, label)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::ids::{EdgeId, NodeId, RunId};
use crate::value_objects::routing::RoutingMode;

/// The edge record as persisted in the Landscape. Immutable after
/// registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: EdgeId,
    pub run_id: RunId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub label: String,
    pub default_mode: RoutingMode,
    pub created_at: DateTime<Utc>,
}
