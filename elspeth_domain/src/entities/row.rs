// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Row and Token Entities
//!
//! The identity model of the engine:
//!
//! - A **row** is the unit of identity: one per source row, created once at
//!   ingestion with its canonical hash and payload reference, immutable
//!   thereafter. After a retention purge the payload reference stops
//!   resolving; the hash remains forever.
//! - A **token** is the unit of flow: an instance of a row traveling the
//!   graph. Tokens may fork (one parent, several children, one per branch)
//!   and coalesce (several parents, one child). Parentage is recorded in
//!   `token_parents`; terminal states are derived from those relations, not
//!   stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::value_objects::ids::{NodeId, RowId, RunId, TokenId};

/// The row record as persisted in the Landscape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub row_id: RowId,
    pub run_id: RunId,
    pub source_node_id: NodeId,
    /// 0-based position in the source.
    pub row_index: i64,
    /// Canonical hash of the source data. Survives purge.
    pub source_data_hash: String,
    /// Payload-store reference; resolvable-to-absent after purge.
    pub source_data_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The token record as persisted in the Landscape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub token_id: TokenId,
    pub row_id: RowId,
    /// Set on fork children; the label of the branch they were forked onto.
    pub branch_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Kind of a token parentage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    Fork,
    Coalesce,
}

impl ParentKind {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentKind::Fork => "fork",
            ParentKind::Coalesce => "coalesce",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "fork" => Ok(ParentKind::Fork),
            "coalesce" => Ok(ParentKind::Coalesce),
            other => Err(EngineError::serialization(format!(
                "unknown parent kind '{}'",
                other
            ))),
        }
    }
}

/// Parentage record written at fork and coalesce points.
/// Uniqueness is (parent, child, kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenParent {
    pub parent_token_id: TokenId,
    pub child_token_id: TokenId,
    pub step_in_pipeline: i64,
    pub kind: ParentKind,
}
