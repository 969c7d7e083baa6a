// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Flight Token
//!
//! The in-memory mirror of a token: identity plus the current row payload.
//! Deliberately **no position**: the orchestrator and row processor own
//! the authoritative step index and pass it explicitly. Keeping position
//! out of the token prevents two sources of truth from drifting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value_objects::ids::{RowId, TokenId};

/// A token in flight: identity and payload, never position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub row_id: RowId,
    pub token_id: TokenId,
    /// The row data as the next plugin will see it.
    pub row_data: Value,
    /// Set on fork children: the branch label they were created for.
    pub branch_name: Option<String>,
}

impl TokenInfo {
    /// Creates a token mirror for a freshly created token.
    pub fn new(row_id: RowId, token_id: TokenId, row_data: Value) -> Self {
        TokenInfo {
            row_id,
            token_id,
            row_data,
            branch_name: None,
        }
    }

    /// Returns this token with its payload replaced (after a transform).
    pub fn with_row_data(mut self, row_data: Value) -> Self {
        self.row_data = row_data;
        self
    }
}
