// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Token Manager
//!
//! High-level wrapper around the recorder's identity operations. Produces
//! and threads [`TokenInfo`] mirrors: identity plus payload, never
//! position: the step index always travels explicitly beside the token.

use std::sync::Arc;

use serde_json::Value;

use elspeth_domain::repositories::LandscapeRecorder;
use elspeth_domain::value_objects::{RowId, TokenId, TokenInfo};
use elspeth_domain::EngineError;

/// Creates, forks, and coalesces tokens, mirroring each recorder identity
/// operation as an in-memory `TokenInfo`.
pub struct TokenManager {
    recorder: Arc<dyn LandscapeRecorder>,
}

impl TokenManager {
    pub fn new(recorder: Arc<dyn LandscapeRecorder>) -> Self {
        TokenManager { recorder }
    }

    /// Creates the initial token for a freshly ingested row.
    pub async fn create_token(
        &self,
        row_id: RowId,
        row_data: Value,
    ) -> Result<TokenInfo, EngineError> {
        let token = self.recorder.create_token(row_id).await?;
        Ok(TokenInfo::new(row_id, token.token_id, row_data))
    }

    /// Forks a parent into one child per branch label. Children carry a
    /// copy of `row_data` and their branch name; the parent terminates
    /// (its FORKED terminal state is derived from the parentage records).
    pub async fn fork_token(
        &self,
        parent: &TokenInfo,
        branches: &[String],
        step_in_pipeline: i64,
        row_data: &Value,
    ) -> Result<Vec<TokenInfo>, EngineError> {
        let children = self
            .recorder
            .fork_token(parent.token_id, parent.row_id, branches, step_in_pipeline)
            .await?;

        Ok(children
            .into_iter()
            .map(|child| TokenInfo {
                row_id: child.row_id,
                token_id: child.token_id,
                row_data: row_data.clone(),
                branch_name: child.branch_name,
            })
            .collect())
    }

    /// Coalesces parents into a single child carrying `row_data`.
    pub async fn coalesce_tokens(
        &self,
        parents: &[TokenId],
        row_id: RowId,
        step_in_pipeline: i64,
        row_data: Value,
    ) -> Result<TokenInfo, EngineError> {
        let child = self
            .recorder
            .coalesce_tokens(parents, row_id, step_in_pipeline)
            .await?;
        Ok(TokenInfo::new(row_id, child.token_id, row_data))
    }
}
