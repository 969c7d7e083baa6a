// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Entities
//!
//! A batch is the set of tokens an aggregation consumed between two
//! flushes. The lifecycle is a strict state machine:
//!
//! ```text
//! draft ──> executing ──> completed
//!                └──────> failed
//! ```
//!
//! Members may only be added while the batch is `draft`; `completed` and
//! `failed` are terminal. The recorder enforces these transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::value_objects::ids::{BatchId, NodeId, RunId, TokenId};

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Draft,
    Executing,
    Completed,
    Failed,
}

impl BatchStatus {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Draft => "draft",
            BatchStatus::Executing => "executing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "draft" => Ok(BatchStatus::Draft),
            "executing" => Ok(BatchStatus::Executing),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(EngineError::serialization(format!(
                "unknown batch status '{}'",
                other
            ))),
        }
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (BatchStatus::Draft, BatchStatus::Executing)
                | (BatchStatus::Executing, BatchStatus::Completed)
                | (BatchStatus::Executing, BatchStatus::Failed)
        )
    }

    /// True for the terminal statuses.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

/// The batch record as persisted in the Landscape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub run_id: RunId,
    pub aggregation_node_id: NodeId,
    pub status: BatchStatus,
    /// Why the batch was flushed (size threshold, end of source, ...).
    pub trigger_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub flushed_at: Option<DateTime<Utc>>,
}

/// Membership record: token consumed into a batch.
/// Uniqueness is (batch_id, token_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMember {
    pub batch_id: BatchId,
    pub token_id: TokenId,
    /// Acceptance order within the batch.
    pub ordinal: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        assert!(BatchStatus::Draft.can_transition_to(BatchStatus::Executing));
        assert!(BatchStatus::Executing.can_transition_to(BatchStatus::Completed));
        assert!(BatchStatus::Executing.can_transition_to(BatchStatus::Failed));

        // No shortcuts and no exits from terminal states.
        assert!(!BatchStatus::Draft.can_transition_to(BatchStatus::Completed));
        assert!(!BatchStatus::Completed.can_transition_to(BatchStatus::Executing));
        assert!(!BatchStatus::Failed.can_transition_to(BatchStatus::Draft));
    }
}
