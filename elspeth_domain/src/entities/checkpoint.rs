// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Checkpoint Entity
//!
//! Durable record of in-run progress, indexed by a monotonic
//! `sequence_number` per run. Checkpoints created at aggregation flushes
//! also carry the aggregation's serialized buffer state, keyed by
//! aggregation node id.
//!
//! Checkpoints are deleted on successful run completion and retained on
//! failure, where the recovery manager reads them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value_objects::ids::{CheckpointId, NodeId, RunId, TokenId};

/// The checkpoint record as persisted in the Landscape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: CheckpointId,
    pub run_id: RunId,
    pub token_id: TokenId,
    pub node_id: NodeId,
    /// Monotonic within the run.
    pub sequence_number: i64,
    /// JSON object keyed by aggregation node id, present for checkpoints
    /// taken at aggregation boundaries.
    pub aggregation_state_json: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// The most recent checkpoint of a resumable run, with the fields a resume
/// needs pulled to the top.
#[derive(Debug, Clone)]
pub struct ResumePoint {
    pub checkpoint: Checkpoint,
    pub token_id: TokenId,
    pub node_id: NodeId,
    pub sequence_number: i64,
    pub aggregation_state: Option<Value>,
}
