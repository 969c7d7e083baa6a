// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Checkpoint Manager
//!
//! The write path of crash recovery. Owns the run's monotonic sequence
//! number and applies the frequency policy:
//!
//! - `every_row`: a checkpoint after every processed row.
//! - `every_n`: every `checkpoint_interval` rows.
//! - `aggregation_only`: no row-boundary checkpoints.
//!
//! Aggregation flushes checkpoint unconditionally (when
//! `aggregation_boundaries` is on), carrying the aggregation's serialized
//! buffer keyed by node id. Checkpoints for a run are deleted on
//! successful completion and retained on failure.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use elspeth_domain::entities::Checkpoint;
use elspeth_domain::repositories::LandscapeRecorder;
use elspeth_domain::value_objects::{NodeId, RunId, TokenId};
use elspeth_domain::EngineError;

use crate::infrastructure::config::{CheckpointConfig, CheckpointFrequency};

/// Creates checkpoints per the configured frequency policy.
pub struct CheckpointManager {
    recorder: Arc<dyn LandscapeRecorder>,
    config: CheckpointConfig,
    sequence: AtomicI64,
    rows_since_checkpoint: AtomicU64,
}

impl CheckpointManager {
    /// `start_sequence` is 0 for fresh runs and the resume point's
    /// sequence number when resuming.
    pub fn new(
        recorder: Arc<dyn LandscapeRecorder>,
        config: CheckpointConfig,
        start_sequence: i64,
    ) -> Self {
        CheckpointManager {
            recorder,
            config,
            sequence: AtomicI64::new(start_sequence),
            rows_since_checkpoint: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Called after a row finishes processing. Creates a checkpoint iff
    /// the frequency condition is met.
    pub async fn maybe_checkpoint_row(
        &self,
        run_id: RunId,
        token_id: TokenId,
        node_id: NodeId,
    ) -> Result<Option<Checkpoint>, EngineError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let due = match self.config.frequency {
            CheckpointFrequency::EveryRow => true,
            CheckpointFrequency::EveryN => {
                let rows = self.rows_since_checkpoint.fetch_add(1, Ordering::SeqCst) + 1;
                if rows >= self.config.checkpoint_interval {
                    self.rows_since_checkpoint.store(0, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
            CheckpointFrequency::AggregationOnly => false,
        };

        if !due {
            return Ok(None);
        }

        let sequence = self.next_sequence();
        let checkpoint = self
            .recorder
            .create_checkpoint(run_id, token_id, node_id, sequence, None)
            .await?;
        debug!(run_id = %run_id, sequence, "row checkpoint created");
        Ok(Some(checkpoint))
    }

    /// Called at every aggregation flush. Unconditional (subject to the
    /// `aggregation_boundaries` switch), and carries the buffer state.
    pub async fn checkpoint_aggregation(
        &self,
        run_id: RunId,
        token_id: TokenId,
        node_id: NodeId,
        aggregation_state: &Value,
    ) -> Result<Option<Checkpoint>, EngineError> {
        if !self.config.enabled || !self.config.aggregation_boundaries {
            return Ok(None);
        }

        let sequence = self.next_sequence();
        let checkpoint = self
            .recorder
            .create_checkpoint(run_id, token_id, node_id, sequence, Some(aggregation_state))
            .await?;
        debug!(run_id = %run_id, sequence, "aggregation checkpoint created");
        Ok(Some(checkpoint))
    }

    /// Deletes all checkpoints for the run (successful completion path).
    pub async fn clear(&self, run_id: RunId) -> Result<u64, EngineError> {
        self.recorder.delete_checkpoints(run_id).await
    }
}
