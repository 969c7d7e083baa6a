// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Recovery Manager
//!
//! The read side of crash recovery. Answers three questions from the
//! Landscape alone:
//!
//! - **can this run resume?**: it exists, it is failed (not completed,
//!   not still running), and at least one checkpoint survives.
//! - **from where?**: the highest-sequence checkpoint, including any
//!   aggregation buffer state.
//! - **which rows remain?**: rows whose latest-attempt state at a sink
//!   is not completed, in source order.
//!
//! Resume itself reconstructs the pipeline from the settings stored on the
//! run and replays through the normal orchestrator machinery; when the
//! stored settings cannot rebuild the pipeline it refuses loudly rather
//! than silently skipping work.

use std::sync::Arc;

use elspeth_domain::entities::{ResumePoint, Row, Run, RunStatus};
use elspeth_domain::repositories::LandscapeInspector;
use elspeth_domain::services::CANONICAL_VERSION;
use elspeth_domain::value_objects::RunId;
use elspeth_domain::EngineError;

/// Reads resume state and validates resumability.
pub struct RecoveryManager {
    inspector: Arc<dyn LandscapeInspector>,
}

impl RecoveryManager {
    pub fn new(inspector: Arc<dyn LandscapeInspector>) -> Self {
        RecoveryManager { inspector }
    }

    /// True iff the run can be resumed.
    pub async fn can_resume(&self, run_id: RunId) -> Result<bool, EngineError> {
        self.inspector.can_resume(run_id).await
    }

    /// Validates resumability and returns the run with its resume point.
    /// Refusals carry a message naming the exact reason.
    pub async fn prepare_resume(
        &self,
        run_id: RunId,
    ) -> Result<(Run, ResumePoint), EngineError> {
        let run = self
            .inspector
            .get_run(run_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("run {}", run_id)))?;

        match run.status {
            RunStatus::Completed => {
                return Err(EngineError::ResumeRefused(format!(
                    "run {} already completed; there is nothing to resume",
                    run_id
                )));
            }
            RunStatus::Running => {
                return Err(EngineError::ResumeRefused(format!(
                    "run {} is recorded as still running; resume only applies to failed runs",
                    run_id
                )));
            }
            RunStatus::Failed => {}
        }

        if run.canonical_version != CANONICAL_VERSION {
            return Err(EngineError::ResumeRefused(format!(
                "run {} was recorded with canonical version '{}' but this engine implements '{}'",
                run_id, run.canonical_version, CANONICAL_VERSION
            )));
        }

        let resume_point = self.inspector.resume_point(run_id).await?.ok_or_else(|| {
            EngineError::ResumeRefused(format!(
                "run {} has no checkpoints; it cannot be resumed",
                run_id
            ))
        })?;

        Ok((run, resume_point))
    }

    /// Rows not yet completed at a sink, in source order.
    pub async fn unprocessed_rows(&self, run_id: RunId) -> Result<Vec<Row>, EngineError> {
        self.inspector.unprocessed_rows(run_id).await
    }
}
