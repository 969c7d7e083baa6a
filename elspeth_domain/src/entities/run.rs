// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Entity
//!
//! A `Run` is the root of the audit trail: every node, edge, row, token,
//! batch, checkpoint, and artifact joins back to exactly one run. The run
//! records the configuration hash and canonical hash version in force, so
//! that the audit evidence can be interpreted (and, when the grade permits,
//! replayed) long after execution.
//!
//! The run row is created by `begin_run` and mutated only by
//! `finalize_run`/`complete_run` and by the retention purge's grade update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::value_objects::ids::RunId;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(EngineError::serialization(format!(
                "unknown run status '{}'",
                other
            ))),
        }
    }
}

/// Reproducibility grade computed at finalization and degraded on purge.
///
/// - `FullReproducible`: every node is deterministic (or seeded with a
///   stored seed); re-running the config reproduces the outputs.
/// - `ReplayReproducible`: at least one node is non-deterministic or makes
///   external calls; outputs can be replayed from retained payloads.
/// - `AttributableOnly`: payloads were purged; hashes still attribute every
///   decision, but replay is no longer possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReproducibilityGrade {
    FullReproducible,
    ReplayReproducible,
    AttributableOnly,
}

impl ReproducibilityGrade {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReproducibilityGrade::FullReproducible => "full_reproducible",
            ReproducibilityGrade::ReplayReproducible => "replay_reproducible",
            ReproducibilityGrade::AttributableOnly => "attributable_only",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "full_reproducible" => Ok(ReproducibilityGrade::FullReproducible),
            "replay_reproducible" => Ok(ReproducibilityGrade::ReplayReproducible),
            "attributable_only" => Ok(ReproducibilityGrade::AttributableOnly),
            other => Err(EngineError::serialization(format!(
                "unknown reproducibility grade '{}'",
                other
            ))),
        }
    }
}

/// The run record as persisted in the Landscape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Canonical hash of the settings the run was started with.
    pub config_hash: String,
    /// The settings, verbatim, for reconstruction at resume.
    pub settings_json: Value,
    /// Canonical hash algorithm version (e.g. "sha256-rfc8785-v1").
    pub canonical_version: String,
    /// Set by finalize_run; degraded by purge. Null while running.
    pub reproducibility_grade: Option<ReproducibilityGrade>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// True once the run has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(RunStatus::parse("paused").is_err());
    }

    #[test]
    fn grade_round_trips() {
        for grade in [
            ReproducibilityGrade::FullReproducible,
            ReproducibilityGrade::ReplayReproducible,
            ReproducibilityGrade::AttributableOnly,
        ] {
            assert_eq!(ReproducibilityGrade::parse(grade.as_str()).unwrap(), grade);
        }
    }
}
