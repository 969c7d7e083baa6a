// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retention and Purge
//!
//! Deletes payload blobs owned by runs completed before the retention
//! cutoff. Landscape rows are **never** deleted: the references stay in
//! place and become resolvable-to-absent, while every hash remains
//! byte-identical. Runs graded REPLAY_REPRODUCIBLE degrade to
//! ATTRIBUTABLE_ONLY once their payloads are gone; FULL_REPRODUCIBLE runs
//! keep their grade (the config regenerates the data).
//!
//! Purge is idempotent: re-running against already-deleted refs reports
//! them in `failed_refs`, which callers may ignore.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use elspeth_domain::repositories::{LandscapeInspector, LandscapeRecorder, PayloadStore};
use elspeth_domain::services::reproducibility;
use elspeth_domain::value_objects::RunId;
use elspeth_domain::EngineError;
use tracing::{info, warn};

/// Outcome of one purge pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeResult {
    pub dry_run: bool,
    /// Blobs actually deleted (or that would be, for a dry run).
    pub deleted_count: u64,
    pub bytes_freed: u64,
    /// Refs that no longer resolved (already purged) or failed to delete.
    pub failed_refs: Vec<String>,
    /// Runs whose payloads were touched.
    pub affected_runs: u64,
    pub duration_seconds: f64,
}

/// Identifies and deletes expired payloads, then updates grades.
pub struct RetentionService {
    inspector: Arc<dyn LandscapeInspector>,
    recorder: Arc<dyn LandscapeRecorder>,
    payloads: Arc<dyn PayloadStore>,
}

impl RetentionService {
    pub fn new(
        inspector: Arc<dyn LandscapeInspector>,
        recorder: Arc<dyn LandscapeRecorder>,
        payloads: Arc<dyn PayloadStore>,
    ) -> Self {
        RetentionService {
            inspector,
            recorder,
            payloads,
        }
    }

    /// Runs one purge pass over runs completed more than
    /// `retention_days` ago.
    pub async fn purge(&self, retention_days: u32, dry_run: bool) -> Result<PurgeResult, EngineError> {
        let started = Instant::now();
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));

        let refs = self.inspector.find_expired_payload_refs(cutoff).await?;

        let mut result = PurgeResult {
            dry_run,
            ..PurgeResult::default()
        };

        // The same blob may be referenced by several rows/states; delete
        // each hash once, but track every affected run.
        let mut seen_hashes: BTreeSet<String> = BTreeSet::new();
        let mut affected_runs: BTreeSet<RunId> = BTreeSet::new();

        for expired in &refs {
            if !seen_hashes.insert(expired.payload_hash.clone()) {
                affected_runs.insert(expired.run_id);
                continue;
            }

            let size = match self.payloads.retrieve(&expired.payload_hash).await {
                Ok(Some(bytes)) => bytes.len() as u64,
                Ok(None) => {
                    // Already purged on a prior pass; idempotent.
                    result.failed_refs.push(expired.payload_hash.clone());
                    continue;
                }
                Err(e) => {
                    warn!(hash = %expired.payload_hash, error = %e, "purge could not read blob");
                    result.failed_refs.push(expired.payload_hash.clone());
                    continue;
                }
            };

            if dry_run {
                result.deleted_count += 1;
                result.bytes_freed += size;
                affected_runs.insert(expired.run_id);
                continue;
            }

            match self.payloads.delete(&expired.payload_hash).await {
                Ok(true) => {
                    result.deleted_count += 1;
                    result.bytes_freed += size;
                    affected_runs.insert(expired.run_id);
                }
                Ok(false) => {
                    result.failed_refs.push(expired.payload_hash.clone());
                }
                Err(e) => {
                    warn!(hash = %expired.payload_hash, error = %e, "purge failed to delete blob");
                    result.failed_refs.push(expired.payload_hash.clone());
                }
            }
        }

        result.affected_runs = affected_runs.len() as u64;

        if !dry_run {
            for run_id in &affected_runs {
                if let Some(run) = self.inspector.get_run(*run_id).await? {
                    if let Some(grade) = run.reproducibility_grade {
                        let degraded = reproducibility::grade_after_purge(grade);
                        if degraded != grade {
                            self.recorder.update_grade(*run_id, degraded).await?;
                            info!(
                                run_id = %run_id,
                                from = grade.as_str(),
                                to = degraded.as_str(),
                                "reproducibility grade degraded by purge"
                            );
                        }
                    }
                }
            }
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        info!(
            deleted = result.deleted_count,
            bytes_freed = result.bytes_freed,
            failed = result.failed_refs.len(),
            affected_runs = result.affected_runs,
            dry_run,
            "purge pass finished"
        );
        Ok(result)
    }
}
