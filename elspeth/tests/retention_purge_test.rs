// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Retention purge: expired payload blobs disappear, every Landscape row
//! and hash survives byte-identical, lineage reports
//! `payload_available=false`, and REPLAY_REPRODUCIBLE runs degrade to
//! ATTRIBUTABLE_ONLY while FULL_REPRODUCIBLE runs keep their grade.

mod common;

use elspeth::application::services::RetentionService;
use elspeth_domain::repositories::{LandscapeInspector, PayloadStore};
use elspeth_domain::{ReproducibilityGrade, TerminalState};
use serde_json::json;

fn deterministic_settings() -> elspeth::infrastructure::config::Settings {
    common::settings_with(common::linear_pipeline(
        vec![json!({"value": 1}), json!({"value": 2})],
        vec![common::plugin("multiply", json!({"field": "value", "factor": 2.0}))],
        &["default"],
    ))
}

fn replay_settings() -> elspeth::infrastructure::config::Settings {
    // The flaky transform declares non_deterministic, capping the run at
    // REPLAY_REPRODUCIBLE even when it never fails.
    common::settings_with(common::linear_pipeline(
        vec![json!({"value": 1})],
        vec![common::plugin("flaky", json!({"fail_times": 0}))],
        &["default"],
    ))
}

#[tokio::test]
async fn purge_preserves_audit_rows_and_hashes() {
    let harness = common::harness(deterministic_settings()).await;
    let report = common::execute(&harness).await.unwrap();
    let run_id = report.run.run_id;

    let rows_before = harness.landscape.list_rows(run_id).await.unwrap();
    let hashes_before: Vec<String> = rows_before
        .iter()
        .map(|r| r.source_data_hash.clone())
        .collect();
    assert!(harness.payloads.len() > 0);

    let service = RetentionService::new(
        harness.landscape.clone(),
        harness.landscape.clone(),
        harness.payloads.clone(),
    );

    // Dry run first: reports totals, deletes nothing.
    let preview = service.purge(0, true).await.unwrap();
    assert!(preview.dry_run);
    assert!(preview.deleted_count > 0);
    assert!(preview.bytes_freed > 0);
    assert!(harness.payloads.len() > 0);

    // Real pass: blobs disappear.
    let result = service.purge(0, false).await.unwrap();
    assert_eq!(result.deleted_count, preview.deleted_count);
    assert_eq!(harness.payloads.len(), 0);
    assert_eq!(result.affected_runs, 1);

    // Landscape rows and hashes survive byte-identical.
    let rows_after = harness.landscape.list_rows(run_id).await.unwrap();
    assert_eq!(rows_after.len(), rows_before.len());
    for (row, hash_before) in rows_after.iter().zip(hashes_before.iter()) {
        assert_eq!(&row.source_data_hash, hash_before);
        // The reference column survives too; it just no longer resolves.
        let payload_ref = row.source_data_ref.as_ref().unwrap();
        assert!(!harness.payloads.exists(payload_ref).await.unwrap());
    }

    // Lineage still answers, with the gap marked.
    let lineage = harness
        .landscape
        .explain_row(run_id, rows_after[0].row_id)
        .await
        .unwrap();
    assert!(!lineage.payload_available);
    assert!(lineage.source_data.is_none());
    assert_eq!(lineage.tokens[0].terminal_state, TerminalState::Completed);

    // Re-running purge is idempotent: already-deleted refs land in
    // failed_refs and nothing else changes.
    let again = service.purge(0, false).await.unwrap();
    assert_eq!(again.deleted_count, 0);
    assert!(!again.failed_refs.is_empty());
}

#[tokio::test]
async fn purge_degrades_replay_reproducible_only() {
    // One replayable run, one fully reproducible run, same landscape.
    let harness = common::harness(replay_settings()).await;
    let replay_report = common::execute(&harness).await.unwrap();
    assert_eq!(
        replay_report.run.reproducibility_grade,
        Some(ReproducibilityGrade::ReplayReproducible)
    );

    let deterministic = common::Harness {
        landscape: harness.landscape.clone(),
        payloads: harness.payloads.clone(),
        settings: deterministic_settings(),
    };
    let full_report = common::execute(&deterministic).await.unwrap();
    assert_eq!(
        full_report.run.reproducibility_grade,
        Some(ReproducibilityGrade::FullReproducible)
    );

    let service = RetentionService::new(
        harness.landscape.clone(),
        harness.landscape.clone(),
        harness.payloads.clone(),
    );
    service.purge(0, false).await.unwrap();

    let replay_after = harness
        .landscape
        .get_run(replay_report.run.run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        replay_after.reproducibility_grade,
        Some(ReproducibilityGrade::AttributableOnly)
    );

    let full_after = harness
        .landscape
        .get_run(full_report.run.run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        full_after.reproducibility_grade,
        Some(ReproducibilityGrade::FullReproducible)
    );
}
