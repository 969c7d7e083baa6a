// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Purge Use Case
//!
//! `elspeth purge <config> --retention-days N [--dry-run] [--yes]`:
//! delete expired payload blobs while preserving every Landscape row and
//! hash. The CLI reports dry-run totals first and requires confirmation
//! unless `--yes`.

use std::path::Path;

use elspeth_domain::EngineError;

use crate::application::services::{PurgeResult, RetentionService};
use crate::infrastructure::config::Settings;

use super::wiring;

/// Runs one purge pass.
pub async fn purge_payloads(
    config_path: &Path,
    retention_days: u32,
    dry_run: bool,
) -> Result<PurgeResult, EngineError> {
    let settings = Settings::load(config_path)?;
    let stores = wiring::open_stores(&settings).await?;

    let service = RetentionService::new(
        stores.landscape.clone(),
        stores.landscape.clone(),
        stores.payloads,
    );
    service.purge(retention_days, dry_run).await
}
