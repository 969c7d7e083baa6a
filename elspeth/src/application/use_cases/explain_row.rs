// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Explain Use Case
//!
//! `elspeth explain <config> <run_id> <row_id>`: assemble the full audit
//! lineage of one row. Lineage is returned even when payloads have been
//! purged: `payload_available=false` marks the gap, and every hash is
//! still present.

use std::path::Path;

use elspeth_domain::entities::RowLineage;
use elspeth_domain::repositories::LandscapeInspector;
use elspeth_domain::value_objects::{RowId, RunId};
use elspeth_domain::EngineError;

use crate::infrastructure::config::Settings;

use super::wiring;

/// Fetches the lineage of one row.
pub async fn explain_row(
    config_path: &Path,
    run_id_raw: &str,
    row_id_raw: &str,
) -> Result<RowLineage, EngineError> {
    let run_id = RunId::from_string(run_id_raw)?;
    let row_id = RowId::from_string(row_id_raw)?;

    let settings = Settings::load(config_path)?;
    let stores = wiring::open_stores(&settings).await?;

    stores.landscape.explain_row(run_id, row_id).await
}
