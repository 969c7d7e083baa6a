// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resume Use Case
//!
//! `elspeth resume <run_id> --config <file>`: validate resumability,
//! rebuild the pipeline from the settings recorded on the run, restore
//! aggregation state, and replay unprocessed rows through the normal
//! orchestrator machinery. Completed runs are refused with a clear
//! message; a pipeline that cannot be reconstructed refuses rather than
//! silently skipping work.
//!
//! The `--config` file locates the Landscape and payload store; the
//! pipeline itself is rebuilt from the run's stored settings so the
//! resumed topology is exactly the recorded one.

use std::path::Path;
use std::sync::Arc;

use elspeth_bootstrap::ShutdownToken;
use elspeth_domain::repositories::{LandscapeInspector, LandscapeRecorder};
use elspeth_domain::value_objects::RunId;
use elspeth_domain::EngineError;

use crate::application::services::{build_pipeline, Orchestrator, RecoveryManager, RunReport};
use crate::infrastructure::config::{RuntimeConfig, Settings};

use super::wiring;

/// Resumes a failed run from its last checkpoint.
pub async fn resume_run(
    run_id_raw: &str,
    config_path: Option<&Path>,
    shutdown: Option<ShutdownToken>,
) -> Result<RunReport, EngineError> {
    let run_id = RunId::from_string(run_id_raw)?;

    let config_path = config_path.ok_or_else(|| {
        EngineError::InvalidConfiguration(
            "resume requires --config to locate the landscape".to_string(),
        )
    })?;
    let cli_settings = Settings::load(config_path)?;
    let stores = wiring::open_stores(&cli_settings).await?;

    let inspector: Arc<dyn LandscapeInspector> = stores.landscape.clone();
    let recorder: Arc<dyn LandscapeRecorder> = stores.landscape.clone();

    let recovery = RecoveryManager::new(inspector.clone());
    let (run, resume_point) = recovery.prepare_resume(run_id).await?;

    // The pipeline is rebuilt from the run's own settings; the CLI config
    // only located the stores.
    let run_settings = Settings::from_run_settings(&run.settings_json)?;
    let config = RuntimeConfig::from_settings(&run_settings)?;
    let telemetry = wiring::build_telemetry(&config.telemetry)?;
    let pipeline = build_pipeline(&run_settings.pipeline)?;

    let orchestrator = Orchestrator::new(
        recorder,
        inspector,
        config,
        run_settings,
        pipeline,
        telemetry.clone(),
        shutdown,
        resume_point.sequence_number,
    );

    let report = orchestrator.resume(run, resume_point).await;
    if let Some(telemetry) = telemetry {
        telemetry.close();
    }
    report
}
