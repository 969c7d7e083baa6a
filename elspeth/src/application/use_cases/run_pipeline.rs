// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Use Case
//!
//! `elspeth run <config>`: load and validate settings, wire the stores
//! and telemetry, build the pipeline, and execute a fresh run.

use std::path::Path;
use std::sync::Arc;

use elspeth_bootstrap::ShutdownToken;
use elspeth_domain::repositories::{LandscapeInspector, LandscapeRecorder};
use elspeth_domain::EngineError;

use crate::application::services::{build_pipeline, Orchestrator, RunReport};
use crate::infrastructure::config::{RuntimeConfig, Settings};

use super::wiring;

/// Executes a fresh pipeline run from a settings file.
pub async fn run_pipeline(
    config_path: &Path,
    shutdown: Option<ShutdownToken>,
) -> Result<RunReport, EngineError> {
    let settings = Settings::load(config_path)?;
    let config = RuntimeConfig::from_settings(&settings)?;
    let stores = wiring::open_stores(&settings).await?;
    let telemetry = wiring::build_telemetry(&config.telemetry)?;
    let pipeline = build_pipeline(&settings.pipeline)?;

    let recorder: Arc<dyn LandscapeRecorder> = stores.landscape.clone();
    let inspector: Arc<dyn LandscapeInspector> = stores.landscape.clone();

    let orchestrator = Orchestrator::new(
        recorder,
        inspector,
        config,
        settings,
        pipeline,
        telemetry.clone(),
        shutdown,
        0,
    );

    let report = orchestrator.execute().await;
    if let Some(telemetry) = telemetry {
        telemetry.close();
    }
    report
}
