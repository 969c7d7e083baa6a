// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared wiring for the CLI use cases: opening the Landscape and payload
//! store from settings and building the telemetry manager from its
//! configured exporters.

use std::sync::Arc;

use elspeth_domain::repositories::PayloadStore;
use elspeth_domain::EngineError;

use crate::infrastructure::config::{RuntimeConfig, Settings, TelemetryConfig};
use crate::infrastructure::repositories::SqliteLandscape;
use crate::infrastructure::services::FsPayloadStore;
use crate::infrastructure::telemetry::{TelemetryExporter, TelemetryManager, TracingExporter};

/// The stores a use case needs: the Landscape (recorder + inspector) and
/// its payload store.
pub struct Stores {
    pub landscape: Arc<SqliteLandscape>,
    pub payloads: Arc<dyn PayloadStore>,
}

/// Opens the Landscape and payload store configured in settings.
pub async fn open_stores(settings: &Settings) -> Result<Stores, EngineError> {
    let config = RuntimeConfig::from_settings(settings)?;
    let payloads: Arc<dyn PayloadStore> =
        Arc::new(FsPayloadStore::new(config.payload_store_path.clone()));
    let landscape = Arc::new(
        SqliteLandscape::new(&config.landscape_url, Arc::clone(&payloads)).await?,
    );
    Ok(Stores {
        landscape,
        payloads,
    })
}

/// Builds the telemetry manager from configuration, resolving exporter
/// names and failing fast on unknown names or bad options.
pub fn build_telemetry(
    config: &TelemetryConfig,
) -> Result<Option<Arc<TelemetryManager>>, EngineError> {
    if !config.enabled {
        return Ok(None);
    }

    let mut exporters: Vec<Arc<dyn TelemetryExporter>> = Vec::with_capacity(config.exporters.len());
    for (name, options) in &config.exporters {
        let mut exporter: Box<dyn TelemetryExporter> = match name.as_str() {
            "log" => Box::new(TracingExporter::new()),
            other => {
                return Err(EngineError::InvalidConfiguration(format!(
                    "unknown telemetry exporter '{}'",
                    other
                )));
            }
        };
        exporter.configure(options)?;
        exporters.push(Arc::from(exporter));
    }

    Ok(Some(Arc::new(TelemetryManager::new(
        exporters,
        config.granularity,
        config.backpressure_mode,
        config.buffer_capacity,
        config.max_consecutive_failures,
        config.fail_on_total_exporter_failure,
    ))))
}
