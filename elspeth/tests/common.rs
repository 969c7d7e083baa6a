// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared integration-test harness: an in-memory Landscape, in-memory
//! payload store, and helpers for building pipeline settings the way the
//! registry expects them.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use elspeth::application::services::{build_pipeline, Orchestrator, RunReport};
use elspeth::infrastructure::config::settings::{
    CheckpointSettings, LandscapeSettings, PayloadStoreSettings, PipelineSettings,
    PluginSettings, RateLimitSettings, Settings, TelemetrySettings,
};
use elspeth::infrastructure::config::RuntimeConfig;
use elspeth::{EngineError, InMemoryPayloadStore, SqliteLandscape};

/// Everything a scenario needs to execute runs and inspect the evidence.
pub struct Harness {
    pub landscape: Arc<SqliteLandscape>,
    pub payloads: Arc<InMemoryPayloadStore>,
    pub settings: Settings,
}

/// One configured plugin.
pub fn plugin(name: &str, options: Value) -> PluginSettings {
    PluginSettings {
        plugin: name.to_string(),
        options,
        max_attempts: None,
    }
}

/// One configured plugin with a retry budget.
pub fn plugin_with_retry(name: &str, options: Value, max_attempts: u32) -> PluginSettings {
    PluginSettings {
        plugin: name.to_string(),
        options,
        max_attempts: Some(max_attempts),
    }
}

/// Settings over an in-memory landscape with the given pipeline. The
/// payload path is never touched (tests swap in an in-memory store).
pub fn settings_with(pipeline: PipelineSettings) -> Settings {
    Settings {
        canonical_version: None,
        landscape: LandscapeSettings {
            url: ":memory:".to_string(),
        },
        payload_store: PayloadStoreSettings {
            base_path: "/tmp/elspeth-test-payloads".to_string(),
        },
        checkpoint: CheckpointSettings::default(),
        rate_limit: RateLimitSettings::default(),
        telemetry: TelemetrySettings {
            enabled: false,
            ..TelemetrySettings::default()
        },
        pipeline,
        retention_days: None,
    }
}

/// A linear pipeline: memory source over `rows`, the given steps, and
/// memory sinks under the given names (first is the default).
pub fn linear_pipeline(
    rows: Vec<Value>,
    steps: Vec<PluginSettings>,
    sink_names: &[&str],
) -> PipelineSettings {
    let mut sinks = BTreeMap::new();
    for name in sink_names {
        sinks.insert(name.to_string(), plugin("memory_sink", Value::Null));
    }
    PipelineSettings {
        source: plugin("memory", serde_json::json!({ "rows": rows })),
        steps,
        sinks,
        default_sink: sink_names[0].to_string(),
        error_sink: None,
    }
}

/// Builds a harness around the settings: in-memory Landscape sharing an
/// in-memory payload store.
pub async fn harness(settings: Settings) -> Harness {
    let payloads = Arc::new(InMemoryPayloadStore::new());
    let landscape = Arc::new(
        SqliteLandscape::in_memory(payloads.clone())
            .await
            .expect("in-memory landscape"),
    );
    Harness {
        landscape,
        payloads,
        settings,
    }
}

/// Builds the orchestrator for the harness settings and executes a fresh
/// run.
pub async fn execute(harness: &Harness) -> Result<RunReport, EngineError> {
    let config = RuntimeConfig::from_settings(&harness.settings)?;
    let pipeline = build_pipeline(&harness.settings.pipeline)?;
    let orchestrator = Orchestrator::new(
        harness.landscape.clone(),
        harness.landscape.clone(),
        config,
        harness.settings.clone(),
        pipeline,
        None,
        None,
        0,
    );
    orchestrator.execute().await
}
