// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime Configuration (Strict Shape)
//!
//! The immutable configuration the engine consumes. Conversion from
//! [`Settings`](super::settings::Settings) happens once at startup; every
//! enum parses strictly and unimplemented options are rejected loudly
//! here, never deep inside a run.

use std::collections::HashMap;
use std::path::PathBuf;

use elspeth_domain::events::Granularity;
use elspeth_domain::services::CANONICAL_VERSION;
use elspeth_domain::EngineError;

use crate::infrastructure::services::rate_limiter::ServiceLimits;
use crate::infrastructure::telemetry::BackpressureMode;

use super::settings::Settings;

/// When row-boundary checkpoints are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFrequency {
    EveryRow,
    EveryN,
    AggregationOnly,
}

impl CheckpointFrequency {
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "every_row" => Ok(CheckpointFrequency::EveryRow),
            "every_n" => Ok(CheckpointFrequency::EveryN),
            "aggregation_only" => Ok(CheckpointFrequency::AggregationOnly),
            other => Err(EngineError::InvalidConfiguration(format!(
                "unknown checkpoint frequency '{}'",
                other
            ))),
        }
    }
}

/// Strict checkpointing configuration.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub frequency: CheckpointFrequency,
    pub checkpoint_interval: u64,
    pub aggregation_boundaries: bool,
}

/// Strict rate-limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub default_limits: ServiceLimits,
    pub overrides: HashMap<String, ServiceLimits>,
    pub persistence_path: Option<PathBuf>,
}

/// Strict telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub granularity: Granularity,
    pub backpressure_mode: BackpressureMode,
    pub fail_on_total_exporter_failure: bool,
    pub buffer_capacity: usize,
    pub max_consecutive_failures: u64,
    /// (name, options) pairs, resolved against the exporter registry at
    /// wiring time.
    pub exporters: Vec<(String, serde_json::Value)>,
}

/// The engine's immutable view of the configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub canonical_version: String,
    pub landscape_url: String,
    pub payload_store_path: PathBuf,
    pub checkpoint: CheckpointConfig,
    pub rate_limit: RateLimitConfig,
    pub telemetry: TelemetryConfig,
    pub retention_days: Option<u32>,
}

impl RuntimeConfig {
    /// Converts permissive settings into the strict runtime shape,
    /// rejecting unknown or reserved options.
    pub fn from_settings(settings: &Settings) -> Result<RuntimeConfig, EngineError> {
        let canonical_version = settings
            .canonical_version
            .clone()
            .unwrap_or_else(|| CANONICAL_VERSION.to_string());
        if canonical_version != CANONICAL_VERSION {
            return Err(EngineError::InvalidConfiguration(format!(
                "unsupported canonical version '{}'; this engine implements '{}'",
                canonical_version, CANONICAL_VERSION
            )));
        }

        let checkpoint = CheckpointConfig {
            enabled: settings.checkpoint.enabled,
            frequency: CheckpointFrequency::parse(&settings.checkpoint.frequency)?,
            checkpoint_interval: settings.checkpoint.checkpoint_interval.max(1),
            aggregation_boundaries: settings.checkpoint.aggregation_boundaries,
        };

        let rate_limit = RateLimitConfig {
            enabled: settings.rate_limit.enabled,
            default_limits: ServiceLimits {
                requests_per_second: settings.rate_limit.default_requests_per_second,
                requests_per_minute: settings.rate_limit.default_requests_per_minute,
            },
            overrides: settings
                .rate_limit
                .services
                .iter()
                .map(|(name, limits)| {
                    (
                        name.clone(),
                        ServiceLimits {
                            requests_per_second: limits.rps,
                            requests_per_minute: limits.rpm,
                        },
                    )
                })
                .collect(),
            persistence_path: settings.rate_limit.persistence_path.clone().map(PathBuf::from),
        };

        let telemetry = TelemetryConfig {
            enabled: settings.telemetry.enabled,
            granularity: Granularity::parse(&settings.telemetry.granularity)?,
            backpressure_mode: BackpressureMode::parse(&settings.telemetry.backpressure_mode)?,
            fail_on_total_exporter_failure: settings.telemetry.fail_on_total_exporter_failure,
            buffer_capacity: settings.telemetry.buffer_capacity,
            max_consecutive_failures: settings.telemetry.max_consecutive_failures,
            exporters: settings
                .telemetry
                .exporters
                .iter()
                .map(|e| (e.name.clone(), e.options.clone()))
                .collect(),
        };

        if !settings
            .pipeline
            .sinks
            .contains_key(&settings.pipeline.default_sink)
        {
            return Err(EngineError::InvalidConfiguration(format!(
                "default_sink '{}' is not a configured sink",
                settings.pipeline.default_sink
            )));
        }
        if let Some(error_sink) = &settings.pipeline.error_sink {
            if !settings.pipeline.sinks.contains_key(error_sink) {
                return Err(EngineError::InvalidConfiguration(format!(
                    "error_sink '{}' is not a configured sink",
                    error_sink
                )));
            }
        }

        Ok(RuntimeConfig {
            canonical_version,
            landscape_url: settings.landscape.url.clone(),
            payload_store_path: PathBuf::from(&settings.payload_store.base_path),
            checkpoint,
            rate_limit,
            telemetry,
            retention_days: settings.retention_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::settings::Settings;

    fn settings(telemetry_mode: &str, frequency: &str) -> Settings {
        let toml = format!(
            r#"
[landscape]
url = ":memory:"

[payload_store]
base_path = "/tmp/payloads"

[checkpoint]
frequency = "{frequency}"

[telemetry]
backpressure_mode = "{telemetry_mode}"

[pipeline]
default_sink = "default"

[pipeline.source]
plugin = "memory"

[pipeline.sinks.default]
plugin = "memory_sink"
"#
        );
        let toml_value: toml::Value = toml::from_str(&toml).unwrap();
        serde_json::from_value(serde_json::to_value(toml_value).unwrap()).unwrap()
    }

    #[test]
    fn valid_settings_convert() {
        let config = RuntimeConfig::from_settings(&settings("block", "every_n")).unwrap();
        assert_eq!(config.checkpoint.frequency, CheckpointFrequency::EveryN);
        assert_eq!(
            config.telemetry.backpressure_mode,
            BackpressureMode::Block
        );
        assert_eq!(config.canonical_version, CANONICAL_VERSION);
    }

    #[test]
    fn reserved_backpressure_mode_fails_fast() {
        let result = RuntimeConfig::from_settings(&settings("slow", "every_row"));
        assert!(matches!(
            result,
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn unknown_frequency_fails_fast() {
        let result = RuntimeConfig::from_settings(&settings("block", "sometimes"));
        assert!(matches!(
            result,
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn missing_default_sink_is_rejected() {
        let mut s = settings("block", "every_row");
        s.pipeline.default_sink = "nonexistent".to_string();
        assert!(RuntimeConfig::from_settings(&s).is_err());
    }
}
