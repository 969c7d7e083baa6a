// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Settings (User-Facing Shape)
//!
//! The permissive configuration layer: parsed once from TOML or YAML,
//! serialized verbatim onto the run record, and converted into the strict
//! [`RuntimeConfig`](super::runtime::RuntimeConfig) before the engine sees
//! it.
//!
//! `${VAR}` references in string values are expanded from the environment
//! at load time. Secrets therefore never appear in the settings file; the
//! expanded values are what the engine uses, and the engine does not log
//! them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use elspeth_domain::EngineError;

/// Root settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Canonical hash algorithm tag; defaults to the engine's current
    /// version.
    #[serde(default)]
    pub canonical_version: Option<String>,

    pub landscape: LandscapeSettings,
    pub payload_store: PayloadStoreSettings,

    #[serde(default)]
    pub checkpoint: CheckpointSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,

    pub pipeline: PipelineSettings,

    /// Retention window for payload blobs, in days.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LandscapeSettings {
    /// SQLite path or URL for the audit store.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayloadStoreSettings {
    /// Root directory of the content-addressed blob store.
    pub base_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// "every_row" | "every_n" | "aggregation_only"
    #[serde(default = "default_frequency")]
    pub frequency: String,
    /// Row interval for "every_n".
    #[serde(default = "default_interval")]
    pub checkpoint_interval: u64,
    /// Always checkpoint at aggregation flushes.
    #[serde(default = "default_true")]
    pub aggregation_boundaries: bool,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        CheckpointSettings {
            enabled: true,
            frequency: default_frequency(),
            checkpoint_interval: default_interval(),
            aggregation_boundaries: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub default_requests_per_second: f64,
    #[serde(default = "default_rpm")]
    pub default_requests_per_minute: f64,
    /// JSON file for cross-process bucket sharing.
    #[serde(default)]
    pub persistence_path: Option<String>,
    /// Per-service overrides.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceLimitSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceLimitSettings {
    pub rps: f64,
    pub rpm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// "lifecycle" | "rows" | "full"
    #[serde(default = "default_granularity")]
    pub granularity: String,
    /// "block" | "drop" ("slow" is reserved)
    #[serde(default = "default_backpressure")]
    pub backpressure_mode: String,
    #[serde(default)]
    pub fail_on_total_exporter_failure: bool,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u64,
    /// Exporter names with optional per-exporter options.
    #[serde(default = "default_exporters")]
    pub exporters: Vec<ExporterSettings>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        TelemetrySettings {
            enabled: true,
            granularity: default_granularity(),
            backpressure_mode: default_backpressure(),
            fail_on_total_exporter_failure: false,
            buffer_capacity: default_buffer_capacity(),
            max_consecutive_failures: default_max_failures(),
            exporters: default_exporters(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterSettings {
    pub name: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    pub source: PluginSettings,
    #[serde(default)]
    pub steps: Vec<PluginSettings>,
    pub sinks: BTreeMap<String, PluginSettings>,
    /// Sink receiving tokens that complete the full sequence.
    pub default_sink: String,
    /// Optional sink receiving failed rows.
    #[serde(default)]
    pub error_sink: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSettings {
    /// Registry name of the plugin.
    pub plugin: String,
    #[serde(default)]
    pub options: Value,
    /// Per-plugin retry attempts (1 = no retry).
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_true() -> bool {
    true
}
fn default_frequency() -> String {
    "every_row".to_string()
}
fn default_interval() -> u64 {
    10
}
fn default_rps() -> f64 {
    10.0
}
fn default_rpm() -> f64 {
    600.0
}
fn default_granularity() -> String {
    "rows".to_string()
}
fn default_backpressure() -> String {
    "block".to_string()
}
fn default_buffer_capacity() -> usize {
    1024
}
fn default_max_failures() -> u64 {
    100
}
fn default_exporters() -> Vec<ExporterSettings> {
    vec![ExporterSettings {
        name: "log".to_string(),
        options: Value::Null,
    }]
}

impl Settings {
    /// Loads settings from a TOML or YAML file, expanding `${VAR}`
    /// environment references in string values.
    pub fn load(path: &Path) -> Result<Settings, EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfiguration(format!(
                "cannot read settings file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut value: Value = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw).map_err(|e| {
                EngineError::InvalidConfiguration(format!("invalid YAML settings: {}", e))
            })?,
            _ => toml::from_str::<toml::Value>(&raw)
                .map_err(|e| {
                    EngineError::InvalidConfiguration(format!("invalid TOML settings: {}", e))
                })
                .and_then(|v| {
                    serde_json::to_value(v).map_err(|e| {
                        EngineError::InvalidConfiguration(format!(
                            "settings not JSON-representable: {}",
                            e
                        ))
                    })
                })?,
        };

        expand_env(&mut value)?;

        serde_json::from_value(value)
            .map_err(|e| EngineError::InvalidConfiguration(format!("invalid settings: {}", e)))
    }

    /// Reconstructs settings from the JSON stored on a run (resume path).
    pub fn from_run_settings(settings_json: &Value) -> Result<Settings, EngineError> {
        serde_json::from_value(settings_json.clone()).map_err(|e| {
            EngineError::ResumeRefused(format!(
                "stored run settings cannot be reconstructed: {}",
                e
            ))
        })
    }

    /// The settings as the JSON value recorded on the run.
    pub fn to_json(&self) -> Result<Value, EngineError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Expands `${VAR}` references in every string leaf. Unset variables are
/// configuration errors so missing secrets surface before the run begins.
fn expand_env(value: &mut Value) -> Result<(), EngineError> {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = expand_env_str(s)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                expand_env(item)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                expand_env(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn expand_env_str(input: &str) -> Result<String, EngineError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            EngineError::InvalidConfiguration(format!("unterminated ${{}} reference in '{}'", input))
        })?;
        let var = &after[..end];
        let resolved = std::env::var(var).map_err(|_| {
            EngineError::InvalidConfiguration(format!(
                "environment variable '{}' referenced in settings is not set",
                var
            ))
        })?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[landscape]
url = ":memory:"

[payload_store]
base_path = "/tmp/payloads"

[pipeline]
default_sink = "default"

[pipeline.source]
plugin = "memory"

[pipeline.sinks.default]
plugin = "memory_sink"
"#;

    #[test]
    fn minimal_settings_parse_with_defaults() {
        let settings: Settings = {
            let toml_value: toml::Value = toml::from_str(MINIMAL).unwrap();
            serde_json::from_value(serde_json::to_value(toml_value).unwrap()).unwrap()
        };

        assert!(settings.checkpoint.enabled);
        assert_eq!(settings.checkpoint.frequency, "every_row");
        assert_eq!(settings.telemetry.granularity, "rows");
        assert_eq!(settings.telemetry.exporters[0].name, "log");
        assert!(settings.pipeline.steps.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let with_unknown = format!("{}\nunknown_option = true\n", MINIMAL);
        let toml_value: toml::Value = toml::from_str(&with_unknown).unwrap();
        let result: Result<Settings, _> =
            serde_json::from_value(serde_json::to_value(toml_value).unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn env_expansion_resolves_references() {
        std::env::set_var("ELSPETH_TEST_SECRET", "s3cret");
        let mut value = serde_json::json!({"key": "prefix-${ELSPETH_TEST_SECRET}-suffix"});
        expand_env(&mut value).unwrap();
        assert_eq!(value["key"], "prefix-s3cret-suffix");
    }

    #[test]
    fn unset_env_reference_fails() {
        let mut value = serde_json::json!({"key": "${ELSPETH_DEFINITELY_UNSET_VAR}"});
        assert!(expand_env(&mut value).is_err());
    }

    #[test]
    fn settings_round_trip_through_run_json() {
        let toml_value: toml::Value = toml::from_str(MINIMAL).unwrap();
        let settings: Settings =
            serde_json::from_value(serde_json::to_value(toml_value).unwrap()).unwrap();

        let json = settings.to_json().unwrap();
        let back = Settings::from_run_settings(&json).unwrap();
        assert_eq!(back.landscape.url, ":memory:");
        assert_eq!(back.pipeline.default_sink, "default");
    }
}
