// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Plugin Registry
//!
//! Resolves configured plugin names to built-in implementations. The
//! registry classifies each mid-pipeline plugin into the engine's tagged
//! [`StepPlugin`] view exactly once, at build time. Dispatch at row time
//! never probes for capabilities.

use elspeth_domain::services::plugin::{SinkPlugin, SourcePlugin, StepPlugin};
use elspeth_domain::EngineError;

use crate::infrastructure::config::settings::PluginSettings;

use super::aggregations::CountBatchAggregation;
use super::gates::{ForkGate, ThresholdGate};
use super::sinks::{JsonLinesSink, MemorySink};
use super::sources::{InMemorySource, JsonLinesSource};
use super::transforms::{FlakyTransform, MultiplyTransform};

/// Builds the configured source plugin.
pub fn build_source(spec: &PluginSettings) -> Result<Box<dyn SourcePlugin>, EngineError> {
    match spec.plugin.as_str() {
        "memory" => Ok(Box::new(InMemorySource::from_options(&spec.options)?)),
        "jsonl" => Ok(Box::new(JsonLinesSource::from_options(&spec.options)?)),
        other => Err(EngineError::InvalidConfiguration(format!(
            "unknown source plugin '{}'",
            other
        ))),
    }
}

/// Builds a configured mid-pipeline step, classified into its tag.
pub fn build_step(spec: &PluginSettings) -> Result<StepPlugin, EngineError> {
    match spec.plugin.as_str() {
        "multiply" => Ok(StepPlugin::Transform(Box::new(
            MultiplyTransform::from_options(&spec.options)?,
        ))),
        "flaky" => Ok(StepPlugin::Transform(Box::new(FlakyTransform::from_options(
            &spec.options,
        )?))),
        "threshold" => Ok(StepPlugin::Gate(Box::new(ThresholdGate::from_options(
            &spec.options,
        )?))),
        "fork" => Ok(StepPlugin::Gate(Box::new(ForkGate::from_options(
            &spec.options,
        )?))),
        "count_batch" => Ok(StepPlugin::Aggregation(Box::new(
            CountBatchAggregation::from_options(&spec.options)?,
        ))),
        other => Err(EngineError::InvalidConfiguration(format!(
            "unknown step plugin '{}'",
            other
        ))),
    }
}

/// Builds a configured sink plugin under its configured name.
pub fn build_sink(name: &str, spec: &PluginSettings) -> Result<Box<dyn SinkPlugin>, EngineError> {
    match spec.plugin.as_str() {
        "jsonl_sink" => Ok(Box::new(JsonLinesSink::from_options(name, &spec.options)?)),
        "memory_sink" => Ok(Box::new(MemorySink::new(name))),
        other => Err(EngineError::InvalidConfiguration(format!(
            "unknown sink plugin '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(plugin: &str, options: serde_json::Value) -> PluginSettings {
        PluginSettings {
            plugin: plugin.to_string(),
            options,
            max_attempts: None,
        }
    }

    #[test]
    fn classification_happens_at_build_time() {
        let step = build_step(&spec("multiply", json!({"field": "v", "factor": 2.0}))).unwrap();
        assert_eq!(
            step.node_type(),
            elspeth_domain::NodeType::Transform
        );

        let step = build_step(&spec(
            "threshold",
            json!({"field": "v", "threshold": 1.0, "route_to": "high"}),
        ))
        .unwrap();
        assert_eq!(step.node_type(), elspeth_domain::NodeType::Gate);

        let step = build_step(&spec("count_batch", json!({"batch_size": 3}))).unwrap();
        assert_eq!(step.node_type(), elspeth_domain::NodeType::Aggregation);
    }

    #[test]
    fn unknown_plugin_is_a_config_error() {
        assert!(build_step(&spec("nonexistent", json!({}))).is_err());
        assert!(build_source(&spec("nonexistent", json!({}))).is_err());
        assert!(build_sink("s", &spec("nonexistent", json!({}))).is_err());
    }
}
