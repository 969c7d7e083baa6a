// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Builder
//!
//! Turns pipeline settings into constructed plugin instances: the source,
//! the classified step sequence with per-plugin retry policies, and the
//! named sinks. Both `run` and `resume` build through this one path so a
//! resumed pipeline is structurally identical to the original.

use std::time::Duration;

use elspeth_domain::services::plugin::{SinkPlugin, SourcePlugin, StepPlugin};
use elspeth_domain::EngineError;

use crate::infrastructure::config::settings::PipelineSettings;
use crate::infrastructure::plugins::registry;
use crate::infrastructure::runtime::RetryPolicy;

/// A fully constructed pipeline, ready for graph registration.
pub struct PipelineDefinition {
    pub source: Box<dyn SourcePlugin>,
    pub steps: Vec<PipelineStep>,
    /// (configured name, plugin) in declaration order.
    pub sinks: Vec<(String, Box<dyn SinkPlugin>)>,
    pub default_sink: String,
    pub error_sink: Option<String>,
}

/// One mid-pipeline step: the classified plugin and its retry policy.
pub struct PipelineStep {
    pub plugin: StepPlugin,
    pub retry: RetryPolicy,
}

/// Builds the pipeline from settings via the plugin registry.
pub fn build_pipeline(settings: &PipelineSettings) -> Result<PipelineDefinition, EngineError> {
    let source = registry::build_source(&settings.source)?;

    let mut steps = Vec::with_capacity(settings.steps.len());
    for spec in &settings.steps {
        let plugin = registry::build_step(spec)?;
        let retry = match spec.max_attempts {
            Some(attempts) if attempts > 1 => RetryPolicy::default()
                .with_max_attempts(attempts)
                .with_base_delay(Duration::from_millis(50)),
            _ => RetryPolicy::no_retry(),
        };
        steps.push(PipelineStep { plugin, retry });
    }

    let mut sinks = Vec::with_capacity(settings.sinks.len());
    for (name, spec) in &settings.sinks {
        sinks.push((name.clone(), registry::build_sink(name, spec)?));
    }

    if !sinks.iter().any(|(name, _)| name == &settings.default_sink) {
        return Err(EngineError::InvalidConfiguration(format!(
            "default_sink '{}' is not a configured sink",
            settings.default_sink
        )));
    }

    Ok(PipelineDefinition {
        source,
        steps,
        sinks,
        default_sink: settings.default_sink.clone(),
        error_sink: settings.error_sink.clone(),
    })
}
