// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Built-in gate plugins: threshold routing and fan-out forking.

use async_trait::async_trait;
use serde_json::{json, Value};

use elspeth_domain::services::plugin::{GatePlugin, GateResult, PluginContext};
use elspeth_domain::value_objects::RoutingAction;
use elspeth_domain::{Determinism, EngineError};

/// Routes rows whose numeric field reaches a threshold to a named sink;
/// everything else continues down the pipeline.
pub struct ThresholdGate {
    field: String,
    threshold: f64,
    route_to: String,
}

impl ThresholdGate {
    pub fn from_options(options: &Value) -> Result<Self, EngineError> {
        let field = options
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(
                    "threshold gate requires a 'field' option".to_string(),
                )
            })?
            .to_string();
        let threshold = options
            .get("threshold")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(
                    "threshold gate requires a numeric 'threshold' option".to_string(),
                )
            })?;
        let route_to = options
            .get("route_to")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(
                    "threshold gate requires a 'route_to' option".to_string(),
                )
            })?
            .to_string();
        Ok(ThresholdGate {
            field,
            threshold,
            route_to,
        })
    }
}

#[async_trait]
impl GatePlugin for ThresholdGate {
    fn name(&self) -> &str {
        "threshold"
    }

    fn plugin_version(&self) -> &str {
        "1.0.0"
    }

    fn determinism(&self) -> Determinism {
        Determinism::Deterministic
    }

    fn config(&self) -> Value {
        json!({
            "field": self.field,
            "threshold": self.threshold,
            "route_to": self.route_to,
        })
    }

    async fn evaluate(
        &self,
        row: &Value,
        _ctx: &mut PluginContext,
    ) -> Result<GateResult, EngineError> {
        let observed = row.get(&self.field).and_then(Value::as_f64);
        let action = match observed {
            Some(value) if value >= self.threshold => RoutingAction::route_to_sink(
                self.route_to.clone(),
                json!({
                    "field": self.field,
                    "observed": value,
                    "threshold": self.threshold,
                }),
            ),
            _ => RoutingAction::continue_(),
        };
        Ok(GateResult {
            row: row.clone(),
            action,
        })
    }
}

/// Forks every row onto a fixed set of branches. The branch labels must
/// be registered edge labels (sink names in the linear pipeline).
pub struct ForkGate {
    branches: Vec<String>,
}

impl ForkGate {
    pub fn from_options(options: &Value) -> Result<Self, EngineError> {
        let branches = options
            .get("branches")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|branches: &Vec<String>| !branches.is_empty())
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(
                    "fork gate requires a non-empty 'branches' array".to_string(),
                )
            })?;
        Ok(ForkGate { branches })
    }
}

#[async_trait]
impl GatePlugin for ForkGate {
    fn name(&self) -> &str {
        "fork"
    }

    fn plugin_version(&self) -> &str {
        "1.0.0"
    }

    fn determinism(&self) -> Determinism {
        Determinism::Deterministic
    }

    fn config(&self) -> Value {
        json!({ "branches": self.branches })
    }

    async fn evaluate(
        &self,
        row: &Value,
        _ctx: &mut PluginContext,
    ) -> Result<GateResult, EngineError> {
        Ok(GateResult {
            row: row.clone(),
            action: RoutingAction::fork_to_paths(
                self.branches.clone(),
                json!({ "branches": self.branches }),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elspeth_domain::value_objects::{RoutingKind, RunId};

    #[tokio::test]
    async fn routes_above_threshold() {
        let gate = ThresholdGate::from_options(
            &json!({"field": "val", "threshold": 50.0, "route_to": "high"}),
        )
        .unwrap();
        let mut ctx = PluginContext::new(RunId::new(), None, 1);

        let result = gate.evaluate(&json!({"val": 100}), &mut ctx).await.unwrap();
        assert_eq!(result.action.kind, RoutingKind::Route);
        assert_eq!(result.action.destinations, vec!["high".to_string()]);

        let result = gate.evaluate(&json!({"val": 10}), &mut ctx).await.unwrap();
        assert_eq!(result.action.kind, RoutingKind::Continue);
    }

    #[tokio::test]
    async fn missing_field_continues() {
        let gate = ThresholdGate::from_options(
            &json!({"field": "val", "threshold": 50.0, "route_to": "high"}),
        )
        .unwrap();
        let mut ctx = PluginContext::new(RunId::new(), None, 1);
        let result = gate.evaluate(&json!({"other": 1}), &mut ctx).await.unwrap();
        assert_eq!(result.action.kind, RoutingKind::Continue);
    }
}
