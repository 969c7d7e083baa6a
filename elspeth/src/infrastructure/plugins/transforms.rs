// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Built-in transform plugins: field arithmetic and a controllable
//! failure transform for exercising retry and error paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use elspeth_domain::services::plugin::{PluginContext, TransformPlugin, TransformResult};
use elspeth_domain::value_objects::TransformErrorReason;
use elspeth_domain::{Determinism, EngineError};

/// Multiplies a numeric field, writing the product back (or to a target
/// field). Missing or non-numeric fields are business errors with the
/// appropriate structured reason.
pub struct MultiplyTransform {
    field: String,
    factor: f64,
    target_field: Option<String>,
}

impl MultiplyTransform {
    pub fn from_options(options: &Value) -> Result<Self, EngineError> {
        let field = options
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(
                    "multiply transform requires a 'field' option".to_string(),
                )
            })?
            .to_string();
        let factor = options.get("factor").and_then(Value::as_f64).ok_or_else(|| {
            EngineError::InvalidConfiguration(
                "multiply transform requires a numeric 'factor' option".to_string(),
            )
        })?;
        let target_field = options
            .get("target_field")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(MultiplyTransform {
            field,
            factor,
            target_field,
        })
    }
}

#[async_trait]
impl TransformPlugin for MultiplyTransform {
    fn name(&self) -> &str {
        "multiply"
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
            "factor": self.factor,
            "target_field": self.target_field,
        })
    }

    async fn process(
        &self,
        row: &Value,
        _ctx: &mut PluginContext,
    ) -> Result<TransformResult, EngineError> {
        let current = match row.get(&self.field) {
            None => {
                return Ok(TransformResult::error(TransformErrorReason::MissingField {
                    field: self.field.clone(),
                }));
            }
            Some(value) => match value.as_f64() {
                Some(n) => n,
                None => {
                    return Ok(TransformResult::error(TransformErrorReason::TypeMismatch {
                        field: self.field.clone(),
                        expected: Some("number".to_string()),
                        actual: Some(type_name(value).to_string()),
                    }));
                }
            },
        };

        let product = current * self.factor;
        let mut updated = row.clone();
        if let Some(map) = updated.as_object_mut() {
            let target = self.target_field.as_ref().unwrap_or(&self.field);
            // Keep integer results integral so hashes stay stable across
            // integer-valued inputs.
            let value = if product.fract() == 0.0 && product.abs() < i64::MAX as f64 {
                json!(product as i64)
            } else {
                json!(product)
            };
            map.insert(target.clone(), value);
        }

        Ok(TransformResult::success(updated))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// How the flaky transform fails while it is failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlakyMode {
    /// Raise an exception (exercises retry).
    Exception,
    /// Return a business error (exercises failed-row handling).
    BusinessError,
}

/// Fails a configured number of times, then succeeds by passing the row
/// through. Test plugin.
pub struct FlakyTransform {
    fail_times: u32,
    mode: FlakyMode,
    calls: Mutex<u32>,
}

impl FlakyTransform {
    pub fn new(fail_times: u32, mode: FlakyMode) -> Self {
        FlakyTransform {
            fail_times,
            mode,
            calls: Mutex::new(0),
        }
    }

    pub fn from_options(options: &Value) -> Result<Self, EngineError> {
        let fail_times = options
            .get("fail_times")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let mode = match options.get("mode").and_then(Value::as_str) {
            None | Some("exception") => FlakyMode::Exception,
            Some("business_error") => FlakyMode::BusinessError,
            Some(other) => {
                return Err(EngineError::InvalidConfiguration(format!(
                    "unknown flaky mode '{}'",
                    other
                )));
            }
        };
        Ok(FlakyTransform::new(fail_times, mode))
    }
}

#[async_trait]
impl TransformPlugin for FlakyTransform {
    fn name(&self) -> &str {
        "flaky"
    }

    fn plugin_version(&self) -> &str {
        "1.0.0"
    }

    fn determinism(&self) -> Determinism {
        Determinism::NonDeterministic
    }

    fn config(&self) -> Value {
        json!({ "fail_times": self.fail_times })
    }

    async fn process(
        &self,
        row: &Value,
        _ctx: &mut PluginContext,
    ) -> Result<TransformResult, EngineError> {
        let mut calls = self.calls.lock();
        *calls += 1;
        if *calls <= self.fail_times {
            return match self.mode {
                FlakyMode::Exception => Err(EngineError::plugin(
                    "flaky",
                    format!("induced failure {} of {}", *calls, self.fail_times),
                )),
                FlakyMode::BusinessError => {
                    Ok(TransformResult::error(TransformErrorReason::TestError {
                        error: Some(format!("induced failure {} of {}", *calls, self.fail_times)),
                    }))
                }
            };
        }
        Ok(TransformResult::success(row.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elspeth_domain::services::plugin::TransformOutcome;
    use elspeth_domain::value_objects::RunId;

    #[tokio::test]
    async fn multiply_doubles_the_field() {
        let transform =
            MultiplyTransform::from_options(&json!({"field": "value", "factor": 2.0})).unwrap();
        let mut ctx = PluginContext::new(RunId::new(), None, 1);
        let result = transform
            .process(&json!({"value": 21}), &mut ctx)
            .await
            .unwrap();
        match result.outcome {
            TransformOutcome::Success(row) => assert_eq!(row["value"], 42),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiply_reports_missing_field() {
        let transform =
            MultiplyTransform::from_options(&json!({"field": "value", "factor": 2.0})).unwrap();
        let mut ctx = PluginContext::new(RunId::new(), None, 1);
        let result = transform.process(&json!({"other": 1}), &mut ctx).await.unwrap();
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn flaky_fails_then_succeeds() {
        let transform = FlakyTransform::new(2, FlakyMode::Exception);
        let mut ctx = PluginContext::new(RunId::new(), None, 1);
        assert!(transform.process(&json!({}), &mut ctx).await.is_err());
        assert!(transform.process(&json!({}), &mut ctx).await.is_err());
        assert!(transform.process(&json!({}), &mut ctx).await.is_ok());
    }
}
