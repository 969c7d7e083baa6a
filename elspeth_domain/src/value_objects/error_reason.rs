// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transform Error Reasons
//!
//! The closed vocabulary of business-failure categories a transform may
//! report. Business failures travel inside `TransformResult`; they are
//! recorded in the node-state's `error_json` and never raised.
//!
//! The vocabulary is closed at compile time: the serde tag is the `reason`
//! field, so an unknown category fails deserialization at the plugin
//! boundary instead of slipping into the audit trail. Context fields are
//! typed per category; optional fields are omitted from the JSON when
//! absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::call::TokenUsage;

/// Per-row error detail for template rendering failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateError {
    pub row_index: u64,
    pub error: String,
}

/// A transform's structured failure reason.
///
/// The `reason` tag is the category; everything else is typed context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TransformErrorReason {
    /// Upstream API returned an error response.
    ApiError {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<i64>,
    },
    /// A required input field was absent.
    MissingField { field: String },
    /// An input field had the wrong type.
    TypeMismatch {
        field: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        actual: Option<String>,
    },
    /// Row failed the transform's validation rules.
    ValidationFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Prompt/template could not be rendered for this row.
    TemplateRenderingFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        template_errors: Option<Vec<TemplateError>>,
    },
    /// Provider truncated the response before completion.
    ResponseTruncated {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// A batched sub-request failed for this row.
    BatchError {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// The whole batch failed before this row was attempted.
    BatchFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Content safety system rejected the row. Quarantine-grade.
    ContentSafetyViolation {
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    /// Deliberate failure from a test plugin.
    TestError {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Provider response was not parseable JSON.
    InvalidJsonResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Provider rate limit hit and not recovered within policy.
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<i64>,
    },
    /// Retry budget exhausted on timeouts.
    RetryTimeout {
        #[serde(skip_serializing_if = "Option::is_none")]
        attempts: Option<u32>,
    },
    /// Connection-level failure to the provider.
    ConnectionFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Authentication or authorization failure at the provider.
    AuthFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Provider reported the requested model/resource unavailable.
    ModelUnavailable {
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Input exceeded the provider's context window.
    ContextLengthExceeded {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// Response failed the declared output schema.
    SchemaMismatch {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Response was empty where content was required.
    EmptyResponse,
    /// Lookup against reference data found nothing.
    LookupFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    /// Expression/predicate evaluation failed.
    ExpressionError {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Encoding/decoding failure (charset, base64, ...).
    EncodingError {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Row was larger than the transform's configured limit.
    RowTooLarge {
        #[serde(skip_serializing_if = "Option::is_none")]
        size_bytes: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit_bytes: Option<u64>,
    },
    /// Arithmetic failure (overflow, division by zero).
    ArithmeticError {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Date/time parse or range failure.
    TemporalError {
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Duplicate key where uniqueness was required.
    DuplicateKey {
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    /// External dependency (non-API) unavailable.
    DependencyUnavailable {
        #[serde(skip_serializing_if = "Option::is_none")]
        dependency: Option<String>,
    },
    /// Configured timeout elapsed for a single operation.
    OperationTimeout {
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<i64>,
    },
    /// Catch-all for transform-internal invariant breaches; still closed:
    /// the category is fixed, the message is free-form.
    InternalError {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl TransformErrorReason {
    /// The category tag as recorded in `error_json.reason`.
    pub fn category(&self) -> &'static str {
        match self {
            TransformErrorReason::ApiError { .. } => "api_error",
            TransformErrorReason::MissingField { .. } => "missing_field",
            TransformErrorReason::TypeMismatch { .. } => "type_mismatch",
            TransformErrorReason::ValidationFailed { .. } => "validation_failed",
            TransformErrorReason::TemplateRenderingFailed { .. } => "template_rendering_failed",
            TransformErrorReason::ResponseTruncated { .. } => "response_truncated",
            TransformErrorReason::BatchError { .. } => "batch_error",
            TransformErrorReason::BatchFailed { .. } => "batch_failed",
            TransformErrorReason::ContentSafetyViolation { .. } => "content_safety_violation",
            TransformErrorReason::TestError { .. } => "test_error",
            TransformErrorReason::InvalidJsonResponse { .. } => "invalid_json_response",
            TransformErrorReason::RateLimited { .. } => "rate_limited",
            TransformErrorReason::RetryTimeout { .. } => "retry_timeout",
            TransformErrorReason::ConnectionFailed { .. } => "connection_failed",
            TransformErrorReason::AuthFailed { .. } => "auth_failed",
            TransformErrorReason::ModelUnavailable { .. } => "model_unavailable",
            TransformErrorReason::ContextLengthExceeded { .. } => "context_length_exceeded",
            TransformErrorReason::SchemaMismatch { .. } => "schema_mismatch",
            TransformErrorReason::EmptyResponse => "empty_response",
            TransformErrorReason::LookupFailed { .. } => "lookup_failed",
            TransformErrorReason::ExpressionError { .. } => "expression_error",
            TransformErrorReason::EncodingError { .. } => "encoding_error",
            TransformErrorReason::RowTooLarge { .. } => "row_too_large",
            TransformErrorReason::ArithmeticError { .. } => "arithmetic_error",
            TransformErrorReason::TemporalError { .. } => "temporal_error",
            TransformErrorReason::DuplicateKey { .. } => "duplicate_key",
            TransformErrorReason::DependencyUnavailable { .. } => "dependency_unavailable",
            TransformErrorReason::OperationTimeout { .. } => "operation_timeout",
            TransformErrorReason::InternalError { .. } => "internal_error",
        }
    }

    /// True for categories that quarantine the token rather than merely
    /// fail it. Quarantined tokens derive the QUARANTINED terminal state.
    pub fn is_quarantine(&self) -> bool {
        matches!(self, TransformErrorReason::ContentSafetyViolation { .. })
    }

    /// Renders the reason as the node-state `error_json` payload, adding
    /// the quarantine flag when applicable.
    pub fn to_error_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "reason": self.category() })
        });
        if self.is_quarantine() {
            if let Some(map) = value.as_object_mut() {
                map.insert("quarantine".to_string(), Value::Bool(true));
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_category_fails_deserialization() {
        let result: Result<TransformErrorReason, _> =
            serde_json::from_value(json!({"reason": "weather_too_nice"}));
        assert!(result.is_err());
    }

    #[test]
    fn known_category_round_trips() {
        let reason = TransformErrorReason::MissingField {
            field: "value".to_string(),
        };
        let value = serde_json::to_value(&reason).unwrap();
        assert_eq!(value["reason"], "missing_field");
        assert_eq!(value["field"], "value");
        let back: TransformErrorReason = serde_json::from_value(value).unwrap();
        assert_eq!(back, reason);
    }

    #[test]
    fn content_safety_sets_quarantine_flag() {
        let reason = TransformErrorReason::ContentSafetyViolation {
            category: Some("self_harm".to_string()),
        };
        let json = reason.to_error_json();
        assert_eq!(json["quarantine"], json!(true));
        assert_eq!(json["reason"], "content_safety_violation");
    }

    #[test]
    fn optional_context_is_omitted_when_absent() {
        let reason = TransformErrorReason::ApiError {
            error: None,
            status_code: Some(503),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["status_code"], 503);
    }
}
