// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # External Call Entity
//!
//! One record per external call a plugin issued, always linked to the
//! enclosing node-state. Request and response payloads go through the
//! payload store; token usage (for LLM calls) is kept as structured JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::value_objects::ids::{CallId, StateId};

/// Kind of external system the call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Llm,
    Http,
    Sql,
    Filesystem,
}

impl CallType {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Llm => "llm",
            CallType::Http => "http",
            CallType::Sql => "sql",
            CallType::Filesystem => "filesystem",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "llm" => Ok(CallType::Llm),
            "http" => Ok(CallType::Http),
            "sql" => Ok(CallType::Sql),
            "filesystem" => Ok(CallType::Filesystem),
            other => Err(EngineError::serialization(format!(
                "unknown call type '{}'",
                other
            ))),
        }
    }
}

/// Outcome of an external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "success" => Ok(CallStatus::Success),
            "error" => Ok(CallStatus::Error),
            other => Err(EngineError::serialization(format!(
                "unknown call status '{}'",
                other
            ))),
        }
    }
}

/// Token accounting reported by LLM providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// A call as reported by a plugin through its context, before the recorder
/// assigns identity and payload references.
#[derive(Debug, Clone)]
pub struct CallDraft {
    pub call_type: CallType,
    pub provider: String,
    pub status: CallStatus,
    pub latency_ms: i64,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub token_usage: Option<TokenUsage>,
}

/// The call record as persisted in the Landscape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub call_id: CallId,
    pub state_id: StateId,
    pub call_type: CallType,
    pub provider: String,
    pub status: CallStatus,
    pub latency_ms: i64,
    pub request_ref: Option<String>,
    pub response_ref: Option<String>,
    pub token_usage_json: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}
