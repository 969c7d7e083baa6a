// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Telemetry Events
//!
//! Structured, immutable events emitted strictly after the
//! corresponding Landscape write committed. Telemetry observes execution;
//! it never gates it, and a failed exporter never retracts audit.
//!
//! Events carry a granularity so the telemetry manager can filter:
//! `lifecycle` covers run boundaries, `rows` adds per-row progress, and
//! `full` adds external-call detail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::call::{CallStatus, CallType};
use crate::entities::run::RunStatus;
use crate::error::EngineError;
use crate::value_objects::ids::{NodeId, RowId, RunId, StateId, TokenId};
use crate::value_objects::outcome::RunSummary;
use crate::value_objects::routing::RoutingKind;

/// Event filtering level, ordered: lifecycle ⊂ rows ⊂ full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Lifecycle,
    Rows,
    Full,
}

impl Granularity {
    /// Parses the settings string form; unknown values fail fast.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "lifecycle" => Ok(Granularity::Lifecycle),
            "rows" => Ok(Granularity::Rows),
            "full" => Ok(Granularity::Full),
            other => Err(EngineError::InvalidConfiguration(format!(
                "unknown telemetry granularity '{}'",
                other
            ))),
        }
    }
}

/// Coarse phase of a run, reported through `PhaseChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Registering,
    Processing,
    Flushing,
    Finalizing,
}

/// A structured telemetry event. All variants are immutable values with a
/// timestamp and the owning run id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        config_hash: String,
    },
    RunCompleted {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        status: RunStatus,
        summary: RunSummary,
    },
    PhaseChanged {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        phase: RunPhase,
    },
    RowCreated {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        row_id: RowId,
        row_index: i64,
    },
    TransformCompleted {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        token_id: TokenId,
        node_id: NodeId,
        success: bool,
        duration_ms: i64,
    },
    GateEvaluated {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        token_id: TokenId,
        node_id: NodeId,
        kind: RoutingKind,
        destinations: Vec<String>,
    },
    TokenCompleted {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        token_id: TokenId,
        sink_name: String,
    },
    ExternalCallCompleted {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        state_id: StateId,
        call_type: CallType,
        provider: String,
        status: CallStatus,
        latency_ms: i64,
    },
}

impl PipelineEvent {
    /// The minimum granularity at which this event is exported.
    pub fn granularity(&self) -> Granularity {
        match self {
            PipelineEvent::RunStarted { .. }
            | PipelineEvent::RunCompleted { .. }
            | PipelineEvent::PhaseChanged { .. } => Granularity::Lifecycle,
            PipelineEvent::RowCreated { .. }
            | PipelineEvent::TransformCompleted { .. }
            | PipelineEvent::GateEvaluated { .. }
            | PipelineEvent::TokenCompleted { .. } => Granularity::Rows,
            PipelineEvent::ExternalCallCompleted { .. } => Granularity::Full,
        }
    }

    /// The run this event belongs to.
    pub fn run_id(&self) -> RunId {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. }
            | PipelineEvent::PhaseChanged { run_id, .. }
            | PipelineEvent::RowCreated { run_id, .. }
            | PipelineEvent::TransformCompleted { run_id, .. }
            | PipelineEvent::GateEvaluated { run_id, .. }
            | PipelineEvent::TokenCompleted { run_id, .. }
            | PipelineEvent::ExternalCallCompleted { run_id, .. } => *run_id,
        }
    }

    /// Short name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "run_started",
            PipelineEvent::RunCompleted { .. } => "run_completed",
            PipelineEvent::PhaseChanged { .. } => "phase_changed",
            PipelineEvent::RowCreated { .. } => "row_created",
            PipelineEvent::TransformCompleted { .. } => "transform_completed",
            PipelineEvent::GateEvaluated { .. } => "gate_evaluated",
            PipelineEvent::TokenCompleted { .. } => "token_completed",
            PipelineEvent::ExternalCallCompleted { .. } => "external_call_completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_ordering_supports_filtering() {
        assert!(Granularity::Lifecycle < Granularity::Rows);
        assert!(Granularity::Rows < Granularity::Full);
    }

    #[test]
    fn unknown_granularity_fails_fast() {
        assert!(Granularity::parse("verbose").is_err());
    }

    #[test]
    fn events_classify_by_granularity() {
        let event = PipelineEvent::RunStarted {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id: RunId::new(),
            config_hash: "abc".to_string(),
        };
        assert_eq!(event.granularity(), Granularity::Lifecycle);

        let event = PipelineEvent::ExternalCallCompleted {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id: RunId::new(),
            state_id: StateId::new(),
            call_type: CallType::Llm,
            provider: "azure".to_string(),
            status: CallStatus::Success,
            latency_ms: 120,
        };
        assert_eq!(event.granularity(), Granularity::Full);
    }
}
