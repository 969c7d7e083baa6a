// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Plugin Contracts
//!
//! The engine's view of sources, transforms, gates, aggregations, and
//! sinks. Concrete plugin implementations live outside the engine; these
//! traits are the whole contract.
//!
//! Invariants the traits encode:
//!
//! - Every plugin declares `determinism` through a required method; a
//!   plugin cannot exist without it, which is what makes the
//!   reproducibility grade meaningful.
//! - Business failures travel inside [`TransformResult`]; an `Err` from a
//!   plugin method is an exception and is recorded as a failed node-state
//!   before it propagates.
//! - The engine classifies each plugin exactly once at registration into
//!   the tagged [`StepPlugin`] view; dispatch never probes for methods at
//!   row time.
//!
//! External calls made inside a plugin are reported through the
//! [`PluginContext`]; the enclosing executor drains them into the audit
//! store against the node-state it owns.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::entities::call::CallDraft;
use crate::entities::node::{Determinism, NodeType};
use crate::error::EngineError;
use crate::repositories::rate_limit::RateLimit;
use crate::services::schema_compat::PluginSchema;
use crate::value_objects::error_reason::TransformErrorReason;
use crate::value_objects::ids::{BatchId, NodeId, RunId};
use crate::value_objects::routing::RoutingAction;

/// Context handed to every plugin invocation.
///
/// Carries run/node identity, the explicit step index (tokens never carry
/// position), a shared rate limiter, and the call reports the enclosing
/// executor will record.
pub struct PluginContext {
    pub run_id: RunId,
    pub node_id: Option<NodeId>,
    pub step_index: i64,
    rate_limiter: Option<Arc<dyn RateLimit>>,
    calls: Vec<CallDraft>,
}

impl PluginContext {
    /// Creates a context for one plugin invocation.
    pub fn new(run_id: RunId, node_id: Option<NodeId>, step_index: i64) -> Self {
        PluginContext {
            run_id,
            node_id,
            step_index,
            rate_limiter: None,
            calls: Vec::new(),
        }
    }

    /// Attaches the shared rate limiter.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimit>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Attempts to take one permit for the named external service.
    /// Always succeeds when rate limiting is not configured.
    pub fn try_acquire(&self, service: &str) -> bool {
        match &self.rate_limiter {
            Some(limiter) => limiter.try_acquire(service),
            None => true,
        }
    }

    /// Reports an external call for the executor to record against the
    /// current node-state.
    pub fn record_call(&mut self, call: CallDraft) {
        self.calls.push(call);
    }

    /// Drains the reported calls. Called by the executor after the plugin
    /// returns.
    pub fn take_calls(&mut self) -> Vec<CallDraft> {
        std::mem::take(&mut self.calls)
    }
}

/// Outcome of a transform invocation: a new row or a structured reason.
#[derive(Debug, Clone)]
pub enum TransformOutcome {
    Success(Value),
    Error(TransformErrorReason),
}

/// Result of one transform invocation.
///
/// The plugin fills the outcome; the executor owns the audit fields
/// (`input_hash`, `output_hash`, `duration_ms`) and populates them after
/// the invocation.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub outcome: TransformOutcome,
    pub input_hash: Option<String>,
    pub output_hash: Option<String>,
    pub duration_ms: Option<i64>,
}

impl TransformResult {
    /// A successful transform producing `row`.
    pub fn success(row: Value) -> Self {
        TransformResult {
            outcome: TransformOutcome::Success(row),
            input_hash: None,
            output_hash: None,
            duration_ms: None,
        }
    }

    /// A business failure with a structured reason.
    pub fn error(reason: TransformErrorReason) -> Self {
        TransformResult {
            outcome: TransformOutcome::Error(reason),
            input_hash: None,
            output_hash: None,
            duration_ms: None,
        }
    }

    /// True when the outcome is success.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransformOutcome::Success(_))
    }
}

/// Result of one gate evaluation: the (possibly annotated) row and the
/// routing decision.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub row: Value,
    pub action: RoutingAction,
}

/// Result of offering a row to an aggregation.
///
/// The plugin decides `accepted` and `trigger`; the executor fills
/// `batch_id` from the batch it manages.
#[derive(Debug, Clone)]
pub struct AcceptResult {
    pub accepted: bool,
    /// True when the aggregation wants a flush after this acceptance.
    pub trigger: bool,
    pub batch_id: Option<BatchId>,
}

/// What a sink reports after a successful write. `content_hash` and
/// `size_bytes` are required; they become the artifact record.
#[derive(Debug, Clone)]
pub struct SinkReceipt {
    pub path_or_uri: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub metadata: Option<Value>,
}

/// A source of rows.
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    fn name(&self) -> &str;
    fn plugin_version(&self) -> &str;
    fn determinism(&self) -> Determinism;
    fn output_schema(&self) -> PluginSchema {
        PluginSchema::permissive()
    }
    /// Plugin configuration as registered in the Landscape.
    fn config(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Loads the source rows in order. Row index is the position in the
    /// returned sequence.
    async fn load(&mut self, ctx: &mut PluginContext) -> Result<Vec<Value>, EngineError>;

    async fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A row-to-row transform.
#[async_trait]
pub trait TransformPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn plugin_version(&self) -> &str;
    fn determinism(&self) -> Determinism;
    fn input_schema(&self) -> PluginSchema {
        PluginSchema::permissive()
    }
    fn output_schema(&self) -> PluginSchema {
        PluginSchema::permissive()
    }
    fn config(&self) -> Value {
        Value::Object(Default::default())
    }

    async fn on_start(&mut self, _ctx: &mut PluginContext) -> Result<(), EngineError> {
        Ok(())
    }

    /// Processes one row. Business failures return
    /// `TransformResult::error`; an `Err` is an exception.
    async fn process(
        &self,
        row: &Value,
        ctx: &mut PluginContext,
    ) -> Result<TransformResult, EngineError>;

    async fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A routing decision point.
#[async_trait]
pub trait GatePlugin: Send + Sync {
    fn name(&self) -> &str;
    fn plugin_version(&self) -> &str;
    fn determinism(&self) -> Determinism;
    fn input_schema(&self) -> PluginSchema {
        PluginSchema::permissive()
    }
    fn output_schema(&self) -> PluginSchema {
        PluginSchema::permissive()
    }
    fn config(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Evaluates one row and decides where it goes.
    async fn evaluate(
        &self,
        row: &Value,
        ctx: &mut PluginContext,
    ) -> Result<GateResult, EngineError>;

    async fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A batching aggregation.
#[async_trait]
pub trait AggregationPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn plugin_version(&self) -> &str;
    fn determinism(&self) -> Determinism;
    fn input_schema(&self) -> PluginSchema {
        PluginSchema::permissive()
    }
    fn output_schema(&self) -> PluginSchema {
        PluginSchema::permissive()
    }
    fn config(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Offers a row. `accepted=false` rejects it (the token continues down
    /// the pipeline); `trigger=true` asks the caller to flush.
    async fn accept(
        &mut self,
        row: &Value,
        ctx: &mut PluginContext,
    ) -> Result<AcceptResult, EngineError>;

    /// Flushes the buffered batch, returning the aggregated outputs.
    async fn flush(&mut self, ctx: &mut PluginContext) -> Result<Vec<Value>, EngineError>;

    /// Serializes the buffer for checkpointing at aggregation boundaries.
    fn buffer_state(&self) -> Value;

    /// Restores a buffer serialized by `buffer_state` (resume path).
    fn restore_state(&mut self, state: &Value) -> Result<(), EngineError>;

    async fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A destination for finished rows.
#[async_trait]
pub trait SinkPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn plugin_version(&self) -> &str;
    fn determinism(&self) -> Determinism;
    fn input_schema(&self) -> PluginSchema {
        PluginSchema::permissive()
    }
    fn config(&self) -> Value {
        Value::Object(Default::default())
    }
    fn artifact_type(&self) -> crate::entities::artifact::ArtifactType;

    /// Writes a batch of rows, returning the artifact receipt.
    async fn write(
        &mut self,
        rows: &[Value],
        ctx: &mut PluginContext,
    ) -> Result<SinkReceipt, EngineError>;

    async fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// The engine's tagged view of a mid-pipeline plugin, fixed at
/// registration. Dispatch matches on this, never on attribute probing.
pub enum StepPlugin {
    Transform(Box<dyn TransformPlugin>),
    Gate(Box<dyn GatePlugin>),
    Aggregation(Box<dyn AggregationPlugin>),
}

impl StepPlugin {
    /// The node type this step registers as.
    pub fn node_type(&self) -> NodeType {
        match self {
            StepPlugin::Transform(_) => NodeType::Transform,
            StepPlugin::Gate(_) => NodeType::Gate,
            StepPlugin::Aggregation(_) => NodeType::Aggregation,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            StepPlugin::Transform(p) => p.name(),
            StepPlugin::Gate(p) => p.name(),
            StepPlugin::Aggregation(p) => p.name(),
        }
    }

    pub fn plugin_version(&self) -> &str {
        match self {
            StepPlugin::Transform(p) => p.plugin_version(),
            StepPlugin::Gate(p) => p.plugin_version(),
            StepPlugin::Aggregation(p) => p.plugin_version(),
        }
    }

    pub fn determinism(&self) -> Determinism {
        match self {
            StepPlugin::Transform(p) => p.determinism(),
            StepPlugin::Gate(p) => p.determinism(),
            StepPlugin::Aggregation(p) => p.determinism(),
        }
    }

    pub fn input_schema(&self) -> PluginSchema {
        match self {
            StepPlugin::Transform(p) => p.input_schema(),
            StepPlugin::Gate(p) => p.input_schema(),
            StepPlugin::Aggregation(p) => p.input_schema(),
        }
    }

    pub fn output_schema(&self) -> PluginSchema {
        match self {
            StepPlugin::Transform(p) => p.output_schema(),
            StepPlugin::Gate(p) => p.output_schema(),
            StepPlugin::Aggregation(p) => p.output_schema(),
        }
    }

    pub fn config(&self) -> Value {
        match self {
            StepPlugin::Transform(p) => p.config(),
            StepPlugin::Gate(p) => p.config(),
            StepPlugin::Aggregation(p) => p.config(),
        }
    }

    /// Closes the underlying plugin.
    pub async fn close(&mut self) -> Result<(), EngineError> {
        match self {
            StepPlugin::Transform(p) => p.close().await,
            StepPlugin::Gate(p) => p.close().await,
            StepPlugin::Aggregation(p) => p.close().await,
        }
    }
}
