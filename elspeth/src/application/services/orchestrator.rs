// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Orchestrator
//!
//! Owns the full run lifecycle: begin the run, register the graph, drive
//! every source row through the row processor, deliver tokens to sinks,
//! close every plugin, and finalize with the reproducibility grade.
//!
//! Graph registration is explicit and complete up front: the linear
//! "continue" edge into the default sink, one edge from **every gate to
//! every sink** (labels are the sink names) so any gate may route or fork
//! anywhere without synthesizing edges at routing time, and an "error"
//! edge when an error sink is configured. The resulting edge map, a flat
//! hash over (node, label), is the only routing authority the gate
//! executor consults.
//!
//! Resume reuses the same machinery: the graph is *adopted* from the
//! Landscape instead of registered, aggregation buffers are restored from
//! the checkpoint, and only unprocessed rows are replayed, against their
//! original row and token identities, so re-attempted nodes extend the
//! attempt sequence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use elspeth_bootstrap::ShutdownToken;
use elspeth_domain::entities::{EdgeKey, NodeRegistration, NodeType, ResumePoint, Run, RunStatus};
use elspeth_domain::events::{PipelineEvent, RunPhase};
use elspeth_domain::repositories::{LandscapeInspector, LandscapeRecorder, RateLimit};
use elspeth_domain::services::plugin::{PluginContext, SinkPlugin, SourcePlugin, StepPlugin};
use elspeth_domain::services::schema_compat::{self, PluginSchema};
use elspeth_domain::value_objects::{
    EdgeId, NodeId, RoutingMode, RowId, RowOutcome, RunId, RunSummary, TokenId, TokenInfo,
};
use elspeth_domain::EngineError;

use crate::infrastructure::config::{RuntimeConfig, Settings};
use crate::infrastructure::runtime::{
    AggregationExecutor, GateExecutor, SinkExecutor, TokenManager, TransformExecutor,
};
use crate::infrastructure::services::TokenBucketRateLimiter;
use crate::infrastructure::telemetry::{EventBus, TelemetryManager};

use super::checkpoint_manager::CheckpointManager;
use super::pipeline_builder::PipelineDefinition;
use super::row_processor::{RegisteredStep, RowProcessor};

/// Label of the linear edge into the default sink.
const CONTINUE_LABEL: &str = "continue";
/// Label of the edge into the error sink.
const ERROR_LABEL: &str = "error";

/// A sink with its registration state.
struct SinkSlot {
    name: String,
    plugin: Box<dyn SinkPlugin>,
    node_id: Option<NodeId>,
}

/// The finished run with its summary.
#[derive(Debug)]
pub struct RunReport {
    pub run: Run,
    pub summary: RunSummary,
}

/// A row about to be processed: fresh from the source, or an existing row
/// being replayed on resume.
enum RowSeed {
    Fresh { index: i64, data: Value },
    Existing {
        row_id: RowId,
        token_id: TokenId,
        data: Value,
    },
}

/// Drives a complete run (or resume) end to end.
pub struct Orchestrator {
    recorder: Arc<dyn LandscapeRecorder>,
    inspector: Arc<dyn LandscapeInspector>,
    config: RuntimeConfig,
    settings: Settings,

    source: Box<dyn SourcePlugin>,
    steps: Vec<RegisteredStep>,
    pending_steps: Vec<super::pipeline_builder::PipelineStep>,
    sinks: Vec<SinkSlot>,
    default_sink: String,
    error_sink: Option<String>,

    source_node_id: Option<NodeId>,
    edge_map: HashMap<EdgeKey, EdgeId>,

    processor: RowProcessor,
    checkpoints: Arc<CheckpointManager>,
    token_manager: Arc<TokenManager>,
    bus: EventBus,
    telemetry: Option<Arc<TelemetryManager>>,
    shutdown: Option<ShutdownToken>,
}

impl Orchestrator {
    /// Wires the engine components for one run. `start_sequence` is 0 for
    /// fresh runs and the resume point's sequence number when resuming.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recorder: Arc<dyn LandscapeRecorder>,
        inspector: Arc<dyn LandscapeInspector>,
        config: RuntimeConfig,
        settings: Settings,
        pipeline: PipelineDefinition,
        telemetry: Option<Arc<TelemetryManager>>,
        shutdown: Option<ShutdownToken>,
        start_sequence: i64,
    ) -> Self {
        let rate_limiter: Arc<dyn RateLimit> = Arc::new(TokenBucketRateLimiter::new(
            config.rate_limit.enabled,
            config.rate_limit.default_limits,
            config.rate_limit.overrides.clone(),
            config.rate_limit.persistence_path.clone(),
        ));

        let token_manager = Arc::new(TokenManager::new(Arc::clone(&recorder)));
        let checkpoints = Arc::new(CheckpointManager::new(
            Arc::clone(&recorder),
            config.checkpoint.clone(),
            start_sequence,
        ));

        let processor = RowProcessor::new(
            TransformExecutor::new(Arc::clone(&recorder)),
            GateExecutor::new(Arc::clone(&recorder)),
            AggregationExecutor::new(Arc::clone(&recorder)),
            SinkExecutor::new(Arc::clone(&recorder)),
            Arc::clone(&token_manager),
            Arc::clone(&checkpoints),
            Arc::clone(&rate_limiter),
        );

        let mut bus = EventBus::new();
        if let Some(manager) = &telemetry {
            let subscriber: Arc<dyn crate::infrastructure::telemetry::EventSubscriber> =
                manager.clone();
            bus.subscribe(subscriber);
        }

        let sinks = pipeline
            .sinks
            .into_iter()
            .map(|(name, plugin)| SinkSlot {
                name,
                plugin,
                node_id: None,
            })
            .collect();

        Orchestrator {
            recorder,
            inspector,
            config,
            settings,
            source: pipeline.source,
            steps: Vec::new(),
            pending_steps: pipeline.steps,
            sinks,
            default_sink: pipeline.default_sink,
            error_sink: pipeline.error_sink,
            source_node_id: None,
            edge_map: HashMap::new(),
            processor,
            checkpoints,
            token_manager,
            bus,
            telemetry,
            shutdown,
        }
    }

    /// Executes a fresh run end to end.
    pub async fn execute(mut self) -> Result<RunReport, EngineError> {
        let settings_json = self.settings.to_json()?;
        let run = self
            .recorder
            .begin_run(&settings_json, &self.config.canonical_version)
            .await?;
        let run_id = run.run_id;
        info!(run_id = %run_id, "run begun");

        self.bus.publish(&PipelineEvent::RunStarted {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            config_hash: run.config_hash.clone(),
        })?;

        let started = Instant::now();
        let body = self.run_body(run_id, None).await;
        self.close_all().await;
        self.finish(run_id, started, body).await
    }

    /// Resumes a failed run from its resume point, replaying only
    /// unprocessed rows against their original identities.
    pub async fn resume(
        mut self,
        run: Run,
        resume_point: ResumePoint,
    ) -> Result<RunReport, EngineError> {
        let run_id = run.run_id;
        info!(
            run_id = %run_id,
            sequence = resume_point.sequence_number,
            "resuming run from checkpoint"
        );

        let started = Instant::now();
        let body = self.run_body(run_id, Some(resume_point)).await;
        self.close_all().await;
        self.finish(run_id, started, body).await
    }

    async fn finish(
        self,
        run_id: RunId,
        started: Instant,
        body: Result<RunSummary, EngineError>,
    ) -> Result<RunReport, EngineError> {
        self.bus.publish(&PipelineEvent::PhaseChanged {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            phase: RunPhase::Finalizing,
        })?;

        match body {
            Ok(mut summary) => {
                summary.duration_ms = started.elapsed().as_millis() as u64;
                let run = self.recorder.finalize_run(run_id, RunStatus::Completed).await?;
                let deleted = self.checkpoints.clear(run_id).await?;
                debug!(run_id = %run_id, checkpoints_deleted = deleted, "run completed");

                self.bus.publish(&PipelineEvent::RunCompleted {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    run_id,
                    status: RunStatus::Completed,
                    summary: summary.clone(),
                })?;
                if let Some(telemetry) = &self.telemetry {
                    telemetry.flush();
                }

                Ok(RunReport { run, summary })
            }
            Err(error) => {
                if matches!(error, EngineError::Cancelled(_)) {
                    let closed = self
                        .recorder
                        .fail_open_states(run_id, "cancelled")
                        .await
                        .unwrap_or(0);
                    debug!(run_id = %run_id, states_closed = closed, "open states closed after cancellation");
                }

                // Finalization must not mask the original failure.
                if let Err(finalize_error) =
                    self.recorder.finalize_run(run_id, RunStatus::Failed).await
                {
                    warn!(run_id = %run_id, error = %finalize_error, "failed to finalize failed run");
                }

                let _ = self.bus.publish(&PipelineEvent::RunCompleted {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    run_id,
                    status: RunStatus::Failed,
                    summary: RunSummary::default(),
                });
                if let Some(telemetry) = &self.telemetry {
                    telemetry.flush();
                }

                Err(error)
            }
        }
    }

    /// The run body shared by execute and resume: register or adopt the
    /// graph, process rows, flush aggregations, deliver to sinks.
    async fn run_body(
        &mut self,
        run_id: RunId,
        resume_point: Option<ResumePoint>,
    ) -> Result<RunSummary, EngineError> {
        self.bus.publish(&PipelineEvent::PhaseChanged {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            phase: RunPhase::Registering,
        })?;

        self.validate_schemas()?;

        let resuming = resume_point.is_some();
        if resuming {
            self.adopt_graph(run_id).await?;
        } else {
            self.register_graph(run_id).await?;
        }

        if let Some(point) = &resume_point {
            self.restore_aggregation_state(point)?;
        }

        let source_node_id = self
            .source_node_id
            .ok_or_else(|| EngineError::integrity("source node not registered"))?;

        self.bus.publish(&PipelineEvent::PhaseChanged {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            phase: RunPhase::Processing,
        })?;

        let seeds = self.load_seeds(run_id, source_node_id, resuming).await?;
        let mut summary = RunSummary::default();
        let mut accumulators: HashMap<String, Vec<TokenInfo>> = HashMap::new();
        let mut last_token: Option<TokenId> = None;

        for seed in seeds {
            if let Some(token) = &self.shutdown {
                if token.is_cancelled() {
                    return Err(EngineError::Cancelled(
                        "run interrupted at row boundary".to_string(),
                    ));
                }
            }

            let token = match seed {
                RowSeed::Fresh { index, data } => {
                    let row = self
                        .recorder
                        .create_row(run_id, source_node_id, index, &data)
                        .await?;
                    self.bus.publish(&PipelineEvent::RowCreated {
                        event_id: Uuid::new_v4(),
                        timestamp: Utc::now(),
                        run_id,
                        row_id: row.row_id,
                        row_index: row.row_index,
                    })?;
                    self.token_manager.create_token(row.row_id, data).await?
                }
                RowSeed::Existing {
                    row_id,
                    token_id,
                    data,
                } => TokenInfo::new(row_id, token_id, data),
            };

            let token_id = token.token_id;
            last_token = Some(token_id);

            let result = self
                .processor
                .process_row(run_id, token, &mut self.steps, &self.edge_map, &self.bus)
                .await?;

            summary.record(result.outcome);
            let checkpoint_node = result.last_node_id.unwrap_or(source_node_id);
            self.route_result(result, &mut accumulators);

            self.checkpoints
                .maybe_checkpoint_row(run_id, token_id, checkpoint_node)
                .await?;
        }

        // End of source: flush any open aggregation batches.
        if let Some(checkpoint_token) = last_token {
            for index in 0..self.steps.len() {
                let node_id = self.steps[index].node_id;
                if self.processor.open_batch(node_id).is_some() {
                    let step_index = (index + 1) as i64;
                    let outputs = self
                        .processor
                        .flush_aggregation(
                            run_id,
                            &mut self.steps[index],
                            step_index,
                            "end_of_source",
                            checkpoint_token,
                        )
                        .await?;
                    debug!(
                        node_id = %node_id,
                        outputs = outputs.len(),
                        "end-of-source aggregation flush"
                    );
                }
            }
        }

        self.bus.publish(&PipelineEvent::PhaseChanged {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            phase: RunPhase::Flushing,
        })?;

        let sink_step_index = (self.steps.len() + 1) as i64;
        for slot in &mut self.sinks {
            let tokens = accumulators.remove(&slot.name).unwrap_or_default();
            if tokens.is_empty() {
                continue;
            }
            let node_id = slot
                .node_id
                .ok_or_else(|| EngineError::integrity(format!("sink '{}' not registered", slot.name)))?;

            let mut ctx = PluginContext::new(run_id, Some(node_id), sink_step_index);
            let artifact = self
                .processor
                .sink_executor
                .execute(
                    slot.plugin.as_mut(),
                    node_id,
                    &tokens,
                    sink_step_index,
                    &mut ctx,
                )
                .await?;
            if artifact.is_some() {
                summary.artifacts_written += 1;
            }

            for token in &tokens {
                self.bus.publish(&PipelineEvent::TokenCompleted {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    run_id,
                    token_id: token.token_id,
                    sink_name: slot.name.clone(),
                })?;
            }
        }

        Ok(summary)
    }

    /// Routes one row result into the per-sink accumulators.
    fn route_result(
        &self,
        result: elspeth_domain::value_objects::RowResult,
        accumulators: &mut HashMap<String, Vec<TokenInfo>>,
    ) {
        match result.outcome {
            RowOutcome::Completed => {
                if let Some(token) = result.token {
                    accumulators
                        .entry(self.default_sink.clone())
                        .or_default()
                        .push(token);
                }
            }
            RowOutcome::Routed => {
                if let (Some(token), Some(sink_name)) = (result.token, result.sink_name) {
                    accumulators.entry(sink_name).or_default().push(token);
                }
            }
            RowOutcome::Forked => {
                // Linear variant: each child's branch label names its
                // destination sink (the fork edges guaranteed they exist).
                for child in result.child_tokens {
                    if let Some(branch) = child.branch_name.clone() {
                        accumulators.entry(branch).or_default().push(child);
                    }
                }
            }
            RowOutcome::Consumed => {
                if !result.flush_outputs.is_empty() {
                    debug!(
                        outputs = result.flush_outputs.len(),
                        "aggregation produced outputs; delivery is the aggregation plugin's concern"
                    );
                }
            }
            RowOutcome::Failed => {
                if let (Some(error_sink), Some(token)) = (&self.error_sink, result.token) {
                    accumulators
                        .entry(error_sink.clone())
                        .or_default()
                        .push(token);
                }
            }
        }
    }

    /// Loads the rows to process: everything for a fresh run, only
    /// unprocessed rows (with their original identities) on resume.
    async fn load_seeds(
        &mut self,
        run_id: RunId,
        source_node_id: NodeId,
        resuming: bool,
    ) -> Result<Vec<RowSeed>, EngineError> {
        let mut ctx = PluginContext::new(run_id, Some(source_node_id), 0);
        let rows = self.source.load(&mut ctx).await?;

        if !resuming {
            return Ok(rows
                .into_iter()
                .enumerate()
                .map(|(index, data)| RowSeed::Fresh {
                    index: index as i64,
                    data,
                })
                .collect());
        }

        let unprocessed = self.inspector.unprocessed_rows(run_id).await?;
        let mut seeds = Vec::with_capacity(unprocessed.len());
        for row in unprocessed {
            let data = rows.get(row.row_index as usize).cloned().ok_or_else(|| {
                EngineError::ResumeRefused(format!(
                    "source no longer yields row index {}; cannot resume",
                    row.row_index
                ))
            })?;

            let replayed_hash = elspeth_domain::services::canonical_hash(&data)?;
            if replayed_hash != row.source_data_hash {
                return Err(EngineError::ResumeRefused(format!(
                    "source data for row index {} changed since the original run",
                    row.row_index
                )));
            }

            let token = self.inspector.row_token(row.row_id).await?;
            seeds.push(RowSeed::Existing {
                row_id: row.row_id,
                token_id: token.token_id,
                data,
            });
        }
        Ok(seeds)
    }

    /// Validates the declared field contracts along the linear chain.
    fn validate_schemas(&self) -> Result<(), EngineError> {
        let mut owned: Vec<(String, PluginSchema)> = Vec::new();
        owned.push((
            self.source.name().to_string(),
            self.source.output_schema(),
        ));
        for step in &self.pending_steps {
            owned.push((step.plugin.name().to_string(), step.plugin.input_schema()));
        }
        for slot in &self.sinks {
            if slot.name == self.default_sink {
                owned.push((slot.name.clone(), slot.plugin.input_schema()));
            }
        }

        let chain: Vec<(&str, &PluginSchema)> = owned
            .iter()
            .map(|(name, schema)| (name.as_str(), schema))
            .collect();
        schema_compat::validate_chain(&chain)
    }

    /// Registers the graph for a fresh run and builds the edge map.
    async fn register_graph(&mut self, run_id: RunId) -> Result<(), EngineError> {
        let source_node = self
            .recorder
            .register_node(
                run_id,
                NodeRegistration {
                    plugin_name: self.source.name().to_string(),
                    plugin_version: self.source.plugin_version().to_string(),
                    node_type: NodeType::Source,
                    determinism: self.source.determinism(),
                    config: self.source.config(),
                    schema_hash: self.source.output_schema().schema_hash().ok(),
                    sequence_in_pipeline: Some(0),
                },
            )
            .await?;
        self.source_node_id = Some(source_node.node_id);

        let pending = std::mem::take(&mut self.pending_steps);
        let mut gate_nodes: Vec<NodeId> = Vec::new();
        for (index, step) in pending.into_iter().enumerate() {
            let node = self
                .recorder
                .register_node(
                    run_id,
                    NodeRegistration {
                        plugin_name: step.plugin.name().to_string(),
                        plugin_version: step.plugin.plugin_version().to_string(),
                        node_type: step.plugin.node_type(),
                        determinism: step.plugin.determinism(),
                        config: step.plugin.config(),
                        schema_hash: step.plugin.output_schema().schema_hash().ok(),
                        sequence_in_pipeline: Some((index + 1) as i64),
                    },
                )
                .await?;
            if node.node_type == NodeType::Gate {
                gate_nodes.push(node.node_id);
            }
            self.steps.push(RegisteredStep {
                node_id: node.node_id,
                plugin: step.plugin,
                retry: step.retry,
            });
        }

        let sink_sequence = (self.steps.len() + 1) as i64;
        for slot in &mut self.sinks {
            let mut config = slot.plugin.config();
            if let Some(map) = config.as_object_mut() {
                map.insert("sink_name".to_string(), json!(slot.name));
            }
            let node = self
                .recorder
                .register_node(
                    run_id,
                    NodeRegistration {
                        plugin_name: slot.plugin.name().to_string(),
                        plugin_version: slot.plugin.plugin_version().to_string(),
                        node_type: NodeType::Sink,
                        determinism: slot.plugin.determinism(),
                        config,
                        schema_hash: slot.plugin.input_schema().schema_hash().ok(),
                        sequence_in_pipeline: Some(sink_sequence),
                    },
                )
                .await?;
            slot.node_id = Some(node.node_id);
        }

        // Edges: the linear continue edge into the default sink, every
        // gate to every sink, and the error edge when configured.
        let last_node = self
            .steps
            .last()
            .map(|s| s.node_id)
            .unwrap_or(source_node.node_id);

        let mut edges = Vec::new();
        let default_sink_node = self.sink_node(&self.default_sink.clone())?;
        edges.push((last_node, default_sink_node, CONTINUE_LABEL.to_string()));

        for gate in &gate_nodes {
            for slot in &self.sinks {
                let sink_node = slot
                    .node_id
                    .ok_or_else(|| EngineError::integrity("sink registered without node id"))?;
                edges.push((*gate, sink_node, slot.name.clone()));
            }
        }

        if let Some(error_sink) = self.error_sink.clone() {
            let error_node = self.sink_node(&error_sink)?;
            edges.push((last_node, error_node, ERROR_LABEL.to_string()));
        }

        for (from, to, label) in edges {
            let edge = self
                .recorder
                .register_edge(run_id, from, to, &label, RoutingMode::Move)
                .await?;
            self.edge_map.insert((from, label), edge.edge_id);
        }

        debug!(
            run_id = %run_id,
            steps = self.steps.len(),
            sinks = self.sinks.len(),
            edges = self.edge_map.len(),
            "graph registered"
        );
        Ok(())
    }

    /// Adopts the graph recorded for an earlier run, mapping registered
    /// nodes onto the rebuilt pipeline. Any mismatch refuses the resume.
    async fn adopt_graph(&mut self, run_id: RunId) -> Result<(), EngineError> {
        let nodes = self.inspector.load_nodes(run_id).await?;
        let edges = self.inspector.load_edges(run_id).await?;

        let source_node = nodes
            .iter()
            .find(|n| n.node_type == NodeType::Source)
            .ok_or_else(|| {
                EngineError::ResumeRefused("recorded graph has no source node".to_string())
            })?;
        if source_node.plugin_name != self.source.name() {
            return Err(EngineError::ResumeRefused(format!(
                "recorded source plugin '{}' does not match configured '{}'",
                source_node.plugin_name,
                self.source.name()
            )));
        }
        self.source_node_id = Some(source_node.node_id);

        let pending = std::mem::take(&mut self.pending_steps);
        for (index, step) in pending.into_iter().enumerate() {
            let sequence = (index + 1) as i64;
            let node = nodes
                .iter()
                .find(|n| n.sequence_in_pipeline == Some(sequence) && n.node_type != NodeType::Sink)
                .ok_or_else(|| {
                    EngineError::ResumeRefused(format!(
                        "recorded graph has no node at sequence {}",
                        sequence
                    ))
                })?;
            if node.plugin_name != step.plugin.name() || node.node_type != step.plugin.node_type() {
                return Err(EngineError::ResumeRefused(format!(
                    "recorded node at sequence {} is {} '{}', configured pipeline has {} '{}'",
                    sequence,
                    node.node_type.as_str(),
                    node.plugin_name,
                    step.plugin.node_type().as_str(),
                    step.plugin.name()
                )));
            }
            self.steps.push(RegisteredStep {
                node_id: node.node_id,
                plugin: step.plugin,
                retry: step.retry,
            });
        }

        for slot in &mut self.sinks {
            let node = nodes
                .iter()
                .filter(|n| n.node_type == NodeType::Sink)
                .find(|n| {
                    n.config_json.get("sink_name").and_then(Value::as_str) == Some(slot.name.as_str())
                })
                .ok_or_else(|| {
                    EngineError::ResumeRefused(format!(
                        "recorded graph has no sink named '{}'",
                        slot.name
                    ))
                })?;
            slot.node_id = Some(node.node_id);
        }

        for edge in edges {
            self.edge_map
                .insert((edge.from_node_id, edge.label), edge.edge_id);
        }

        debug!(run_id = %run_id, "graph adopted from landscape");
        Ok(())
    }

    /// Restores aggregation buffers from the checkpoint's state map
    /// (keyed by aggregation node id).
    fn restore_aggregation_state(&mut self, point: &ResumePoint) -> Result<(), EngineError> {
        let state_map = match &point.aggregation_state {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(EngineError::ResumeRefused(format!(
                    "checkpoint aggregation state is not an object: {}",
                    other
                )));
            }
            None => return Ok(()),
        };

        for step in &mut self.steps {
            if let StepPlugin::Aggregation(plugin) = &mut step.plugin {
                if let Some(state) = state_map.get(&step.node_id.to_string()) {
                    plugin.restore_state(state)?;
                    debug!(node_id = %step.node_id, "aggregation buffer restored");
                }
            }
        }
        Ok(())
    }

    fn sink_node(&self, name: &str) -> Result<NodeId, EngineError> {
        self.sinks
            .iter()
            .find(|slot| slot.name == name)
            .and_then(|slot| slot.node_id)
            .ok_or_else(|| EngineError::integrity(format!("sink '{}' has no registered node", name)))
    }

    /// Closes the source, every step, and every sink. Failures are logged
    /// and do not mask the run outcome.
    async fn close_all(&mut self) {
        if let Err(e) = self.source.close().await {
            warn!(error = %e, "source close failed");
        }
        for step in &mut self.steps {
            if let Err(e) = step.plugin.close().await {
                warn!(error = %e, "step close failed");
            }
        }
        for slot in &mut self.sinks {
            if let Err(e) = slot.plugin.close().await {
                warn!(sink = %slot.name, error = %e, "sink close failed");
            }
        }
    }
}
