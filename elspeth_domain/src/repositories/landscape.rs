// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Landscape Ports
//!
//! The audit store behind two interfaces:
//!
//! - [`LandscapeRecorder`]: the authoritative, write-only path. Executors
//!   and the orchestrator never touch the store any other way. Every
//!   operation commits as one atomic transaction; writes within a run are
//!   serialized.
//! - [`LandscapeInspector`]: the read side: lineage, terminal-state
//!   derivation, resume queries, retention scans. Readers tolerate
//!   in-flight writes but never observe partial state machines.
//!
//! Nothing here is ever consulted to drive routing; the Landscape records
//! execution, it does not schedule it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entities::artifact::{Artifact, ArtifactType};
use crate::entities::batch::{Batch, BatchStatus};
use crate::entities::call::{Call, CallDraft};
use crate::entities::checkpoint::{Checkpoint, ResumePoint};
use crate::entities::edge::Edge;
use crate::entities::lineage::{RowLineage, TerminalState};
use crate::entities::node::{Node, NodeRegistration};
use crate::entities::node_state::{NodeState, NodeStateStatus, RoutingEvent};
use crate::entities::row::{Row, Token};
use crate::entities::run::{ReproducibilityGrade, Run, RunStatus};
use crate::error::EngineError;
use crate::value_objects::ids::{
    BatchId, EdgeId, NodeId, RowId, RunId, StateId, TokenId,
};
use crate::value_objects::routing::RoutingMode;

/// A payload-store reference found by a retention scan, with enough
/// context to update the owning run's grade after deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredPayloadRef {
    pub run_id: RunId,
    /// The content hash the blob is addressed by.
    pub payload_hash: String,
}

/// Authoritative write path to the audit store.
#[async_trait]
pub trait LandscapeRecorder: Send + Sync {
    /// Creates a run with status `running`, recording the settings, their
    /// canonical hash, and the canonical hash version in force.
    async fn begin_run(
        &self,
        settings: &Value,
        canonical_version: &str,
    ) -> Result<Run, EngineError>;

    /// Registers a node. Fails when determinism is missing or unknown;
    /// there is no default.
    async fn register_node(
        &self,
        run_id: RunId,
        registration: NodeRegistration,
    ) -> Result<Node, EngineError>;

    /// Registers an edge. Label uniqueness is (from_node, label).
    async fn register_edge(
        &self,
        run_id: RunId,
        from_node_id: NodeId,
        to_node_id: NodeId,
        label: &str,
        mode: RoutingMode,
    ) -> Result<Edge, EngineError>;

    /// Creates a source row: canonically hashes the data, stores the
    /// payload, records index and references.
    async fn create_row(
        &self,
        run_id: RunId,
        source_node_id: NodeId,
        row_index: i64,
        data: &Value,
    ) -> Result<Row, EngineError>;

    /// Creates a token for a row.
    async fn create_token(&self, row_id: RowId) -> Result<Token, EngineError>;

    /// Forks a token: one child per branch with `branch_name` set, and a
    /// token_parents record of kind `fork` for each.
    async fn fork_token(
        &self,
        parent_token_id: TokenId,
        row_id: RowId,
        branches: &[String],
        step_in_pipeline: i64,
    ) -> Result<Vec<Token>, EngineError>;

    /// Coalesces tokens into one child, recording kind `coalesce`
    /// parentage for each parent.
    async fn coalesce_tokens(
        &self,
        parent_token_ids: &[TokenId],
        row_id: RowId,
        step_in_pipeline: i64,
    ) -> Result<Token, EngineError>;

    /// Opens a node-state for (token, node): attempt is the next integer
    /// in sequence, status starts `open`, input hash and payload reference
    /// are populated.
    async fn begin_node_state(
        &self,
        token_id: TokenId,
        node_id: NodeId,
        step_index: i64,
        input_data: &Value,
    ) -> Result<NodeState, EngineError>;

    /// Completes a node-state. `status` must be terminal; updating a
    /// non-open state is an integrity violation.
    async fn complete_node_state(
        &self,
        state_id: StateId,
        status: NodeStateStatus,
        output_data: Option<&Value>,
        duration_ms: i64,
        error: Option<&Value>,
    ) -> Result<NodeState, EngineError>;

    /// Records one routing event bound to a state and a registered edge.
    async fn record_routing_event(
        &self,
        state_id: StateId,
        edge_id: EdgeId,
        mode: RoutingMode,
        reason: &Value,
    ) -> Result<RoutingEvent, EngineError>;

    /// Records one routing event per destination of a multi-way decision
    /// (fork), all sharing the same reason.
    async fn record_routing_events(
        &self,
        state_id: StateId,
        routes: &[(EdgeId, RoutingMode)],
        reason: &Value,
    ) -> Result<Vec<RoutingEvent>, EngineError> {
        let mut events = Vec::with_capacity(routes.len());
        for (edge_id, mode) in routes {
            events.push(
                self.record_routing_event(state_id, *edge_id, *mode, reason)
                    .await?,
            );
        }
        Ok(events)
    }

    /// Creates a batch in `draft`.
    async fn create_batch(
        &self,
        run_id: RunId,
        aggregation_node_id: NodeId,
    ) -> Result<Batch, EngineError>;

    /// Adds a member to a draft batch; rejects other statuses.
    async fn add_batch_member(
        &self,
        batch_id: BatchId,
        token_id: TokenId,
        ordinal: i64,
    ) -> Result<(), EngineError>;

    /// Transitions a batch, enforcing the draft→executing→terminal
    /// lifecycle.
    async fn update_batch_status(
        &self,
        batch_id: BatchId,
        status: BatchStatus,
        trigger_reason: Option<&str>,
    ) -> Result<Batch, EngineError>;

    /// Registers a sink artifact. `content_hash` and `size_bytes` are
    /// required by the schema.
    #[allow(clippy::too_many_arguments)]
    async fn register_artifact(
        &self,
        run_id: RunId,
        state_id: StateId,
        sink_node_id: NodeId,
        artifact_type: ArtifactType,
        path_or_uri: &str,
        content_hash: &str,
        size_bytes: i64,
        metadata: Option<&Value>,
    ) -> Result<Artifact, EngineError>;

    /// Records an external call under its enclosing node-state.
    async fn record_call(
        &self,
        state_id: StateId,
        draft: CallDraft,
    ) -> Result<Call, EngineError>;

    /// Creates a checkpoint row.
    async fn create_checkpoint(
        &self,
        run_id: RunId,
        token_id: TokenId,
        node_id: NodeId,
        sequence_number: i64,
        aggregation_state: Option<&Value>,
    ) -> Result<Checkpoint, EngineError>;

    /// Deletes all checkpoints for a run (successful completion).
    async fn delete_checkpoints(&self, run_id: RunId) -> Result<u64, EngineError>;

    /// Completes any still-open node-states as failed with the given error
    /// tag (cancellation/crash path).
    async fn fail_open_states(&self, run_id: RunId, error_tag: &str) -> Result<u64, EngineError>;

    /// Sets terminal run status and optionally the grade.
    async fn complete_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        grade: Option<ReproducibilityGrade>,
    ) -> Result<Run, EngineError>;

    /// Computes the reproducibility grade from the run's nodes and
    /// delegates to `complete_run`.
    async fn finalize_run(&self, run_id: RunId, status: RunStatus) -> Result<Run, EngineError>;

    /// Overwrites the grade (retention purge path).
    async fn update_grade(
        &self,
        run_id: RunId,
        grade: ReproducibilityGrade,
    ) -> Result<(), EngineError>;
}

/// Read side of the audit store.
#[async_trait]
pub trait LandscapeInspector: Send + Sync {
    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>, EngineError>;

    /// All runs, most recent first.
    async fn list_runs(&self) -> Result<Vec<Run>, EngineError>;

    /// All nodes of a run in registration order.
    async fn load_nodes(&self, run_id: RunId) -> Result<Vec<Node>, EngineError>;

    /// All edges of a run.
    async fn load_edges(&self, run_id: RunId) -> Result<Vec<Edge>, EngineError>;

    /// Full lineage of one row: states, routing, artifacts, payloads if
    /// they still resolve.
    async fn explain_row(&self, run_id: RunId, row_id: RowId) -> Result<RowLineage, EngineError>;

    /// Derives a token's terminal state from relational evidence.
    async fn derive_terminal_state(
        &self,
        token_id: TokenId,
    ) -> Result<TerminalState, EngineError>;

    /// True iff the run exists, is not completed, is not running, and has
    /// at least one checkpoint.
    async fn can_resume(&self, run_id: RunId) -> Result<bool, EngineError>;

    /// The highest-sequence checkpoint of a run.
    async fn resume_point(&self, run_id: RunId) -> Result<Option<ResumePoint>, EngineError>;

    /// All rows of a run in row-index order.
    async fn list_rows(&self, run_id: RunId) -> Result<Vec<Row>, EngineError>;

    /// Rows whose latest-attempt state at a sink is not `completed`, in
    /// row-index order.
    async fn unprocessed_rows(&self, run_id: RunId) -> Result<Vec<Row>, EngineError>;

    /// The original token created with a row (resume reuses it so
    /// re-attempts extend the attempt sequence).
    async fn row_token(&self, row_id: RowId) -> Result<Token, EngineError>;

    /// Payload references owned by runs completed before the cutoff.
    async fn find_expired_payload_refs(
        &self,
        completed_before: DateTime<Utc>,
    ) -> Result<Vec<ExpiredPayloadRef>, EngineError>;
}
