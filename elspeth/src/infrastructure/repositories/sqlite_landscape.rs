// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Landscape Recorder
//!
//! The authoritative write path to the audit store, backed by SQLite
//! through sqlx. Every operation commits as one atomic transaction; writes
//! within a run are serialized by construction (the engine drives one row
//! at a time) and by SQLite's writer lock otherwise.
//!
//! The recorder owns the payload store: payload bytes are written in
//! canonical form **before** the referencing Landscape row commits, so a
//! committed reference always pointed at a stored blob (retention may
//! remove it later; the hash remains).
//!
//! Integrity rules enforced here rather than in callers:
//!
//! - Attempt numbers are allocated inside the transaction that opens the
//!   state: `max(attempt) + 1` per (token, node), so they are monotonic
//!   with no gaps.
//! - Completing a state requires it to still be `open`; anything else is
//!   an integrity violation, not an update.
//! - Batch members are only admitted while the batch is `draft`, and
//!   status transitions follow draft → executing → completed | failed.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

use elspeth_domain::entities::{
    Artifact, ArtifactType, Batch, BatchStatus, Call, CallDraft, Checkpoint, Edge, Node,
    NodeRegistration, NodeState, NodeStateStatus, ReproducibilityGrade, RoutingEvent, Row, Run,
    RunStatus, Token,
};
use elspeth_domain::repositories::{LandscapeRecorder, PayloadStore};
use elspeth_domain::services::{canonical, reproducibility};
use elspeth_domain::value_objects::{
    ArtifactId, BatchId, CallId, CheckpointId, EdgeId, NodeId, RoutingEventId, RoutingMode,
    RowId, RunId, StateId, TokenId,
};
use elspeth_domain::EngineError;

use super::mappers;
use super::schema;

/// SQLite-backed Landscape: implements both the recorder (here) and the
/// inspector (`sqlite_inspector`).
pub struct SqliteLandscape {
    pool: SqlitePool,
    payloads: Arc<dyn PayloadStore>,
}

impl SqliteLandscape {
    /// Opens (creating if needed) the Landscape at the configured path.
    pub async fn new(
        landscape_path: &str,
        payloads: Arc<dyn PayloadStore>,
    ) -> Result<Self, EngineError> {
        let url = schema::database_url(landscape_path);
        let pool = schema::initialize_database(&url)
            .await
            .map_err(|e| EngineError::database_error(format!("failed to open landscape: {}", e)))?;
        debug!(url = %url, "Landscape opened");
        Ok(SqliteLandscape { pool, payloads })
    }

    /// In-memory Landscape for tests.
    pub async fn in_memory(payloads: Arc<dyn PayloadStore>) -> Result<Self, EngineError> {
        Self::new(":memory:", payloads).await
    }

    /// The underlying pool, for the inspector queries.
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The payload store this recorder writes through.
    pub fn payload_store(&self) -> Arc<dyn PayloadStore> {
        Arc::clone(&self.payloads)
    }

    /// Stores a value's canonical form in the payload store, returning
    /// `(canonical_hash, payload_ref)`. The two are the same string by
    /// construction; both are returned to keep call sites explicit about
    /// which column they fill.
    async fn store_payload(&self, value: &Value) -> Result<(String, String), EngineError> {
        let text = canonical::canonicalize(value)?;
        let hash = self.payloads.store(text.as_bytes()).await?;
        Ok((hash.clone(), hash))
    }

    async fn fetch_run(&self, run_id: RunId) -> Result<Run, EngineError> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| EngineError::NotFound(format!("run {}", run_id)))?;
        mappers::run_from_row(&row)
    }

    async fn fetch_state(&self, state_id: StateId) -> Result<NodeState, EngineError> {
        let row = sqlx::query("SELECT * FROM node_states WHERE state_id = ?")
            .bind(state_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| EngineError::NotFound(format!("node state {}", state_id)))?;
        mappers::node_state_from_row(&row)
    }

    async fn fetch_batch(&self, batch_id: BatchId) -> Result<Batch, EngineError> {
        let row = sqlx::query("SELECT * FROM batches WHERE batch_id = ?")
            .bind(batch_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| EngineError::NotFound(format!("batch {}", batch_id)))?;
        mappers::batch_from_row(&row)
    }

    async fn insert_token(
        &self,
        token_id: TokenId,
        row_id: RowId,
        branch_name: Option<&str>,
    ) -> Result<Token, EngineError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO tokens (token_id, row_id, branch_name, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(token_id.to_string())
        .bind(row_id.to_string())
        .bind(branch_name)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Token {
            token_id,
            row_id,
            branch_name: branch_name.map(str::to_string),
            created_at: now,
        })
    }
}

fn db_err(e: sqlx::Error) -> EngineError {
    EngineError::database_error(e.to_string())
}

#[async_trait]
impl LandscapeRecorder for SqliteLandscape {
    async fn begin_run(
        &self,
        settings: &Value,
        canonical_version: &str,
    ) -> Result<Run, EngineError> {
        let run_id = RunId::new();
        let config_hash = canonical::canonical_hash(settings)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO runs (run_id, status, config_hash, settings_json,
                              canonical_version, reproducibility_grade, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, NULL)
            "#,
        )
        .bind(run_id.to_string())
        .bind(RunStatus::Running.as_str())
        .bind(&config_hash)
        .bind(serde_json::to_string(settings)?)
        .bind(canonical_version)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(run_id = %run_id, config_hash = %config_hash, "run begun");

        Ok(Run {
            run_id,
            status: RunStatus::Running,
            config_hash,
            settings_json: settings.clone(),
            canonical_version: canonical_version.to_string(),
            reproducibility_grade: None,
            started_at: now,
            completed_at: None,
        })
    }

    async fn register_node(
        &self,
        run_id: RunId,
        registration: NodeRegistration,
    ) -> Result<Node, EngineError> {
        let node_id = NodeId::new();
        let config_hash = canonical::canonical_hash(&registration.config)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO nodes (node_id, run_id, plugin_name, plugin_version, node_type,
                               determinism, config_hash, config_json, sequence_in_pipeline,
                               schema_hash, registered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node_id.to_string())
        .bind(run_id.to_string())
        .bind(&registration.plugin_name)
        .bind(&registration.plugin_version)
        .bind(registration.node_type.as_str())
        .bind(registration.determinism.as_str())
        .bind(&config_hash)
        .bind(serde_json::to_string(&registration.config)?)
        .bind(registration.sequence_in_pipeline)
        .bind(&registration.schema_hash)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Node {
            node_id,
            run_id,
            plugin_name: registration.plugin_name,
            plugin_version: registration.plugin_version,
            node_type: registration.node_type,
            determinism: registration.determinism,
            config_hash,
            config_json: registration.config,
            sequence_in_pipeline: registration.sequence_in_pipeline,
            schema_hash: registration.schema_hash,
            registered_at: now,
        })
    }

    async fn register_edge(
        &self,
        run_id: RunId,
        from_node_id: NodeId,
        to_node_id: NodeId,
        label: &str,
        mode: RoutingMode,
    ) -> Result<Edge, EngineError> {
        let edge_id = EdgeId::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO edges (edge_id, run_id, from_node_id, to_node_id, label,
                               default_mode, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(edge_id.to_string())
        .bind(run_id.to_string())
        .bind(from_node_id.to_string())
        .bind(to_node_id.to_string())
        .bind(label)
        .bind(mode.as_str())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // The (from_node, label) unique index catches duplicate labels.
            EngineError::database_error(format!(
                "failed to register edge '{}' from {}: {}",
                label, from_node_id, e
            ))
        })?;

        Ok(Edge {
            edge_id,
            run_id,
            from_node_id,
            to_node_id,
            label: label.to_string(),
            default_mode: mode,
            created_at: now,
        })
    }

    async fn create_row(
        &self,
        run_id: RunId,
        source_node_id: NodeId,
        row_index: i64,
        data: &Value,
    ) -> Result<Row, EngineError> {
        let row_id = RowId::new();
        let (source_data_hash, source_data_ref) = self.store_payload(data).await?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO rows (row_id, run_id, source_node_id, row_index,
                              source_data_hash, source_data_ref, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row_id.to_string())
        .bind(run_id.to_string())
        .bind(source_node_id.to_string())
        .bind(row_index)
        .bind(&source_data_hash)
        .bind(&source_data_ref)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Row {
            row_id,
            run_id,
            source_node_id,
            row_index,
            source_data_hash,
            source_data_ref: Some(source_data_ref),
            created_at: now,
        })
    }

    async fn create_token(&self, row_id: RowId) -> Result<Token, EngineError> {
        self.insert_token(TokenId::new(), row_id, None).await
    }

    async fn fork_token(
        &self,
        parent_token_id: TokenId,
        row_id: RowId,
        branches: &[String],
        step_in_pipeline: i64,
    ) -> Result<Vec<Token>, EngineError> {
        if branches.is_empty() {
            return Err(EngineError::integrity(
                "fork_token requires at least one branch",
            ));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let now = Utc::now();
        let mut children = Vec::with_capacity(branches.len());

        for branch in branches {
            let child_id = TokenId::new();
            sqlx::query(
                r#"
                INSERT INTO tokens (token_id, row_id, branch_name, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(child_id.to_string())
            .bind(row_id.to_string())
            .bind(branch)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            sqlx::query(
                r#"
                INSERT INTO token_parents (parent_token_id, child_token_id, step_in_pipeline, kind)
                VALUES (?, ?, ?, 'fork')
                "#,
            )
            .bind(parent_token_id.to_string())
            .bind(child_id.to_string())
            .bind(step_in_pipeline)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            children.push(Token {
                token_id: child_id,
                row_id,
                branch_name: Some(branch.clone()),
                created_at: now,
            });
        }

        tx.commit().await.map_err(db_err)?;
        Ok(children)
    }

    async fn coalesce_tokens(
        &self,
        parent_token_ids: &[TokenId],
        row_id: RowId,
        step_in_pipeline: i64,
    ) -> Result<Token, EngineError> {
        if parent_token_ids.is_empty() {
            return Err(EngineError::integrity(
                "coalesce_tokens requires at least one parent",
            ));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let child_id = TokenId::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO tokens (token_id, row_id, branch_name, created_at)
            VALUES (?, ?, NULL, ?)
            "#,
        )
        .bind(child_id.to_string())
        .bind(row_id.to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for parent in parent_token_ids {
            sqlx::query(
                r#"
                INSERT INTO token_parents (parent_token_id, child_token_id, step_in_pipeline, kind)
                VALUES (?, ?, ?, 'coalesce')
                "#,
            )
            .bind(parent.to_string())
            .bind(child_id.to_string())
            .bind(step_in_pipeline)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(Token {
            token_id: child_id,
            row_id,
            branch_name: None,
            created_at: now,
        })
    }

    async fn begin_node_state(
        &self,
        token_id: TokenId,
        node_id: NodeId,
        step_index: i64,
        input_data: &Value,
    ) -> Result<NodeState, EngineError> {
        let (input_hash, input_ref) = self.store_payload(input_data).await?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Attempt allocation happens inside the transaction so concurrent
        // opens cannot race to the same number.
        let attempt: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(attempt), 0) + 1
            FROM node_states
            WHERE token_id = ? AND node_id = ?
            "#,
        )
        .bind(token_id.to_string())
        .bind(node_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let state_id = StateId::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO node_states (state_id, token_id, node_id, attempt, step_index,
                                     status, input_hash, output_hash, input_ref, output_ref,
                                     duration_ms, error_json, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, 'open', ?, NULL, ?, NULL, NULL, NULL, ?, NULL)
            "#,
        )
        .bind(state_id.to_string())
        .bind(token_id.to_string())
        .bind(node_id.to_string())
        .bind(attempt)
        .bind(step_index)
        .bind(&input_hash)
        .bind(&input_ref)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(NodeState {
            state_id,
            token_id,
            node_id,
            attempt,
            step_index,
            status: NodeStateStatus::Open,
            input_hash,
            output_hash: None,
            input_ref: Some(input_ref),
            output_ref: None,
            duration_ms: None,
            error_json: None,
            started_at: now,
            completed_at: None,
        })
    }

    async fn complete_node_state(
        &self,
        state_id: StateId,
        status: NodeStateStatus,
        output_data: Option<&Value>,
        duration_ms: i64,
        error: Option<&Value>,
    ) -> Result<NodeState, EngineError> {
        if !status.is_terminal() {
            return Err(EngineError::integrity(format!(
                "cannot complete state {} with non-terminal status '{}'",
                state_id,
                status.as_str()
            )));
        }

        let (output_hash, output_ref) = match output_data {
            Some(value) => {
                let (hash, payload_ref) = self.store_payload(value).await?;
                (Some(hash), Some(payload_ref))
            }
            None => (None, None),
        };
        let error_json = error.map(serde_json::to_string).transpose()?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE node_states
            SET status = ?, output_hash = ?, output_ref = ?, duration_ms = ?,
                error_json = ?, completed_at = ?
            WHERE state_id = ? AND status = 'open'
            "#,
        )
        .bind(status.as_str())
        .bind(&output_hash)
        .bind(&output_ref)
        .bind(duration_ms)
        .bind(&error_json)
        .bind(now.to_rfc3339())
        .bind(state_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            // Distinguish a missing state from a double completion; both
            // refuse, with different errors.
            let existing = self.fetch_state(state_id).await;
            return match existing {
                Ok(state) => Err(EngineError::integrity(format!(
                    "state {} is already '{}'; completion is one-shot",
                    state_id,
                    state.status.as_str()
                ))),
                Err(e) => Err(e),
            };
        }

        self.fetch_state(state_id).await
    }

    async fn record_routing_event(
        &self,
        state_id: StateId,
        edge_id: EdgeId,
        mode: RoutingMode,
        reason: &Value,
    ) -> Result<RoutingEvent, EngineError> {
        let event_id = RoutingEventId::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO routing_events (event_id, state_id, edge_id, mode, reason_json, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_id.to_string())
        .bind(state_id.to_string())
        .bind(edge_id.to_string())
        .bind(mode.as_str())
        .bind(serde_json::to_string(reason)?)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(RoutingEvent {
            event_id,
            state_id,
            edge_id,
            mode,
            reason_json: reason.clone(),
            recorded_at: now,
        })
    }

    async fn create_batch(
        &self,
        run_id: RunId,
        aggregation_node_id: NodeId,
    ) -> Result<Batch, EngineError> {
        let batch_id = BatchId::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO batches (batch_id, run_id, aggregation_node_id, status,
                                 trigger_reason, created_at, flushed_at)
            VALUES (?, ?, ?, 'draft', NULL, ?, NULL)
            "#,
        )
        .bind(batch_id.to_string())
        .bind(run_id.to_string())
        .bind(aggregation_node_id.to_string())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Batch {
            batch_id,
            run_id,
            aggregation_node_id,
            status: BatchStatus::Draft,
            trigger_reason: None,
            created_at: now,
            flushed_at: None,
        })
    }

    async fn add_batch_member(
        &self,
        batch_id: BatchId,
        token_id: TokenId,
        ordinal: i64,
    ) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM batches WHERE batch_id = ?")
                .bind(batch_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        match status.as_deref() {
            None => return Err(EngineError::NotFound(format!("batch {}", batch_id))),
            Some("draft") => {}
            Some(other) => {
                return Err(EngineError::integrity(format!(
                    "batch {} is '{}'; members may only be added while draft",
                    batch_id, other
                )));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO batch_members (batch_id, token_id, ordinal)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(batch_id.to_string())
        .bind(token_id.to_string())
        .bind(ordinal)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: BatchId,
        status: BatchStatus,
        trigger_reason: Option<&str>,
    ) -> Result<Batch, EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current_raw: Option<String> =
            sqlx::query_scalar("SELECT status FROM batches WHERE batch_id = ?")
                .bind(batch_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        let current = match current_raw {
            None => return Err(EngineError::NotFound(format!("batch {}", batch_id))),
            Some(raw) => BatchStatus::parse(&raw)?,
        };

        if !current.can_transition_to(status) {
            return Err(EngineError::integrity(format!(
                "batch {} cannot transition {} -> {}",
                batch_id,
                current.as_str(),
                status.as_str()
            )));
        }

        let flushed_at = if status.is_terminal() {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };

        sqlx::query(
            r#"
            UPDATE batches
            SET status = ?,
                trigger_reason = COALESCE(?, trigger_reason),
                flushed_at = COALESCE(?, flushed_at)
            WHERE batch_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(trigger_reason)
        .bind(flushed_at)
        .bind(batch_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        self.fetch_batch(batch_id).await
    }

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
    ) -> Result<Artifact, EngineError> {
        if content_hash.is_empty() {
            return Err(EngineError::integrity(
                "artifact content_hash is required and may not be empty",
            ));
        }

        let artifact_id = ArtifactId::new();
        let now = Utc::now();
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO artifacts (artifact_id, run_id, sink_node_id, state_id, artifact_type,
                                   path_or_uri, content_hash, size_bytes, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(artifact_id.to_string())
        .bind(run_id.to_string())
        .bind(sink_node_id.to_string())
        .bind(state_id.to_string())
        .bind(artifact_type.as_str())
        .bind(path_or_uri)
        .bind(content_hash)
        .bind(size_bytes)
        .bind(&metadata_json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Artifact {
            artifact_id,
            run_id,
            sink_node_id,
            state_id,
            artifact_type,
            path_or_uri: path_or_uri.to_string(),
            content_hash: content_hash.to_string(),
            size_bytes,
            metadata_json: metadata.cloned(),
            created_at: now,
        })
    }

    async fn record_call(
        &self,
        state_id: StateId,
        draft: CallDraft,
    ) -> Result<Call, EngineError> {
        let call_id = CallId::new();
        let now = Utc::now();

        let request_ref = match &draft.request {
            Some(value) => Some(self.store_payload(value).await?.1),
            None => None,
        };
        let response_ref = match &draft.response {
            Some(value) => Some(self.store_payload(value).await?.1),
            None => None,
        };
        let token_usage_json = draft
            .token_usage
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO calls (call_id, state_id, call_type, provider, status, latency_ms,
                               request_ref, response_ref, token_usage_json, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(call_id.to_string())
        .bind(state_id.to_string())
        .bind(draft.call_type.as_str())
        .bind(&draft.provider)
        .bind(draft.status.as_str())
        .bind(draft.latency_ms)
        .bind(&request_ref)
        .bind(&response_ref)
        .bind(
            token_usage_json
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Call {
            call_id,
            state_id,
            call_type: draft.call_type,
            provider: draft.provider,
            status: draft.status,
            latency_ms: draft.latency_ms,
            request_ref,
            response_ref,
            token_usage_json,
            recorded_at: now,
        })
    }

    async fn create_checkpoint(
        &self,
        run_id: RunId,
        token_id: TokenId,
        node_id: NodeId,
        sequence_number: i64,
        aggregation_state: Option<&Value>,
    ) -> Result<Checkpoint, EngineError> {
        let checkpoint_id = CheckpointId::new();
        let now = Utc::now();
        let state_json = aggregation_state.map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (checkpoint_id, run_id, token_id, node_id,
                                     sequence_number, aggregation_state_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(checkpoint_id.to_string())
        .bind(run_id.to_string())
        .bind(token_id.to_string())
        .bind(node_id.to_string())
        .bind(sequence_number)
        .bind(&state_json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Checkpoint {
            checkpoint_id,
            run_id,
            token_id,
            node_id,
            sequence_number,
            aggregation_state_json: aggregation_state.cloned(),
            created_at: now,
        })
    }

    async fn delete_checkpoints(&self, run_id: RunId) -> Result<u64, EngineError> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE run_id = ?")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn fail_open_states(&self, run_id: RunId, error_tag: &str) -> Result<u64, EngineError> {
        let error_json = serde_json::json!({ "error": error_tag, "cancelled": true });
        let result = sqlx::query(
            r#"
            UPDATE node_states
            SET status = 'failed', error_json = ?, completed_at = ?
            WHERE status = 'open'
              AND token_id IN (
                  SELECT t.token_id FROM tokens t
                  JOIN rows r ON r.row_id = t.row_id
                  WHERE r.run_id = ?
              )
            "#,
        )
        .bind(serde_json::to_string(&error_json)?)
        .bind(Utc::now().to_rfc3339())
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn complete_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        grade: Option<ReproducibilityGrade>,
    ) -> Result<Run, EngineError> {
        sqlx::query(
            r#"
            UPDATE runs
            SET status = ?,
                reproducibility_grade = COALESCE(?, reproducibility_grade),
                completed_at = ?
            WHERE run_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(grade.map(|g| g.as_str()))
        .bind(Utc::now().to_rfc3339())
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.fetch_run(run_id).await
    }

    async fn finalize_run(&self, run_id: RunId, status: RunStatus) -> Result<Run, EngineError> {
        let grade = if status == RunStatus::Completed {
            let determinism_rows: Vec<String> =
                sqlx::query_scalar("SELECT determinism FROM nodes WHERE run_id = ?")
                    .bind(run_id.to_string())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err)?;

            let determinisms = determinism_rows
                .iter()
                .map(|raw| {
                    elspeth_domain::entities::Determinism::parse(raw).ok_or_else(|| {
                        EngineError::database_error(format!(
                            "corrupt determinism column '{}'",
                            raw
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Some(reproducibility::grade_from_determinism(determinisms))
        } else {
            None
        };

        self.complete_run(run_id, status, grade).await
    }

    async fn update_grade(
        &self,
        run_id: RunId,
        grade: ReproducibilityGrade,
    ) -> Result<(), EngineError> {
        sqlx::query("UPDATE runs SET reproducibility_grade = ? WHERE run_id = ?")
            .bind(grade.as_str())
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
