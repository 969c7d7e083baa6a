// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Landscape Inspector
//!
//! The read side of the audit store: lineage assembly, terminal-state
//! derivation, resume queries, and retention scans. All queries are plain
//! SELECTs; the inspector never mutates the Landscape, and nothing read
//! here ever drives routing.
//!
//! Terminal states are derived with a fixed precedence so exactly one
//! holds per token (see `TerminalState`): failure evidence first, then
//! sink completion, then the structural relations (fork, coalesce, batch
//! membership), then routing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row as _;

use elspeth_domain::entities::{
    NodeState, NodeStateStatus, ResumePoint, Row, RowLineage, Run, RunStatus, TerminalState,
    Token, TokenLineage,
};
use elspeth_domain::repositories::{ExpiredPayloadRef, LandscapeInspector};
use elspeth_domain::value_objects::{RowId, RunId, TokenId};
use elspeth_domain::EngineError;

use super::mappers;
use super::sqlite_landscape::SqliteLandscape;

fn db_err(e: sqlx::Error) -> EngineError {
    EngineError::database_error(e.to_string())
}

impl SqliteLandscape {
    /// Latest state of a token across all nodes: highest step, then
    /// highest attempt, then most recent start.
    async fn latest_state(&self, token_id: TokenId) -> Result<Option<NodeState>, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM node_states
            WHERE token_id = ?
            ORDER BY step_index DESC, attempt DESC, started_at DESC
            LIMIT 1
            "#,
        )
        .bind(token_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(|r| mappers::node_state_from_row(&r)).transpose()
    }

    async fn has_parent_kind(&self, token_id: TokenId, kind: &str) -> Result<bool, EngineError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM token_parents WHERE parent_token_id = ? AND kind = ?",
        )
        .bind(token_id.to_string())
        .bind(kind)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl LandscapeInspector for SqliteLandscape {
    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>, EngineError> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.map(|r| mappers::run_from_row(&r)).transpose()
    }

    async fn list_runs(&self) -> Result<Vec<Run>, EngineError> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY started_at DESC")
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(mappers::run_from_row).collect()
    }

    async fn load_nodes(
        &self,
        run_id: RunId,
    ) -> Result<Vec<elspeth_domain::entities::Node>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM nodes
            WHERE run_id = ?
            ORDER BY sequence_in_pipeline, registered_at
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;
        rows.iter().map(mappers::node_from_row).collect()
    }

    async fn load_edges(
        &self,
        run_id: RunId,
    ) -> Result<Vec<elspeth_domain::entities::Edge>, EngineError> {
        let rows = sqlx::query("SELECT * FROM edges WHERE run_id = ? ORDER BY created_at")
            .bind(run_id.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(mappers::edge_from_row).collect()
    }

    async fn explain_row(&self, run_id: RunId, row_id: RowId) -> Result<RowLineage, EngineError> {
        let row_record = sqlx::query("SELECT * FROM rows WHERE row_id = ? AND run_id = ?")
            .bind(row_id.to_string())
            .bind(run_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?
            .ok_or_else(|| EngineError::NotFound(format!("row {} in run {}", row_id, run_id)))?;
        let row = mappers::source_row_from_row(&row_record)?;

        let token_rows = sqlx::query("SELECT * FROM tokens WHERE row_id = ? ORDER BY created_at")
            .bind(row_id.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

        let store = self.payload_store();
        let mut payload_available = true;
        let mut tokens = Vec::with_capacity(token_rows.len());

        for token_row in &token_rows {
            let token = mappers::token_from_row(token_row)?;

            let state_rows = sqlx::query(
                r#"
                SELECT * FROM node_states
                WHERE token_id = ?
                ORDER BY step_index, attempt
                "#,
            )
            .bind(token.token_id.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
            let states: Vec<NodeState> = state_rows
                .iter()
                .map(mappers::node_state_from_row)
                .collect::<Result<_, _>>()?;

            for state in &states {
                for payload_ref in [&state.input_ref, &state.output_ref].into_iter().flatten() {
                    if !store.exists(payload_ref).await? {
                        payload_available = false;
                    }
                }
            }

            let event_rows = sqlx::query(
                r#"
                SELECT re.* FROM routing_events re
                JOIN node_states ns ON ns.state_id = re.state_id
                WHERE ns.token_id = ?
                ORDER BY re.recorded_at
                "#,
            )
            .bind(token.token_id.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
            let routing_events = event_rows
                .iter()
                .map(mappers::routing_event_from_row)
                .collect::<Result<_, _>>()?;

            let terminal_state = self.derive_terminal_state(token.token_id).await?;

            tokens.push(TokenLineage {
                token_id: token.token_id,
                branch_name: token.branch_name,
                terminal_state,
                states,
                routing_events,
            });
        }

        let source_data = match &row.source_data_ref {
            Some(payload_ref) => match store.retrieve(payload_ref).await? {
                Some(bytes) => Some(serde_json::from_slice(&bytes).map_err(|e| {
                    EngineError::serialization(format!("stored payload is not JSON: {}", e))
                })?),
                None => {
                    payload_available = false;
                    None
                }
            },
            None => {
                payload_available = false;
                None
            }
        };

        let artifact_rows = sqlx::query(
            r#"
            SELECT a.* FROM artifacts a
            JOIN node_states ns ON ns.state_id = a.state_id
            JOIN tokens t ON t.token_id = ns.token_id
            WHERE t.row_id = ?
            ORDER BY a.created_at
            "#,
        )
        .bind(row_id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;
        let artifacts = artifact_rows
            .iter()
            .map(mappers::artifact_from_row)
            .collect::<Result<_, _>>()?;

        Ok(RowLineage {
            run_id,
            row_id,
            row_index: row.row_index,
            source_data_hash: row.source_data_hash,
            source_data,
            payload_available,
            tokens,
            artifacts,
        })
    }

    async fn derive_terminal_state(
        &self,
        token_id: TokenId,
    ) -> Result<TerminalState, EngineError> {
        // Failure evidence first: a token whose latest state failed is
        // FAILED (or QUARANTINED) no matter what else it did earlier.
        if let Some(latest) = self.latest_state(token_id).await? {
            if latest.status == NodeStateStatus::Failed {
                return Ok(if latest.is_quarantined() {
                    TerminalState::Quarantined
                } else {
                    TerminalState::Failed
                });
            }
        }

        // Sink completion: latest attempt at some sink node completed.
        let sink_completed: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM node_states ns
            JOIN nodes n ON n.node_id = ns.node_id
            WHERE ns.token_id = ?
              AND n.node_type = 'sink'
              AND ns.status = 'completed'
              AND ns.attempt = (
                  SELECT MAX(ns2.attempt) FROM node_states ns2
                  WHERE ns2.token_id = ns.token_id AND ns2.node_id = ns.node_id
              )
            "#,
        )
        .bind(token_id.to_string())
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        if sink_completed > 0 {
            return Ok(TerminalState::Completed);
        }

        if self.has_parent_kind(token_id, "fork").await? {
            return Ok(TerminalState::Forked);
        }
        if self.has_parent_kind(token_id, "coalesce").await? {
            return Ok(TerminalState::Coalesced);
        }

        let in_batch: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM batch_members WHERE token_id = ?")
                .bind(token_id.to_string())
                .fetch_one(self.pool())
                .await
                .map_err(db_err)?;
        if in_batch > 0 {
            return Ok(TerminalState::ConsumedInBatch);
        }

        let routed: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM routing_events re
            JOIN node_states ns ON ns.state_id = re.state_id
            WHERE ns.token_id = ?
            "#,
        )
        .bind(token_id.to_string())
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        if routed > 0 {
            return Ok(TerminalState::Routed);
        }

        Ok(TerminalState::InFlight)
    }

    async fn can_resume(&self, run_id: RunId) -> Result<bool, EngineError> {
        let run = match self.get_run(run_id).await? {
            Some(run) => run,
            None => return Ok(false),
        };
        if run.status != RunStatus::Failed {
            return Ok(false);
        }

        let checkpoints: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints WHERE run_id = ?")
                .bind(run_id.to_string())
                .fetch_one(self.pool())
                .await
                .map_err(db_err)?;
        Ok(checkpoints > 0)
    }

    async fn resume_point(&self, run_id: RunId) -> Result<Option<ResumePoint>, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM checkpoints
            WHERE run_id = ?
            ORDER BY sequence_number DESC
            LIMIT 1
            "#,
        )
        .bind(run_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        let checkpoint = match row {
            Some(r) => mappers::checkpoint_from_row(&r)?,
            None => return Ok(None),
        };

        Ok(Some(ResumePoint {
            token_id: checkpoint.token_id,
            node_id: checkpoint.node_id,
            sequence_number: checkpoint.sequence_number,
            aggregation_state: checkpoint.aggregation_state_json.clone(),
            checkpoint,
        }))
    }

    async fn list_rows(&self, run_id: RunId) -> Result<Vec<Row>, EngineError> {
        let rows = sqlx::query("SELECT * FROM rows WHERE run_id = ? ORDER BY row_index")
            .bind(run_id.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(mappers::source_row_from_row).collect()
    }

    async fn unprocessed_rows(&self, run_id: RunId) -> Result<Vec<Row>, EngineError> {
        // A row is processed once the latest attempt of one of its tokens
        // at a sink node completed.
        let rows = sqlx::query(
            r#"
            SELECT r.* FROM rows r
            WHERE r.run_id = ?
              AND NOT EXISTS (
                  SELECT 1 FROM node_states ns
                  JOIN tokens t ON t.token_id = ns.token_id
                  JOIN nodes n ON n.node_id = ns.node_id
                  WHERE t.row_id = r.row_id
                    AND n.node_type = 'sink'
                    AND ns.status = 'completed'
                    AND ns.attempt = (
                        SELECT MAX(ns2.attempt) FROM node_states ns2
                        WHERE ns2.token_id = ns.token_id AND ns2.node_id = ns.node_id
                    )
              )
            ORDER BY r.row_index
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.iter().map(mappers::source_row_from_row).collect()
    }

    async fn row_token(&self, row_id: RowId) -> Result<Token, EngineError> {
        let row = sqlx::query(
            "SELECT * FROM tokens WHERE row_id = ? ORDER BY created_at, token_id LIMIT 1",
        )
        .bind(row_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| EngineError::NotFound(format!("token for row {}", row_id)))?;
        mappers::token_from_row(&row)
    }

    async fn find_expired_payload_refs(
        &self,
        completed_before: DateTime<Utc>,
    ) -> Result<Vec<ExpiredPayloadRef>, EngineError> {
        let cutoff = completed_before.to_rfc3339();

        // Union of every payload-ref column, each joined back to its
        // completed, expired run. Landscape rows themselves are never
        // touched by retention.
        let rows = sqlx::query(
            r#"
            SELECT r.run_id AS run_id, r.source_data_ref AS payload_ref
            FROM rows r
            JOIN runs ru ON ru.run_id = r.run_id
            WHERE ru.status = 'completed' AND ru.completed_at < ?
              AND r.source_data_ref IS NOT NULL
            UNION
            SELECT ro.run_id, ns.input_ref
            FROM node_states ns
            JOIN tokens t ON t.token_id = ns.token_id
            JOIN rows ro ON ro.row_id = t.row_id
            JOIN runs ru ON ru.run_id = ro.run_id
            WHERE ru.status = 'completed' AND ru.completed_at < ?
              AND ns.input_ref IS NOT NULL
            UNION
            SELECT ro.run_id, ns.output_ref
            FROM node_states ns
            JOIN tokens t ON t.token_id = ns.token_id
            JOIN rows ro ON ro.row_id = t.row_id
            JOIN runs ru ON ru.run_id = ro.run_id
            WHERE ru.status = 'completed' AND ru.completed_at < ?
              AND ns.output_ref IS NOT NULL
            UNION
            SELECT ro.run_id, c.request_ref
            FROM calls c
            JOIN node_states ns ON ns.state_id = c.state_id
            JOIN tokens t ON t.token_id = ns.token_id
            JOIN rows ro ON ro.row_id = t.row_id
            JOIN runs ru ON ru.run_id = ro.run_id
            WHERE ru.status = 'completed' AND ru.completed_at < ?
              AND c.request_ref IS NOT NULL
            UNION
            SELECT ro.run_id, c.response_ref
            FROM calls c
            JOIN node_states ns ON ns.state_id = c.state_id
            JOIN tokens t ON t.token_id = ns.token_id
            JOIN rows ro ON ro.row_id = t.row_id
            JOIN runs ru ON ru.run_id = ro.run_id
            WHERE ru.status = 'completed' AND ru.completed_at < ?
              AND c.response_ref IS NOT NULL
            "#,
        )
        .bind(&cutoff)
        .bind(&cutoff)
        .bind(&cutoff)
        .bind(&cutoff)
        .bind(&cutoff)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(ExpiredPayloadRef {
                    run_id: mappers::parse_id(row.get::<String, _>("run_id").as_str())?,
                    payload_hash: row.get("payload_ref"),
                })
            })
            .collect()
    }
}
