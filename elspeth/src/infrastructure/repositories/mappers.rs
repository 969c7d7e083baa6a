// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Row mappers between sqlx SQLite rows and audit entities.
//!
//! Everything in the Landscape stores as TEXT (ULIDs, RFC 3339 timestamps,
//! JSON) or INTEGER; these helpers centralize the parsing so the recorder
//! and inspector stay query-shaped.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row as _;

use elspeth_domain::entities::{
    Artifact, ArtifactType, Batch, BatchStatus, Call, CallStatus, CallType, Checkpoint,
    Determinism, Edge, Node, NodeState, NodeStateStatus, NodeType, ReproducibilityGrade,
    RoutingEvent, Row, Run, RunStatus, Token,
};
use elspeth_domain::value_objects::generic_id::{GenericId, IdCategory};
use elspeth_domain::value_objects::RoutingMode;
use elspeth_domain::EngineError;

/// Parses a stored ULID column into a typed identifier.
pub(crate) fn parse_id<T: IdCategory>(raw: &str) -> Result<GenericId<T>, EngineError> {
    GenericId::from_string(raw)
        .map_err(|e| EngineError::database_error(format!("corrupt identifier column: {}", e)))
}

/// Parses a stored RFC 3339 timestamp column.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::database_error(format!("corrupt timestamp column: {}", e)))
}

/// Parses an optional RFC 3339 timestamp column.
pub(crate) fn parse_timestamp_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>, EngineError> {
    raw.map(|s| parse_timestamp(&s)).transpose()
}

/// Parses a stored JSON column.
pub(crate) fn parse_json(raw: &str) -> Result<Value, EngineError> {
    serde_json::from_str(raw)
        .map_err(|e| EngineError::database_error(format!("corrupt JSON column: {}", e)))
}

/// Parses an optional JSON column.
pub(crate) fn parse_json_opt(raw: Option<String>) -> Result<Option<Value>, EngineError> {
    raw.map(|s| parse_json(&s)).transpose()
}

pub(crate) fn run_from_row(row: &SqliteRow) -> Result<Run, EngineError> {
    let grade: Option<String> = row.get("reproducibility_grade");
    Ok(Run {
        run_id: parse_id(row.get::<String, _>("run_id").as_str())?,
        status: RunStatus::parse(row.get::<String, _>("status").as_str())?,
        config_hash: row.get("config_hash"),
        settings_json: parse_json(row.get::<String, _>("settings_json").as_str())?,
        canonical_version: row.get("canonical_version"),
        reproducibility_grade: grade
            .map(|g| ReproducibilityGrade::parse(&g))
            .transpose()?,
        started_at: parse_timestamp(row.get::<String, _>("started_at").as_str())?,
        completed_at: parse_timestamp_opt(row.get("completed_at"))?,
    })
}

pub(crate) fn node_from_row(row: &SqliteRow) -> Result<Node, EngineError> {
    let determinism_raw: String = row.get("determinism");
    let determinism = Determinism::parse(&determinism_raw).ok_or_else(|| {
        EngineError::database_error(format!("corrupt determinism column '{}'", determinism_raw))
    })?;
    Ok(Node {
        node_id: parse_id(row.get::<String, _>("node_id").as_str())?,
        run_id: parse_id(row.get::<String, _>("run_id").as_str())?,
        plugin_name: row.get("plugin_name"),
        plugin_version: row.get("plugin_version"),
        node_type: NodeType::parse(row.get::<String, _>("node_type").as_str())?,
        determinism,
        config_hash: row.get("config_hash"),
        config_json: parse_json(row.get::<String, _>("config_json").as_str())?,
        sequence_in_pipeline: row.get("sequence_in_pipeline"),
        schema_hash: row.get("schema_hash"),
        registered_at: parse_timestamp(row.get::<String, _>("registered_at").as_str())?,
    })
}

pub(crate) fn edge_from_row(row: &SqliteRow) -> Result<Edge, EngineError> {
    Ok(Edge {
        edge_id: parse_id(row.get::<String, _>("edge_id").as_str())?,
        run_id: parse_id(row.get::<String, _>("run_id").as_str())?,
        from_node_id: parse_id(row.get::<String, _>("from_node_id").as_str())?,
        to_node_id: parse_id(row.get::<String, _>("to_node_id").as_str())?,
        label: row.get("label"),
        default_mode: RoutingMode::parse(row.get::<String, _>("default_mode").as_str())?,
        created_at: parse_timestamp(row.get::<String, _>("created_at").as_str())?,
    })
}

pub(crate) fn source_row_from_row(row: &SqliteRow) -> Result<Row, EngineError> {
    Ok(Row {
        row_id: parse_id(row.get::<String, _>("row_id").as_str())?,
        run_id: parse_id(row.get::<String, _>("run_id").as_str())?,
        source_node_id: parse_id(row.get::<String, _>("source_node_id").as_str())?,
        row_index: row.get("row_index"),
        source_data_hash: row.get("source_data_hash"),
        source_data_ref: row.get("source_data_ref"),
        created_at: parse_timestamp(row.get::<String, _>("created_at").as_str())?,
    })
}

pub(crate) fn token_from_row(row: &SqliteRow) -> Result<Token, EngineError> {
    Ok(Token {
        token_id: parse_id(row.get::<String, _>("token_id").as_str())?,
        row_id: parse_id(row.get::<String, _>("row_id").as_str())?,
        branch_name: row.get("branch_name"),
        created_at: parse_timestamp(row.get::<String, _>("created_at").as_str())?,
    })
}

pub(crate) fn node_state_from_row(row: &SqliteRow) -> Result<NodeState, EngineError> {
    Ok(NodeState {
        state_id: parse_id(row.get::<String, _>("state_id").as_str())?,
        token_id: parse_id(row.get::<String, _>("token_id").as_str())?,
        node_id: parse_id(row.get::<String, _>("node_id").as_str())?,
        attempt: row.get("attempt"),
        step_index: row.get("step_index"),
        status: NodeStateStatus::parse(row.get::<String, _>("status").as_str())?,
        input_hash: row.get("input_hash"),
        output_hash: row.get("output_hash"),
        input_ref: row.get("input_ref"),
        output_ref: row.get("output_ref"),
        duration_ms: row.get("duration_ms"),
        error_json: parse_json_opt(row.get("error_json"))?,
        started_at: parse_timestamp(row.get::<String, _>("started_at").as_str())?,
        completed_at: parse_timestamp_opt(row.get("completed_at"))?,
    })
}

pub(crate) fn routing_event_from_row(row: &SqliteRow) -> Result<RoutingEvent, EngineError> {
    Ok(RoutingEvent {
        event_id: parse_id(row.get::<String, _>("event_id").as_str())?,
        state_id: parse_id(row.get::<String, _>("state_id").as_str())?,
        edge_id: parse_id(row.get::<String, _>("edge_id").as_str())?,
        mode: RoutingMode::parse(row.get::<String, _>("mode").as_str())?,
        reason_json: parse_json(row.get::<String, _>("reason_json").as_str())?,
        recorded_at: parse_timestamp(row.get::<String, _>("recorded_at").as_str())?,
    })
}

pub(crate) fn batch_from_row(row: &SqliteRow) -> Result<Batch, EngineError> {
    Ok(Batch {
        batch_id: parse_id(row.get::<String, _>("batch_id").as_str())?,
        run_id: parse_id(row.get::<String, _>("run_id").as_str())?,
        aggregation_node_id: parse_id(row.get::<String, _>("aggregation_node_id").as_str())?,
        status: BatchStatus::parse(row.get::<String, _>("status").as_str())?,
        trigger_reason: row.get("trigger_reason"),
        created_at: parse_timestamp(row.get::<String, _>("created_at").as_str())?,
        flushed_at: parse_timestamp_opt(row.get("flushed_at"))?,
    })
}

pub(crate) fn call_from_row(row: &SqliteRow) -> Result<Call, EngineError> {
    Ok(Call {
        call_id: parse_id(row.get::<String, _>("call_id").as_str())?,
        state_id: parse_id(row.get::<String, _>("state_id").as_str())?,
        call_type: CallType::parse(row.get::<String, _>("call_type").as_str())?,
        provider: row.get("provider"),
        status: CallStatus::parse(row.get::<String, _>("status").as_str())?,
        latency_ms: row.get("latency_ms"),
        request_ref: row.get("request_ref"),
        response_ref: row.get("response_ref"),
        token_usage_json: parse_json_opt(row.get("token_usage_json"))?,
        recorded_at: parse_timestamp(row.get::<String, _>("recorded_at").as_str())?,
    })
}

pub(crate) fn artifact_from_row(row: &SqliteRow) -> Result<Artifact, EngineError> {
    Ok(Artifact {
        artifact_id: parse_id(row.get::<String, _>("artifact_id").as_str())?,
        run_id: parse_id(row.get::<String, _>("run_id").as_str())?,
        sink_node_id: parse_id(row.get::<String, _>("sink_node_id").as_str())?,
        state_id: parse_id(row.get::<String, _>("state_id").as_str())?,
        artifact_type: ArtifactType::parse(row.get::<String, _>("artifact_type").as_str())?,
        path_or_uri: row.get("path_or_uri"),
        content_hash: row.get("content_hash"),
        size_bytes: row.get("size_bytes"),
        metadata_json: parse_json_opt(row.get("metadata_json"))?,
        created_at: parse_timestamp(row.get::<String, _>("created_at").as_str())?,
    })
}

pub(crate) fn checkpoint_from_row(row: &SqliteRow) -> Result<Checkpoint, EngineError> {
    Ok(Checkpoint {
        checkpoint_id: parse_id(row.get::<String, _>("checkpoint_id").as_str())?,
        run_id: parse_id(row.get::<String, _>("run_id").as_str())?,
        token_id: parse_id(row.get::<String, _>("token_id").as_str())?,
        node_id: parse_id(row.get::<String, _>("node_id").as_str())?,
        sequence_number: row.get("sequence_number"),
        aggregation_state_json: parse_json_opt(row.get("aggregation_state_json"))?,
        created_at: parse_timestamp(row.get::<String, _>("created_at").as_str())?,
    })
}
