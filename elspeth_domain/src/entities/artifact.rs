// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact Entity
//!
//! A record of output produced by a sink write. `content_hash` and
//! `size_bytes` are required; an artifact without them cannot be admitted,
//! because they are what remains verifiable after the payload itself is
//! purged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::value_objects::ids::{ArtifactId, NodeId, RunId, StateId};

/// Kind of sink destination the artifact describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    File,
    Database,
    Webhook,
}

impl ArtifactType {
    /// Stable string form used in the Landscape.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::File => "file",
            ArtifactType::Database => "database",
            ArtifactType::Webhook => "webhook",
        }
    }

    /// Parses the Landscape string form.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "file" => Ok(ArtifactType::File),
            "database" => Ok(ArtifactType::Database),
            "webhook" => Ok(ArtifactType::Webhook),
            other => Err(EngineError::serialization(format!(
                "unknown artifact type '{}'",
                other
            ))),
        }
    }
}

/// The artifact record as persisted in the Landscape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: ArtifactId,
    pub run_id: RunId,
    pub sink_node_id: NodeId,
    /// The node-state the write was recorded under.
    pub state_id: StateId,
    pub artifact_type: ArtifactType,
    pub path_or_uri: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub metadata_json: Option<Value>,
    pub created_at: DateTime<Utc>,
}
