// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Elspeth Domain
//!
//! The domain layer of the Elspeth auditable pipeline engine: the business
//! rules of audited execution, independent of databases, file systems, and
//! runtimes. It implements Domain-Driven Design patterns and carries no
//! infrastructure dependencies; persistence and I/O live behind the ports
//! in [`repositories`].
//!
//! ## The model in one paragraph
//!
//! A **run** executes a registered graph of **nodes** joined by **edges**.
//! Each source **row** (the unit of identity) flows as one or more
//! **tokens** (the unit of flow) that may fork and coalesce. Every attempt
//! of a token at a node is a **node-state** carrying canonical input and
//! output hashes; gates add **routing events** bound to registered edges,
//! aggregations consume tokens into **batches**, sinks produce
//! **artifacts**, and external calls are recorded per state. Terminal
//! token states are derived from these relations, never stored.
//!
//! ## Module Structure
//!
//! - [`entities`]: the relational audit model (runs, nodes, edges, rows,
//!   tokens, node-states, batches, calls, artifacts, checkpoints) and the
//!   derived lineage read model.
//! - [`value_objects`]: typed ULID identifiers, routing decisions,
//!   in-flight tokens, row outcomes, the closed error-reason vocabulary.
//! - [`services`]: canonical hashing (RFC 8785 + SHA-256), schema
//!   compatibility, reproducibility grading, plugin contracts.
//! - [`repositories`]: ports for the audit store, payload store, and
//!   rate limit.
//! - [`events`]: immutable telemetry events.
//! - [`error`]: the `EngineError` hierarchy.

pub mod entities;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Re-export the types used at almost every call site.
pub use entities::{
    Artifact, ArtifactType, Batch, BatchMember, BatchStatus, Call, CallDraft, CallStatus,
    CallType, Checkpoint, Determinism, Edge, EdgeKey, Node, NodeRegistration, NodeState,
    NodeStateStatus, NodeType, ParentKind, ReproducibilityGrade, ResumePoint, RoutingEvent, Row,
    RowLineage, Run, RunStatus, TerminalState, Token, TokenLineage, TokenParent, TokenUsage,
};
pub use error::EngineError;
pub use events::{Granularity, PipelineEvent, RunPhase};
pub use repositories::{
    ExpiredPayloadRef, LandscapeInspector, LandscapeRecorder, PayloadStore, RateLimit,
};
pub use services::{
    canonical_hash, AcceptResult, AggregationPlugin, GatePlugin, GateResult, PluginContext,
    PluginSchema, SinkPlugin, SinkReceipt, SourcePlugin, StepPlugin, TransformOutcome,
    TransformPlugin, TransformResult, CANONICAL_VERSION,
};
pub use value_objects::{
    ArtifactId, BatchId, CallId, CheckpointId, EdgeId, NodeId, RoutingEventId, RowId, RowOutcome,
    RowResult, RoutingAction, RoutingKind, RoutingMode, RunId, RunSummary, StateId, TokenId,
    TokenInfo, TransformErrorReason,
};
