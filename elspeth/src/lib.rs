// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Elspeth
//!
//! An auditable pipeline orchestration engine. Every decision made about
//! every input row (inputs, outputs, routing, retries, external calls,
//! artifacts) is recorded in a relational audit store (the *Landscape*)
//! that is itself the defensible record of execution. The audit store is
//! write-first and never consulted to drive routing.
//!
//! ## Architecture Overview
//!
//! The engine follows the same layered shape as the rest of our systems:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Presentation Layer                         │
//! │  (CLI commands: run, resume, purge, explain)                │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Orchestrator, RowProcessor, Checkpoint/Recovery,          │
//! │   Retention, Use Cases)                                     │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (Audit entities, typed IDs, plugin contracts, canonical    │
//! │   hashing, grading: the elspeth-domain crate)              │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (SQLite Landscape, payload store, executors, telemetry,    │
//! │   built-in plugins, configuration)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Concepts
//!
//! ### Rows and tokens
//! A **row** is the unit of identity: one per source row, hashed and
//! recorded at ingestion. A **token** is the unit of flow: an instance of
//! a row traveling the graph, able to fork and coalesce. Terminal token
//! states are *derived* from the relational evidence, never stored.
//!
//! ### Executors
//! Every plugin invocation (transform, gate, aggregation accept/flush,
//! sink write) is wrapped by an executor that records a node-state
//! around it: input hash before, output hash or structured error after.
//! Retry re-enters the executor, so each attempt is its own audit record.
//!
//! ### Landscape-first ordering
//! For every externally visible effect (telemetry, checkpoints,
//! artifacts) the corresponding Landscape write commits first. A failed
//! audit write suppresses the effect; a failed effect never retracts the
//! audit.
//!
//! ### Reproducibility
//! Nodes declare their determinism (no default). At finalization the run
//! is graded FULL_REPRODUCIBLE or REPLAY_REPRODUCIBLE; retention purges
//! degrade replayable runs to ATTRIBUTABLE_ONLY while every hash remains.
//!
//! ## Quick Start
//!
//! ```bash
//! elspeth run pipeline.toml
//! elspeth explain pipeline.toml <run_id> <row_id>
//! elspeth resume <run_id> --config pipeline.toml
//! elspeth purge pipeline.toml --retention-days 90 --dry-run
//! ```

pub mod application;
pub mod infrastructure;
pub mod presentation;

// Re-export domain types for convenient access
pub use elspeth_domain::{
    Determinism, EngineError, NodeType, ReproducibilityGrade, RowOutcome, RunStatus,
    TerminalState, TokenInfo,
};

// Re-export the pieces integration tests and embedders wire directly.
pub use application::services::{Orchestrator, RecoveryManager, RetentionService, RunReport};
pub use infrastructure::repositories::SqliteLandscape;
pub use infrastructure::services::{FsPayloadStore, InMemoryPayloadStore};
