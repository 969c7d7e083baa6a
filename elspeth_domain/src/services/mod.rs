// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Services
//!
//! Stateless domain logic: canonical hashing, schema compatibility rules,
//! reproducibility grading, and the plugin contracts.

pub mod canonical;
pub mod plugin;
pub mod reproducibility;
pub mod schema_compat;

pub use canonical::{canonical_hash, canonicalize, hash_bytes, CANONICAL_VERSION};
pub use plugin::{
    AcceptResult, AggregationPlugin, GatePlugin, GateResult, PluginContext, SinkPlugin,
    SinkReceipt, SourcePlugin, StepPlugin, TransformOutcome, TransformPlugin, TransformResult,
};
pub use reproducibility::{grade_after_purge, grade_from_determinism};
pub use schema_compat::{validate_chain, PluginSchema};
