// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration
//!
//! Two layers, converted once at startup: a permissive user-facing
//! [`Settings`] shape and the strict, immutable [`RuntimeConfig`] the
//! engine consumes. Unknown and unimplemented options are rejected before
//! any run begins.

pub mod runtime;
pub mod settings;

pub use runtime::{
    CheckpointConfig, CheckpointFrequency, RateLimitConfig, RuntimeConfig, TelemetryConfig,
};
pub use settings::{PipelineSettings, PluginSettings, Settings};
