// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logger Setup
//!
//! Initializes the tracing subscriber for the process. The filter is the
//! CLI `--log-level` value, overridable through `RUST_LOG`. Secrets never
//! pass through logging: the engine redacts settings before they reach a
//! log line, and this module only configures the sink.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber. Call once, before any engine
/// work. Subsequent calls are ignored.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_writer(std::io::stderr)
        .try_init();
}
