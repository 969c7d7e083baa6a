// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Concrete implementations behind the domain ports: SQLite Landscape,
//! filesystem payload store, executors and retry, telemetry, built-in
//! plugins, and configuration.

pub mod config;
pub mod plugins;
pub mod repositories;
pub mod runtime;
pub mod services;
pub mod telemetry;
