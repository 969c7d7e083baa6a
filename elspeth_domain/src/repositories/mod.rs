// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Ports
//!
//! Async traits the infrastructure layer implements: the audit store
//! (write and read sides), the payload store, and the shared rate limit.

pub mod landscape;
pub mod payload_store;
pub mod rate_limit;

pub use landscape::{ExpiredPayloadRef, LandscapeInspector, LandscapeRecorder};
pub use payload_store::PayloadStore;
pub use rate_limit::RateLimit;
