// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Telemetry
//!
//! Event bus, telemetry manager, and exporters. Telemetry observes the
//! run; it never gates it. Events are published only after the
//! corresponding Landscape write committed.

pub mod event_bus;
pub mod exporters;
pub mod manager;

pub use event_bus::{EventBus, EventSubscriber};
pub use exporters::{MemoryExporter, TelemetryExporter, TracingExporter};
pub use manager::{BackpressureMode, TelemetryManager};
