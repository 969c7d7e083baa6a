// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain events emitted by the engine for telemetry.

pub mod pipeline_events;

pub use pipeline_events::{Granularity, PipelineEvent, RunPhase};
