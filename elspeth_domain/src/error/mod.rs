// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Error types for the engine domain.

pub mod engine_error;

pub use engine_error::EngineError;
