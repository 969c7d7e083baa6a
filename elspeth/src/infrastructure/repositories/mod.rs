// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Landscape Persistence
//!
//! SQLite implementation of the audit store: schema management, the
//! recorder (write side), and the inspector (read side).

pub mod mappers;
pub mod schema;
pub mod sqlite_inspector;
pub mod sqlite_landscape;

pub use sqlite_landscape::SqliteLandscape;
