// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Payload Store Port
//!
//! Content-addressed blob storage: blobs are keyed by the canonical hash
//! of their contents, so storing the same content twice is a no-op and any
//! number of Landscape rows may reference one blob. Retention purge
//! deletes blobs; the referencing hashes stay behind and become
//! "resolvable to absent".

use async_trait::async_trait;

use crate::error::EngineError;

/// Content-addressed blob store. All operations are idempotent.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Stores bytes, returning their content hash. Storing existing
    /// content returns the same hash without rewriting.
    async fn store(&self, bytes: &[u8]) -> Result<String, EngineError>;

    /// Retrieves a blob by hash, or `None` if absent (never stored, or
    /// purged).
    async fn retrieve(&self, hash: &str) -> Result<Option<Vec<u8>>, EngineError>;

    /// True if the blob is present.
    async fn exists(&self, hash: &str) -> Result<bool, EngineError>;

    /// Deletes a blob. Returns `false` when it was already absent.
    async fn delete(&self, hash: &str) -> Result<bool, EngineError>;
}
