// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Payload Store Implementations
//!
//! Content-addressed blob storage keyed by canonical hash.
//!
//! The filesystem backend fans blobs out under two levels of hash-prefix
//! directories (`ab/cd/abcd...`) so directories stay small at audit
//! volumes. Store is idempotent: existing content is left in place and the
//! same hash returned. The in-memory backend backs tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use elspeth_domain::repositories::PayloadStore;
use elspeth_domain::services::canonical;
use elspeth_domain::EngineError;

/// Filesystem-backed payload store with hash-prefix directory fanout.
pub struct FsPayloadStore {
    base_path: PathBuf,
}

impl FsPayloadStore {
    /// Creates a store rooted at `base_path`; the directory is created on
    /// first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        FsPayloadStore {
            base_path: base_path.into(),
        }
    }

    fn blob_path(&self, hash: &str) -> Result<PathBuf, EngineError> {
        if hash.len() < 4 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EngineError::payload_store_error(format!(
                "malformed payload hash '{}'",
                hash
            )));
        }
        Ok(self
            .base_path
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(hash))
    }
}

#[async_trait]
impl PayloadStore for FsPayloadStore {
    async fn store(&self, bytes: &[u8]) -> Result<String, EngineError> {
        let hash = canonical::hash_bytes(bytes);
        let path = self.blob_path(&hash)?;

        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| EngineError::payload_store_error(e.to_string()))?
        {
            // Content-addressed: same hash, same bytes. Nothing to do.
            return Ok(hash);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::payload_store_error(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EngineError::payload_store_error(e.to_string()))?;

        debug!(hash = %hash, bytes = bytes.len(), "payload stored");
        Ok(hash)
    }

    async fn retrieve(&self, hash: &str) -> Result<Option<Vec<u8>>, EngineError> {
        let path = self.blob_path(hash)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::payload_store_error(e.to_string())),
        }
    }

    async fn exists(&self, hash: &str) -> Result<bool, EngineError> {
        let path = self.blob_path(hash)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| EngineError::payload_store_error(e.to_string()))
    }

    async fn delete(&self, hash: &str) -> Result<bool, EngineError> {
        let path = self.blob_path(hash)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(EngineError::payload_store_error(e.to_string())),
        }
    }
}

/// In-memory payload store for tests.
#[derive(Default)]
pub struct InMemoryPayloadStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl PayloadStore for InMemoryPayloadStore {
    async fn store(&self, bytes: &[u8]) -> Result<String, EngineError> {
        let hash = canonical::hash_bytes(bytes);
        self.blobs
            .write()
            .entry(hash.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(hash)
    }

    async fn retrieve(&self, hash: &str) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.blobs.read().get(hash).cloned())
    }

    async fn exists(&self, hash: &str) -> Result<bool, EngineError> {
        Ok(self.blobs.read().contains_key(hash))
    }

    async fn delete(&self, hash: &str) -> Result<bool, EngineError> {
        Ok(self.blobs.write().remove(hash).is_some())
    }
}

/// Resolves `Path`-based construction for callers configured with strings.
impl From<&Path> for FsPayloadStore {
    fn from(path: &Path) -> Self {
        FsPayloadStore::new(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPayloadStore::new(dir.path());

        let hash = store.store(b"{\"value\":1}").await.unwrap();
        assert!(store.exists(&hash).await.unwrap());
        assert_eq!(
            store.retrieve(&hash).await.unwrap().unwrap(),
            b"{\"value\":1}"
        );
    }

    #[tokio::test]
    async fn fs_store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPayloadStore::new(dir.path());

        let first = store.store(b"same content").await.unwrap();
        let second = store.store(b"same content").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn fs_delete_reports_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPayloadStore::new(dir.path());

        let hash = store.store(b"to delete").await.unwrap();
        assert!(store.delete(&hash).await.unwrap());
        assert!(!store.delete(&hash).await.unwrap());
        assert!(store.retrieve(&hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_hash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPayloadStore::new(dir.path());
        assert!(store.exists("../../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = InMemoryPayloadStore::new();
        let hash = store.store(b"bytes").await.unwrap();
        assert!(store.exists(&hash).await.unwrap());
        assert!(store.delete(&hash).await.unwrap());
        assert!(!store.exists(&hash).await.unwrap());
    }
}
