// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Cooperative cancellation for runs. The coordinator installs a SIGINT
//! handler; the engine checks its token at row boundaries, the only
//! points where cancellation is safe, and finalizes the run as failed
//! with every open node-state closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Default grace period for graceful shutdown (in seconds)
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Clone-able cancellation token checked at row boundaries.
#[derive(Clone)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownToken {
    /// True once shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Resolves when shutdown is requested.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Owns the shutdown state and the signal listener.
pub struct ShutdownCoordinator {
    token: ShutdownToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        ShutdownCoordinator {
            token: ShutdownToken {
                cancelled: Arc::new(AtomicBool::new(false)),
                notify: Arc::new(Notify::new()),
            },
        }
    }

    /// A token for workers to poll.
    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }

    /// Flags shutdown and wakes waiters.
    pub fn initiate_shutdown(&self) {
        self.token.cancelled.store(true, Ordering::Relaxed);
        self.token.notify.notify_waiters();
    }

    /// Spawns the SIGINT listener. Requires a tokio runtime.
    pub fn listen_for_ctrl_c(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; finishing the current row and shutting down");
                token.cancelled.store(true, Ordering::Relaxed);
                token.notify.notify_waiters();
            }
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_observes_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        assert!(!token.is_cancelled());

        coordinator.initiate_shutdown();
        assert!(token.is_cancelled());
        // Resolves immediately once cancelled.
        token.cancelled().await;
    }
}
