// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shared Rate Limiter
//!
//! Token-bucket rate limiting keyed by external service name, with
//! per-second and per-minute budgets. Bucket state optionally persists to
//! a JSON file so cooperating processes drain one shared budget instead of
//! each minting their own.
//!
//! Acquisition is non-blocking: plugins ask for a permit and back off
//! themselves. The engine core never waits on this.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use elspeth_domain::repositories::RateLimit;

/// Per-service budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServiceLimits {
    pub requests_per_second: f64,
    pub requests_per_minute: f64,
}

/// A single token bucket: capacity, current fill, and last refill instant
/// (seconds since epoch, so persisted state survives process restarts).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill_epoch_secs: f64,
}

impl Bucket {
    fn new(capacity: f64, refill_per_second: f64, now: f64) -> Self {
        Bucket {
            tokens: capacity,
            capacity,
            refill_per_second,
            last_refill_epoch_secs: now,
        }
    }

    fn refill(&mut self, now: f64) {
        let elapsed = (now - self.last_refill_epoch_secs).max(0.0);
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill_epoch_secs = now;
    }

    fn try_take(&mut self, now: f64) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedBuckets {
    /// Two buckets per service: the rps bucket and the rpm bucket.
    services: HashMap<String, (Bucket, Bucket)>,
}

/// Token-bucket registry shared by every plugin context of a run.
pub struct TokenBucketRateLimiter {
    enabled: bool,
    default_limits: ServiceLimits,
    overrides: HashMap<String, ServiceLimits>,
    persistence_path: Option<PathBuf>,
    state: Mutex<PersistedBuckets>,
}

impl TokenBucketRateLimiter {
    /// Builds a limiter; when `persistence_path` points at an existing
    /// state file, bucket fill levels are restored from it.
    pub fn new(
        enabled: bool,
        default_limits: ServiceLimits,
        overrides: HashMap<String, ServiceLimits>,
        persistence_path: Option<PathBuf>,
    ) -> Self {
        let state = persistence_path
            .as_ref()
            .and_then(|path| std::fs::read(path).ok())
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();

        TokenBucketRateLimiter {
            enabled,
            default_limits,
            overrides,
            persistence_path,
            state: Mutex::new(state),
        }
    }

    /// A disabled limiter that always grants.
    pub fn disabled() -> Self {
        TokenBucketRateLimiter::new(
            false,
            ServiceLimits {
                requests_per_second: f64::MAX,
                requests_per_minute: f64::MAX,
            },
            HashMap::new(),
            None,
        )
    }

    fn limits_for(&self, service: &str) -> ServiceLimits {
        self.overrides
            .get(service)
            .copied()
            .unwrap_or(self.default_limits)
    }

    fn persist(&self, state: &PersistedBuckets) {
        if let Some(path) = &self.persistence_path {
            if let Ok(bytes) = serde_json::to_vec(state) {
                if let Err(e) = std::fs::write(path, bytes) {
                    // Persistence is best-effort; the in-process budget
                    // still holds.
                    warn!(path = %path.display(), error = %e, "failed to persist rate limiter state");
                }
            }
        }
    }

    fn now_epoch_secs() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl RateLimit for TokenBucketRateLimiter {
    fn try_acquire(&self, service: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let limits = self.limits_for(service);
        let now = Self::now_epoch_secs();
        let mut state = self.state.lock();

        let (rps_bucket, rpm_bucket) =
            state.services.entry(service.to_string()).or_insert_with(|| {
                (
                    Bucket::new(limits.requests_per_second, limits.requests_per_second, now),
                    Bucket::new(
                        limits.requests_per_minute,
                        limits.requests_per_minute / 60.0,
                        now,
                    ),
                )
            });

        // Both budgets must admit the request; probing the rps bucket
        // first and refunding on rpm rejection keeps the two consistent.
        if !rps_bucket.try_take(now) {
            return false;
        }
        if !rpm_bucket.try_take(now) {
            rps_bucket.tokens = (rps_bucket.tokens + 1.0).min(rps_bucket.capacity);
            return false;
        }

        self.persist(&state);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, rpm: f64) -> TokenBucketRateLimiter {
        TokenBucketRateLimiter::new(
            true,
            ServiceLimits {
                requests_per_second: rps,
                requests_per_minute: rpm,
            },
            HashMap::new(),
            None,
        )
    }

    #[test]
    fn grants_within_budget() {
        let limiter = limiter(10.0, 600.0);
        for _ in 0..10 {
            assert!(limiter.try_acquire("azure"));
        }
    }

    #[test]
    fn denies_when_burst_exhausted() {
        let limiter = limiter(2.0, 600.0);
        assert!(limiter.try_acquire("azure"));
        assert!(limiter.try_acquire("azure"));
        assert!(!limiter.try_acquire("azure"));
    }

    #[test]
    fn services_have_independent_buckets() {
        let limiter = limiter(1.0, 600.0);
        assert!(limiter.try_acquire("azure"));
        assert!(limiter.try_acquire("openai"));
        assert!(!limiter.try_acquire("azure"));
    }

    #[test]
    fn disabled_limiter_always_grants() {
        let limiter = TokenBucketRateLimiter::disabled();
        for _ in 0..1000 {
            assert!(limiter.try_acquire("anything"));
        }
    }

    #[test]
    fn state_round_trips_through_persistence_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate_limit.json");

        let first = TokenBucketRateLimiter::new(
            true,
            ServiceLimits {
                requests_per_second: 2.0,
                requests_per_minute: 600.0,
            },
            HashMap::new(),
            Some(path.clone()),
        );
        assert!(first.try_acquire("azure"));
        assert!(first.try_acquire("azure"));
        drop(first);

        // A second process sees the drained bucket.
        let second = TokenBucketRateLimiter::new(
            true,
            ServiceLimits {
                requests_per_second: 2.0,
                requests_per_minute: 600.0,
            },
            HashMap::new(),
            Some(path),
        );
        assert!(!second.try_acquire("azure"));
    }
}
