// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry Policy
//!
//! Bounded exponential backoff with jitter around plugin invocations.
//! Retry wraps the *executor* call, so every attempt opens its own
//! node-state and the audit trail shows attempts 1..k with their
//! individual failures.
//!
//! Retry only when:
//! - the policy has attempts left, and
//! - `is_retryable` says the error is transient.
//!
//! Fatal audit-integrity errors are never retryable; retrying them would
//! just re-violate the contract.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use elspeth_domain::EngineError;

/// Configuration for bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, including the first. Must be ≥ 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Randomize each delay by 0.5x..1.5x to avoid thundering herds.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        }
    }

    /// Builder-style attempt override.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Builder-style base delay override.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before attempt `attempt + 1` (0-based attempt index).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = self.backoff_factor.powi(attempt as i32);
        let raw = self.base_delay.as_secs_f64() * exponent;
        let capped = raw.min(self.max_delay.as_secs_f64());
        let final_secs = if self.jitter {
            capped * rand::rng().random_range(0.5..1.5)
        } else {
            capped
        };
        Duration::from_secs_f64(final_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Classifies errors as transient. Audit integrity errors are always
/// final; plugin and infrastructure failures default to retryable.
pub fn default_is_retryable(error: &EngineError) -> bool {
    if error.is_fatal() {
        return false;
    }
    matches!(
        error,
        EngineError::PluginError { .. }
            | EngineError::DatabaseError(_)
            | EngineError::PayloadStoreError(_)
    )
}

/// Runs `op` under `policy`, consulting `is_retryable` between attempts.
///
/// Exhaustion after at least one retryable failure surfaces as
/// `MaxRetriesExceeded`; a non-retryable error propagates unchanged.
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&EngineError) -> bool,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if !is_retryable(&error) {
                    return Err(error);
                }
                if attempt >= max_attempts {
                    if max_attempts == 1 {
                        return Err(error);
                    }
                    warn!(attempts = attempt, error = %error, "retry budget exhausted");
                    return Err(EngineError::MaxRetriesExceeded {
                        attempts: attempt,
                        last_error: error.to_string(),
                    });
                }
                let delay = policy.delay_for(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn succeeds_on_later_attempt() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&fast_policy(3), default_is_retryable, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::plugin("flaky", "transient"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_max_retries() {
        let result: Result<(), _> =
            execute_with_retry(&fast_policy(3), default_is_retryable, || async {
                Err(EngineError::plugin("flaky", "still down"))
            })
            .await;
        match result {
            Err(EngineError::MaxRetriesExceeded { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected MaxRetriesExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            execute_with_retry(&fast_policy(5), default_is_retryable, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(EngineError::MissingEdge {
                        node_id: "n".to_string(),
                        label: "x".to_string(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(EngineError::MissingEdge { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_retry_policy_propagates_original_error() {
        let result: Result<(), _> =
            execute_with_retry(&RetryPolicy::no_retry(), default_is_retryable, || async {
                Err(EngineError::plugin("p", "one shot"))
            })
            .await;
        assert!(matches!(result, Err(EngineError::PluginError { .. })));
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            backoff_factor: 2.0,
            jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(400));
    }
}
