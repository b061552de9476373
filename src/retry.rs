//! Bounded retry with exponential backoff.

use crate::context::RunContext;
use crate::error::SyncError;
use crate::types::SyncConfig;
use std::future::Future;
use std::time::Duration;
use tokio_retry2::strategy::ExponentialBackoff;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

/// How many times an operation is attempted and how long to wait in between.
///
/// The delay before retry `n` (1-based) is `2^n * factor_ms` milliseconds, so the
/// default factor of 1000 yields 2s, 4s, 8s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub factor_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            factor_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            factor_ms: config.backoff_factor_ms,
        }
    }

    /// Delays between attempts; one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(2)
            .factor(self.factor_ms)
            .take(self.max_attempts.saturating_sub(1))
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// attempts are exhausted.
///
/// Every attempt is bounded by the run deadline; hitting it ends the loop with
/// [`SyncError::Timeout`]. Rate limiting is never retried.
pub async fn with_retry<T, F, Fut>(
    ctx: &RunContext,
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 0usize;
    // A backoff sleep never outlasts the run budget.
    let delays = policy
        .delays()
        .map(move |delay| ctx.remaining().map_or(delay, |left| delay.min(left)));

    Retry::spawn(delays, || {
        attempt += 1;
        let current = attempt;
        let fut = op();

        async move {
            match ctx.bounded(fut).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        current, policy.max_attempts, label, e
                    );
                    RetryError::to_transient(e)
                }
                Err(e) => {
                    debug!("Giving up on {} after attempt {}: {}", label, current, e);
                    RetryError::to_permanent(e)
                }
            }
        }
    })
    .await
}
