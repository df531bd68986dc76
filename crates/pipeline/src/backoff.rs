//! Exponential backoff and the retry loop built on it.

use crate::error::Result;
use std::time::Duration;

/// Exponential backoff policy: `base * 2^attempt`, capped, for a bounded
/// number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Backoff {
    /// Fast and short: a user is waiting on the result.
    pub fn interactive() -> Self {
        Self { base: Duration::from_millis(100), cap: Duration::from_secs(2), max_attempts: 3 }
    }

    /// Slow and patient, for background indexing against a rate-limited
    /// upstream.
    pub fn background() -> Self {
        Self { base: Duration::from_secs(1), cap: Duration::from_secs(60), max_attempts: 5 }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt)).min(self.cap)
    }
}

/// Run `operation` until it succeeds, fails terminally, or exhausts the
/// policy's attempts.
///
/// Only errors whose kind reports `is_retryable()` trigger a retry; anything
/// else propagates immediately with its attempt budget unspent.
pub async fn retry<T, F, Fut>(policy: Backoff, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                tracing::debug!(attempt, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), error = %err, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(err) => return Err(err),
        }
    }
}
