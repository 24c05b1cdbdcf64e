//! Exponential back-off for transient fetch failures.
//!
//! Classification comes from [`FetchError::is_transient`]: network errors,
//! 5xx responses and 429s are retried, everything else is final.

use crate::model::FetchError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const MAX_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// ±25 % jitter, capped at 60 s.
    pub fn delay(&self, attempt: u32) -> Duration {
        let computed = self
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
        let jitter = rand::random::<f64>() * 0.5 + 0.75;
        let jittered = (computed.min(MAX_DELAY_MS) as f64 * jitter) as u64;
        Duration::from_millis(jittered.min(MAX_DELAY_MS))
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of retries.
/// Returns the final result together with the number of attempts made.
///
/// `operation` yields `None` when it gave up before sending anything; the
/// chain then stops and `None` is returned without a final result.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Option<(Result<T, FetchError>, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<Result<T, FetchError>>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await? {
            Ok(value) => return Some((Ok(value), attempt + 1)),
            Err(e) => e,
        };
        if !err.is_transient() || attempt >= policy.max_retries {
            return Some((Err(err), attempt + 1));
        }

        attempt += 1;
        let delay = policy.delay(attempt);
        warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "🔁 Transient fetch error, retrying after back-off"
        );
        tokio::time::sleep(delay).await;
    }
}
