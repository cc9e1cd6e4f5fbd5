//! Retry with exponential backoff for rate-limited calls.
//!
//! Vision APIs on free or low tiers answer bursts with HTTP 429 /
//! `RESOURCE_EXHAUSTED`. Those clear on their own after a few seconds, so the
//! call is retried after `2^attempt * base + jitter`. With the defaults
//! (4 attempts, 2 s base, ≤1 s jitter) the waits are roughly 2 s → 4 s → 8 s.
//!
//! Every other failure is permanent as far as this module is concerned and
//! is handed back on the first attempt.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// True when an error description carries a rate-limit marker.
pub fn is_rate_limit_message(message: &str) -> bool {
    message.contains("429") || message.contains("RESOURCE_EXHAUSTED")
}

/// Errors that can tell whether they are worth retrying.
pub trait Retryable {
    fn is_rate_limited(&self) -> bool;
}

impl Retryable for String {
    fn is_rate_limited(&self) -> bool {
        is_rate_limit_message(self)
    }
}

/// Attempt count and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. At least 1.
    pub max_attempts: u32,
    /// Wait before the first retry (before jitter).
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random addition to each wait.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (0-indexed), with the given jitter.
    pub fn backoff_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).saturating_add(jitter)
    }

    /// Wait after failed attempt `attempt`, with fresh random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        let jitter = if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(fastrand::u64(0..max_ms))
        };
        self.backoff_with_jitter(attempt, jitter)
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    /// Not a rate-limit failure; returned without retrying.
    #[error("{0}")]
    Permanent(E),

    /// Rate limited on every one of `attempts` attempts.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E: fmt::Display> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent(_) => 1,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(e) | RetryError::Exhausted { last: e, .. } => e,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// Attempts are strictly sequential and the caller is suspended during each
/// wait. `label` only feeds the log lines.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_rate_limited() => return Err(RetryError::Permanent(e)),
            Err(e) if attempt + 1 >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last: e,
                })
            }
            Err(e) => {
                let wait = policy.backoff(attempt);
                warn!(
                    "{}: rate limited, retrying in {}ms (attempt {}/{}) — {}",
                    label,
                    wait.as_millis(),
                    attempt + 1,
                    max_attempts,
                    e
                );
                sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
