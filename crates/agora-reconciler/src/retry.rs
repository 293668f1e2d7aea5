//! Retry with exponential backoff, and access classification
//!
//! Every API call the reconciler makes goes through [`with_retry`]. Transient
//! failures (502/503/504, timeouts, resets) and rate limits are retried;
//! anything else surfaces immediately. Rate-limit and permission failures
//! that survive the retries are downgraded by the caller to an
//! [`AccessKind`] for the run summary.

use std::future::Future;
use std::time::Duration;

use agora_core::{AgoraError, Result};
use rand::Rng;
use tokio::time::Instant;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_MAX_ELAPSED_MS: u64 = 120_000;
const DEFAULT_JITTER: f64 = 0.25;

/// Backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Budget for the whole sequence; a retry that would overrun it is not made
    pub max_elapsed: Duration,
    /// Fraction of the delay added as random jitter, in `[0, 1)`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            max_elapsed: Duration::from_millis(DEFAULT_MAX_ELAPSED_MS),
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry `retry` (1-based), without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before retry `retry` after `error`
    ///
    /// A server-provided `retry-after` wins over the computed backoff.
    pub fn delay_for(&self, retry: u32, error: &AgoraError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after;
        }

        let base = self.base_delay(retry);
        let jitter = self.jitter.clamp(0.0, 0.99);
        if jitter == 0.0 {
            return base;
        }
        let extra = base.as_secs_f64() * jitter * rand::thread_rng().gen::<f64>();
        base + Duration::from_secs_f64(extra)
    }
}

/// Whether another attempt could succeed
pub fn is_retryable(error: &AgoraError) -> bool {
    error.is_transient() || error.is_rate_limited()
}

/// Run `f` until it succeeds, fails permanently, or the policy is exhausted
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut attempt = 1;

    loop {
        let error = match f().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable(&error) || attempt >= policy.max_attempts.max(1) {
            return Err(error);
        }

        let delay = policy.delay_for(attempt, &error);
        let over_budget = started
            .elapsed()
            .checked_add(delay)
            .map_or(true, |total| total > policy.max_elapsed);
        if over_budget {
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retry budget exhausted: {}",
                error
            );
            return Err(error);
        }

        warn!(
            operation,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying after error: {}",
            error
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Why an issue or repository could not be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    RateLimited,
    Forbidden,
}

impl AccessKind {
    /// Classify an error as an access problem, if it is one
    pub fn classify(error: &AgoraError) -> Option<Self> {
        if error.is_rate_limited() {
            Some(Self::RateLimited)
        } else if error.is_forbidden() {
            Some(Self::Forbidden)
        } else {
            None
        }
    }
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Forbidden => write!(f, "forbidden"),
        }
    }
}
