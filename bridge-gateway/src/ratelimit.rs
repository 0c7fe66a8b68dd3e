//! Gateway identify rate limiting and reconnect backoff.
//!
//! Discord limits how quickly a client may send Identify; this also doubles
//! as the home for the full-jitter reconnect backoff used by the Gateway
//! Client's top-level reconnect loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::GatewayError;

/// Rate limiter for Gateway Identify/Resume sends.
///
/// Discord allows one identify per 5 seconds for a single-shard client.
pub struct IdentifyRateLimiter {
    semaphore: Arc<Semaphore>,
    hold_duration: Duration,
}

impl IdentifyRateLimiter {
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            hold_duration: Duration::from_secs(5),
        }
    }

    /// Acquire permission to send an Identify or Resume payload. Blocks
    /// until a slot is available; the slot is released automatically after
    /// `hold_duration`.
    pub async fn acquire(&self) -> Result<(), GatewayError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::Closed {
                code: 0,
                reason: "identify rate limiter closed".to_string(),
            })?;

        let hold_duration = self.hold_duration;
        tokio::spawn(async move {
            sleep(hold_duration).await;
            drop(permit);
        });

        Ok(())
    }

    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for IdentifyRateLimiter {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Compute the next reconnect delay using full jitter: a value drawn
/// uniformly from `[0, min(cap, base * 2^attempt)]`.
///
/// `attempt` is 0-indexed (the first reconnect uses `attempt = 0`).
pub fn full_jitter_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    use rand::Rng;

    let capped_ms = base
        .as_millis()
        .saturating_mul(1u128 << attempt.min(32))
        .min(cap.as_millis());
    let capped_ms = capped_ms as u64;

    let delay_ms = if capped_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=capped_ms)
    };

    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_jitter_backoff_bounds() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(60);

        for attempt in 0..10 {
            let delay = full_jitter_backoff(attempt, base, cap);
            assert!(delay <= cap);
        }
    }

    #[test]
    fn test_full_jitter_backoff_caps_at_max() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(60);
        let delay = full_jitter_backoff(10, base, cap);
        assert!(delay <= cap);
    }

    #[tokio::test]
    async fn test_rate_limiter_permits() {
        let limiter = IdentifyRateLimiter::new(3);
        assert_eq!(limiter.available_permits(), 3);

        limiter.acquire().await.unwrap();
        assert!(limiter.available_permits() <= 3);
    }
}
