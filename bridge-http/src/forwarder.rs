//! The HTTP Forwarder: sends one JSON POST per endpoint delivery with
//! bounded retries.

use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ForwardError;

/// `Content-Type` sent with every forward, per the downstream wire protocol.
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A single attempt's failure, carrying the `Retry-After` hint (if any) the
/// response offered alongside the error that classifies retryability.
struct Attempt {
    err: ForwardError,
    retry_after: Option<Duration>,
}

const RETRY_AFTER_CAP: Duration = Duration::from_secs(60);

/// Tuning knobs for the forwarder, mirroring `http.*` in the configuration
/// schema.
#[derive(Debug, Clone, Copy)]
pub struct ForwarderConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Additional attempts allowed after the initial try.
    pub retry_attempts: u32,
    /// Base linear backoff; the delay before attempt `n` is `retry_delay * n`.
    pub retry_delay: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// One pending delivery of a dispatched event to one configured endpoint.
///
/// `B` is whatever serializable body the caller builds — the Router passes
/// its own `Envelope` type directly rather than pre-serializing it to a
/// `serde_json::Value`, so there is no fallible conversion on this path.
#[derive(Debug, Clone)]
pub struct ForwardJob<B> {
    /// The Gateway event name, used for logging only.
    pub event_name: String,
    /// Destination URL.
    pub url: String,
    /// The envelope body, already materialized by the Router.
    pub body: B,
}

/// Outcome of a completed forward, after all retries have been exhausted or
/// a terminal result was reached. Never an `Err` — per the error handling
/// design, forwarding failures are absorbed here and never propagated.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// A 2xx response was received.
    Success { attempt: u32, elapsed: Duration },
    /// Every attempt failed, or a non-retryable status was returned.
    Failed {
        attempt: u32,
        reason: String,
        elapsed: Duration,
    },
}

/// Sends [`ForwardJob`]s over a shared `reqwest::Client`.
pub struct Forwarder {
    client: Client,
    config: ForwarderConfig,
}

impl Forwarder {
    pub fn new(client: Client, config: ForwarderConfig) -> Self {
        Self { client, config }
    }

    /// Perform the full retry sequence for one job and report the outcome.
    ///
    /// This never throttles the caller beyond its own retry sleeps — callers
    /// that must not block (the Router) should spawn this as its own task.
    pub async fn forward<B>(&self, job: ForwardJob<B>) -> ForwardOutcome
    where
        B: Serialize + Send,
    {
        let start = Instant::now();
        let max_attempts = self.config.retry_attempts + 1;

        let mut last_err = None;
        for attempt in 1..=max_attempts {
            match self.try_once(&job).await {
                Ok(()) => {
                    let elapsed = start.elapsed();
                    info!(
                        event = %job.event_name,
                        url = %job.url,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        "forward succeeded"
                    );
                    return ForwardOutcome::Success { attempt, elapsed };
                }
                Err(attempt_err) => {
                    let retryable = attempt_err.err.is_retryable();
                    warn!(
                        event = %job.event_name,
                        url = %job.url,
                        attempt,
                        error_kind = attempt_err.err.kind(),
                        retryable,
                        "forward attempt failed"
                    );

                    if !retryable || attempt == max_attempts {
                        last_err = Some(attempt_err.err);
                        break;
                    }

                    let delay = self.retry_delay(attempt, &attempt_err);
                    tokio::time::sleep(delay).await;
                    last_err = Some(attempt_err.err);
                }
            }
        }

        let elapsed = start.elapsed();
        let reason = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        warn!(
            event = %job.event_name,
            url = %job.url,
            attempt = max_attempts,
            elapsed_ms = elapsed.as_millis(),
            "forward dropped after exhausting retries"
        );
        ForwardOutcome::Failed {
            attempt: max_attempts,
            reason,
            elapsed,
        }
    }

    async fn try_once<B>(&self, job: &ForwardJob<B>) -> Result<(), Attempt>
    where
        B: Serialize + Send,
    {
        let response = self
            .client
            .post(&job.url)
            .timeout(self.config.timeout)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .json(&job.body)
            .send()
            .await
            .map_err(|e| Attempt {
                err: if e.is_timeout() {
                    ForwardError::Timeout
                } else {
                    ForwardError::Request(e)
                },
                retry_after: None,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = retry_after_from(&response, status);
        Err(Attempt {
            err: ForwardError::Status(status.as_u16()),
            retry_after,
        })
    }

    fn retry_delay(&self, attempt: u32, failed: &Attempt) -> Duration {
        if matches!(failed.err, ForwardError::Status(429)) {
            if let Some(retry_after) = failed.retry_after {
                return retry_after.min(RETRY_AFTER_CAP);
            }
        }
        self.config.retry_delay * attempt
    }
}

fn retry_after_from(response: &reqwest::Response, status: StatusCode) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

/// Parse a `Retry-After` header value: either an integer number of seconds,
/// or an HTTP-date. Values that parse as neither are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let target = chrono::DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let now = chrono::Utc::now();
    let delta = target.with_timezone(&chrono::Utc) - now;
    delta.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("0"), Some(Duration::from_secs(0)));
    }

    #[test]
    fn test_parse_retry_after_garbage() {
        assert_eq!(parse_retry_after("not-a-date"), None);
    }

    #[test]
    fn test_retry_delay_linear() {
        let forwarder = Forwarder::new(Client::new(), ForwarderConfig::default());
        let failed = Attempt {
            err: ForwardError::Status(503),
            retry_after: None,
        };
        assert_eq!(forwarder.retry_delay(1, &failed), Duration::from_secs(1));
        assert_eq!(forwarder.retry_delay(2, &failed), Duration::from_secs(2));
        assert_eq!(forwarder.retry_delay(3, &failed), Duration::from_secs(3));
    }

    #[test]
    fn test_retry_delay_honors_retry_after_on_429() {
        let forwarder = Forwarder::new(Client::new(), ForwarderConfig::default());
        let failed = Attempt {
            err: ForwardError::Status(429),
            retry_after: Some(Duration::from_secs(8)),
        };
        assert_eq!(forwarder.retry_delay(1, &failed), Duration::from_secs(8));
    }
}
