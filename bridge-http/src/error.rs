//! HTTP forwarder error types.

use thiserror::Error;

/// Errors that can occur while attempting a single forward.
///
/// `Forwarder::forward` never returns this to its caller — see
/// [`crate::ForwardOutcome`] — but it drives the retry/terminal decision
/// inside the forwarder itself.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Network error, connection failure, or other transport-level fault.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The request did not complete within `http.timeout`.
    #[error("request timed out")]
    Timeout,

    /// The endpoint returned a non-2xx status.
    #[error("endpoint returned status {0}")]
    Status(u16),
}

impl ForwardError {
    /// Whether this attempt's failure should be retried.
    ///
    /// Network errors, timeouts, and status 408/429/5xx are retryable;
    /// everything else (2xx is not an error at all, other 4xx) is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ForwardError::Request(_) | ForwardError::Timeout => true,
            ForwardError::Status(code) => *code == 408 || *code == 429 || (500..600).contains(code),
        }
    }

    /// A short machine-readable label for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Request(_) => "request_error",
            ForwardError::Timeout => "timeout",
            ForwardError::Status(_) => "http_status",
        }
    }
}
