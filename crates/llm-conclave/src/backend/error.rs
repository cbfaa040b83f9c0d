//! Error type for completion backends.

use rand::Rng;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Cause tag carried by every [`BackendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// Connection could not be established or was dropped.
    Network,
    /// The request exceeded the backend's own deadline.
    Timeout,
    /// HTTP 429 or an equivalent quota signal.
    RateLimited,
    /// Any other non-success HTTP status.
    Http,
    /// The response arrived but could not be understood.
    MalformedResponse,
    /// The backend is misconfigured (missing credential, bad URL).
    Configuration,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendErrorKind::Network => "network",
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::RateLimited => "rate-limited",
            BackendErrorKind::Http => "http",
            BackendErrorKind::MalformedResponse => "malformed-response",
            BackendErrorKind::Configuration => "configuration",
        };
        f.write_str(label)
    }
}

/// A failed completion request.
#[derive(Debug, Clone, Error)]
#[error("{kind} error from completion backend: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    /// HTTP status, when the failure came from an HTTP response.
    pub status_code: Option<u16>,
    /// Server-provided delay before the next attempt.
    pub retry_after: Option<Duration>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            retry_after: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::MalformedResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Configuration, message)
    }

    /// Builds an error from an HTTP status. 429 maps to
    /// [`BackendErrorKind::RateLimited`], everything else to `Http`.
    pub fn http(status_code: u16, message: impl Into<String>) -> Self {
        let kind = if status_code == 429 {
            BackendErrorKind::RateLimited
        } else {
            BackendErrorKind::Http
        };
        Self {
            status_code: Some(status_code),
            ..Self::new(kind, message)
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Network failures, timeouts, rate limiting and the 5xx gateway family
    /// are retryable. Malformed responses, configuration problems and other
    /// HTTP statuses are not.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            BackendErrorKind::Network | BackendErrorKind::Timeout | BackendErrorKind::RateLimited => {
                true
            }
            BackendErrorKind::Http => {
                matches!(self.status_code, Some(500) | Some(502) | Some(503) | Some(504))
            }
            BackendErrorKind::MalformedResponse | BackendErrorKind::Configuration => false,
        }
    }

    /// Delay before retry attempt `attempt` (1-based).
    ///
    /// Uses the server's `Retry-After` when present, otherwise exponential
    /// backoff from one second capped at thirty, plus up to 500ms of jitter.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if let Some(delay) = self.retry_after {
            return delay;
        }
        let exponent = attempt.saturating_sub(1).min(5);
        let base = Duration::from_secs(1u64 << exponent).min(Duration::from_secs(30));
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=500));
        base + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_429_is_rate_limited() {
        let err = BackendError::http(429, "slow down");
        assert_eq!(err.kind, BackendErrorKind::RateLimited);
        assert_eq!(err.status_code, Some(429));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::network("refused").is_retryable());
        assert!(BackendError::timeout("deadline").is_retryable());
        assert!(BackendError::http(503, "unavailable").is_retryable());
        assert!(!BackendError::http(400, "bad request").is_retryable());
        assert!(!BackendError::http(401, "unauthorized").is_retryable());
        assert!(!BackendError::malformed("no choices").is_retryable());
        assert!(!BackendError::configuration("missing key").is_retryable());
    }

    #[test]
    fn test_retry_delay_prefers_retry_after() {
        let err = BackendError::http(429, "slow down").with_retry_after(Duration::from_secs(7));
        assert_eq!(err.retry_delay(1), Duration::from_secs(7));
        assert_eq!(err.retry_delay(4), Duration::from_secs(7));
    }

    #[test]
    fn test_retry_delay_backoff_bounds() {
        let err = BackendError::network("reset");
        let first = err.retry_delay(1);
        assert!(first >= Duration::from_secs(1) && first <= Duration::from_millis(1500));

        let third = err.retry_delay(3);
        assert!(third >= Duration::from_secs(4) && third <= Duration::from_millis(4500));

        let capped = err.retry_delay(20);
        assert!(capped <= Duration::from_millis(30_500));
    }

    #[test]
    fn test_display_includes_kind() {
        let err = BackendError::malformed("empty choices");
        assert_eq!(
            err.to_string(),
            "malformed-response error from completion backend: empty choices"
        );
    }
}
