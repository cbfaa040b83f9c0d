//! Opt-in retry for completion requests.
//!
//! The engine never retries unless a [`RetryPolicy`] with a non-zero budget
//! is configured. Only errors that report [`BackendError::is_retryable`] are
//! attempted again.

use super::{BackendError, CompletionBackend};
use crate::agent::Agent;
use crate::transcript::Message;

/// How many extra attempts a failed completion gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

/// Calls `backend.complete` under `policy`.
///
/// Returns the first success, or the last error once the budget is spent or
/// a non-retryable error occurs.
pub async fn complete_with_retry(
    backend: &dyn CompletionBackend,
    history: &[Message],
    agent: &Agent,
    policy: RetryPolicy,
) -> Result<String, BackendError> {
    let mut attempts = 0;

    loop {
        attempts += 1;

        match backend.complete(history, agent).await {
            Ok(reply) => {
                if attempts > 1 {
                    log::info!(
                        "Completion for '{}' succeeded on attempt {}/{}",
                        agent.name(),
                        attempts,
                        policy.max_retries + 1
                    );
                }
                return Ok(reply);
            }
            Err(e) if e.is_retryable() && attempts <= policy.max_retries => {
                let delay = e.retry_delay(attempts);
                log::warn!(
                    "Completion for '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    agent.name(),
                    attempts,
                    policy.max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() && policy.max_retries > 0 {
                    log::error!(
                        "Completion for '{}' failed after {} attempts: {}",
                        agent.name(),
                        attempts,
                        e
                    );
                } else {
                    log::error!("Completion for '{}' failed: {}", agent.name(), e);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyBackend {
        failures_before_success: u32,
        error: BackendError,
        calls: AtomicU32,
    }

    impl FlakyBackend {
        fn new(failures_before_success: u32, error: BackendError) -> Self {
            Self {
                failures_before_success,
                error,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for FlakyBackend {
        async fn complete(&self, _history: &[Message], _agent: &Agent) -> Result<String, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(self.error.clone())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn quick_error() -> BackendError {
        BackendError::http(503, "unavailable").with_retry_after(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = FlakyBackend::new(1, quick_error());
        let agent = Agent::new("Writer", "");

        let result = complete_with_retry(&backend, &[], &agent, RetryPolicy::default()).await;

        assert!(result.is_err());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let backend = FlakyBackend::new(2, quick_error());
        let agent = Agent::new("Writer", "");

        let result = complete_with_retry(&backend, &[], &agent, RetryPolicy::with_max_retries(3)).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let backend = FlakyBackend::new(10, quick_error());
        let agent = Agent::new("Writer", "");

        let result = complete_with_retry(&backend, &[], &agent, RetryPolicy::with_max_retries(2)).await;

        assert_eq!(result.unwrap_err().status_code, Some(503));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let backend = FlakyBackend::new(1, BackendError::malformed("garbage"));
        let agent = Agent::new("Writer", "");

        let result = complete_with_retry(&backend, &[], &agent, RetryPolicy::with_max_retries(5)).await;

        assert!(result.is_err());
        assert_eq!(backend.calls(), 1);
    }
}
