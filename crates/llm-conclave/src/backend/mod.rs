//! Completion backends.
//!
//! A [`CompletionBackend`] turns an ordered message history plus the
//! responding agent's instruction into a reply. Backends never retry on their
//! own; retries are an explicit [`RetryPolicy`](retry::RetryPolicy) applied
//! by the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_conclave::backend::{CompletionBackend, OpenAiCompatibleBackend};
//! use llm_conclave::config::BackendConfig;
//!
//! let backend = OpenAiCompatibleBackend::from_config(&BackendConfig::try_from_env()?)?;
//! let reply = backend.complete(transcript.messages(), &writer).await?;
//! ```

pub mod cache;
pub mod error;
pub mod openai;
pub mod retry;

pub use cache::CachedBackend;
pub use error::{BackendError, BackendErrorKind};
pub use openai::OpenAiCompatibleBackend;
pub use retry::{RetryPolicy, complete_with_retry};

use crate::agent::Agent;
use crate::transcript::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces the next reply for `agent` given the conversation so far.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, history: &[Message], agent: &Agent) -> Result<String, BackendError>;

    /// Human-readable backend identifier used in logs.
    fn name(&self) -> &str {
        "completion-backend"
    }
}

#[async_trait]
impl<T> CompletionBackend for Arc<T>
where
    T: CompletionBackend + ?Sized,
{
    async fn complete(&self, history: &[Message], agent: &Agent) -> Result<String, BackendError> {
        (**self).complete(history, agent).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
