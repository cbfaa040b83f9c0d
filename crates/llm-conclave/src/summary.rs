//! Run summaries.

use crate::agent::Agent;
use crate::backend::{BackendError, CompletionBackend, RetryPolicy, complete_with_retry};
use crate::transcript::Transcript;

/// Instruction used by [`SummaryMethod::Reflective`] unless overridden.
pub const DEFAULT_REFLECTION_PROMPT: &str = "Return entire conversation in plain text.";

/// Name the reflective summarizer speaks under.
pub const SUMMARIZER_NAME: &str = "summarizer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryMethod {
    /// The last message's content, verbatim.
    LastMessage,
    /// One extra backend call over the whole transcript with a fixed instruction.
    Reflective { prompt: String },
}

impl SummaryMethod {
    pub fn reflective() -> Self {
        SummaryMethod::Reflective {
            prompt: DEFAULT_REFLECTION_PROMPT.to_string(),
        }
    }
}

impl Default for SummaryMethod {
    fn default() -> Self {
        Self::reflective()
    }
}

/// Summarizes `transcript` with `method`.
///
/// `LastMessage` never touches the backend and yields an empty string for an
/// empty transcript. `Reflective` is as deterministic as the backend is.
pub async fn summarize(
    transcript: &Transcript,
    method: &SummaryMethod,
    backend: &dyn CompletionBackend,
    retry: RetryPolicy,
) -> Result<String, BackendError> {
    match method {
        SummaryMethod::LastMessage => Ok(transcript
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()),
        SummaryMethod::Reflective { prompt } => {
            let summarizer = Agent::new(SUMMARIZER_NAME, prompt.as_str());
            complete_with_retry(backend, transcript.messages(), &summarizer, retry).await
        }
    }
}
