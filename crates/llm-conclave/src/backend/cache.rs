//! In-memory response cache keyed by a seed.
//!
//! With a cache seed configured, an identical request (same seed, agent,
//! instruction and history) always yields the identical response within the
//! lifetime of the cache. Failures are never cached.

use super::{BackendError, CompletionBackend};
use crate::agent::Agent;
use crate::transcript::Message;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Serialize)]
struct CacheKey<'a> {
    seed: u64,
    agent: &'a str,
    instruction: &'a str,
    history: Vec<(&'a str, &'a str)>,
}

/// Wraps a backend and memoizes successful completions.
pub struct CachedBackend<B> {
    inner: B,
    seed: u64,
    entries: Mutex<HashMap<String, String>>,
}

impl<B: CompletionBackend> CachedBackend<B> {
    pub fn new(inner: B, seed: u64) -> Self {
        Self {
            inner,
            seed,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of cached responses.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn key(&self, history: &[Message], agent: &Agent) -> Result<String, BackendError> {
        let key = CacheKey {
            seed: self.seed,
            agent: agent.name(),
            instruction: agent.instruction(),
            history: history
                .iter()
                .map(|m| (m.sender.as_str(), m.content.as_str()))
                .collect(),
        };
        serde_json::to_string(&key)
            .map_err(|e| BackendError::malformed(format!("Failed to build cache key: {e}")))
    }
}

#[async_trait]
impl<B: CompletionBackend> CompletionBackend for CachedBackend<B> {
    async fn complete(&self, history: &[Message], agent: &Agent) -> Result<String, BackendError> {
        let key = self.key(history, agent)?;

        if let Some(hit) = self.entries.lock().await.get(&key) {
            tracing::debug!(
                target: "llm_conclave::backend",
                agent = agent.name(),
                seed = self.seed,
                event = "cache_hit"
            );
            return Ok(hit.clone());
        }

        let reply = self.inner.complete(history, agent).await?;
        self.entries
            .lock()
            .await
            .entry(key)
            .or_insert_with(|| reply.clone());
        Ok(reply)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{Recipient, Transcript};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a different reply on every call.
    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionBackend for CountingBackend {
        async fn complete(&self, _history: &[Message], _agent: &Agent) -> Result<String, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("reply-{n}"))
        }
    }

    #[tokio::test]
    async fn test_identical_request_identical_response() {
        let cached = CachedBackend::new(CountingBackend { calls: AtomicUsize::new(0) }, 42);
        let agent = Agent::new("Writer", "Write.");
        let mut transcript = Transcript::new();
        transcript.append("User_proxy", Recipient::Broadcast, "go");

        let first = cached.complete(transcript.messages(), &agent).await.unwrap();
        let second = cached.complete(transcript.messages(), &agent).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.len().await, 1);
    }

    #[tokio::test]
    async fn test_different_history_misses() {
        let cached = CachedBackend::new(CountingBackend { calls: AtomicUsize::new(0) }, 42);
        let agent = Agent::new("Writer", "Write.");
        let mut transcript = Transcript::new();
        transcript.append("User_proxy", Recipient::Broadcast, "go");
        let first = cached.complete(transcript.messages(), &agent).await.unwrap();

        transcript.append("Writer", Recipient::Broadcast, "draft");
        let second = cached.complete(transcript.messages(), &agent).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(cached.len().await, 2);
    }

    #[tokio::test]
    async fn test_different_agent_misses() {
        let cached = CachedBackend::new(CountingBackend { calls: AtomicUsize::new(0) }, 7);
        let writer = Agent::new("Writer", "Write.");
        let critic = Agent::new("Critic", "Critique.");

        let a = cached.complete(&[], &writer).await.unwrap();
        let b = cached.complete(&[], &critic).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(cached.seed(), 7);
    }
}
