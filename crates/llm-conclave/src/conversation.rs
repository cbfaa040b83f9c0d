//! Two-party conversation with a turn budget.
//!
//! The initiator's seed is turn 0. The recipient answers first, then the
//! two alternate until the termination predicate fires on the latest message
//! or `max_turns` replies have been produced. A transcript therefore never
//! holds more than `max_turns + 1` messages.
//!
//! With [`Conversation::with_triggers`], a participant answering an agent
//! that owns a [`NestedPipeline`] replies with the pipeline's output instead
//! of its own.

use crate::agent::{Agent, Registry};
use crate::builder::BuilderContext;
use crate::error::{ConfigurationError, RunError, RunFailure};
use crate::nested::{NestedFailure, NestedPipeline, NestedRecord};
use crate::responder::Responder;
use crate::termination::{Termination, TerminationPredicate};
use crate::transcript::{Recipient, Transcript};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Lifecycle of a [`Conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    Running,
    TerminatedByPredicate,
    TerminatedByLimit,
    Failed,
}

impl ConversationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConversationState::Idle | ConversationState::Running)
    }

    pub fn termination(&self) -> Option<Termination> {
        match self {
            ConversationState::TerminatedByPredicate => Some(Termination::Predicate),
            ConversationState::TerminatedByLimit => Some(Termination::Limit),
            _ => None,
        }
    }
}

/// Result of a completed conversation.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub transcript: Transcript,
    pub state: ConversationState,
    /// Replies produced after the seed.
    pub turns: usize,
    /// Pipelines that produced a turn, in order.
    pub nested: Vec<NestedRecord>,
}

impl ConversationOutcome {
    /// Content of the most recent message.
    pub fn last_content(&self) -> &str {
        self.transcript
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// A bounded exchange between two agents.
#[derive(Debug)]
pub struct Conversation {
    initiator: Agent,
    recipient: Agent,
    max_turns: usize,
    termination: TerminationPredicate,
    state: ConversationState,
    transcript: Transcript,
    triggers: Option<TriggerScope>,
}

/// Registry and request context used to run nested pipelines.
#[derive(Debug)]
struct TriggerScope {
    registry: Arc<Registry>,
    ctx: BuilderContext,
}

impl Conversation {
    pub fn new(initiator: Agent, recipient: Agent, max_turns: usize) -> Result<Self, ConfigurationError> {
        if max_turns == 0 {
            return Err(ConfigurationError::ZeroLimit { what: "max_turns" });
        }
        Ok(Self {
            initiator,
            recipient,
            max_turns,
            termination: TerminationPredicate::default(),
            state: ConversationState::Idle,
            transcript: Transcript::new(),
            triggers: None,
        })
    }

    pub fn with_termination(mut self, termination: TerminationPredicate) -> Self {
        self.termination = termination;
        self
    }

    /// Fires the registry's pipelines when either participant answers
    /// their trigger agent.
    pub fn with_triggers(mut self, registry: Arc<Registry>, ctx: BuilderContext) -> Self {
        self.triggers = Some(TriggerScope { registry, ctx });
        self
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn transition(&mut self, next: ConversationState) {
        info!(
            target: "llm_conclave::conversation",
            from = ?self.state,
            to = ?next,
            turns = self.transcript.len().saturating_sub(1),
            event = "conversation_state_changed"
        );
        self.state = next;
    }

    fn fail(mut self, failure: RunFailure, nested: Vec<NestedRecord>) -> RunError {
        self.transition(ConversationState::Failed);
        RunError::new(failure, self.transcript).with_nested(nested)
    }

    /// The pipeline owned by `listener` when `listener` sent the last message.
    fn pipeline_answering(
        &self,
        listener: &str,
    ) -> Option<(&NestedPipeline, &Registry, &BuilderContext)> {
        let scope = self.triggers.as_ref()?;
        if self.transcript.last()?.sender != listener {
            return None;
        }
        let pipeline = scope.registry.trigger_for(listener)?;
        Some((pipeline, scope.registry.as_ref(), &scope.ctx))
    }

    /// [`Conversation::run`] behind a boxed `Send` future, so the recursion
    /// through nested pipelines has a nameable type.
    pub(crate) fn run_boxed<'a>(
        self,
        responder: &'a Responder,
        seed: String,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ConversationOutcome, RunError>> {
        Box::pin(self.run(responder, seed, cancel))
    }

    /// Runs the conversation to completion.
    ///
    /// Any backend or pipeline failure is fatal and returned with the
    /// partial transcript.
    #[tracing::instrument(
        name = "conversation.run",
        skip(self, responder, seed, cancel),
        fields(
            initiator = %self.initiator.name(),
            recipient = %self.recipient.name(),
            max_turns = self.max_turns,
        )
    )]
    pub async fn run(
        mut self,
        responder: &Responder,
        seed: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<ConversationOutcome, RunError> {
        self.transcript.append(
            self.initiator.name(),
            Recipient::agent(self.recipient.name()),
            seed,
        );
        self.transition(ConversationState::Running);

        let mut turns = 0;
        let mut recipient_speaks = true;
        let mut nested = Vec::new();

        loop {
            let last = self.transcript.last().map(|m| m.content.as_str()).unwrap_or_default();
            if self.termination.is_terminal(last) {
                self.transition(ConversationState::TerminatedByPredicate);
                break;
            }
            if turns >= self.max_turns {
                self.transition(ConversationState::TerminatedByLimit);
                break;
            }
            if cancel.is_cancelled() {
                return Err(self.fail(RunFailure::Cancelled, nested));
            }

            let (speaker, listener) = if recipient_speaks {
                (&self.recipient, &self.initiator)
            } else {
                (&self.initiator, &self.recipient)
            };

            let reply = match self.pipeline_answering(listener.name()) {
                Some((pipeline, registry, ctx)) => {
                    let seed = self
                        .transcript
                        .last()
                        .map(|m| m.content.clone())
                        .unwrap_or_default();
                    match pipeline
                        .run_with_seed(registry, responder, ctx, turns, seed, cancel)
                        .await
                    {
                        Ok(record) => {
                            let output = record.output.clone().unwrap_or_default();
                            nested.push(record);
                            Ok(output)
                        }
                        Err(NestedFailure { failure, record }) => {
                            error!(
                                target: "llm_conclave::conversation",
                                speaker = speaker.name(),
                                trigger = pipeline.trigger(),
                                error = %failure,
                                event = "nested_pipeline_failed"
                            );
                            nested.push(record);
                            Err(failure)
                        }
                    }
                }
                None => responder.respond(speaker, &self.transcript).await.map_err(|e| {
                    error!(
                        target: "llm_conclave::conversation",
                        speaker = speaker.name(),
                        turn = turns + 1,
                        error = %e,
                        event = "conversation_turn_failed"
                    );
                    RunFailure::backend(speaker.name(), e)
                }),
            };

            match reply {
                Ok(content) => {
                    let recipient = Recipient::agent(listener.name());
                    let speaker_name = speaker.name().to_string();
                    self.transcript.append(speaker_name, recipient, content);
                }
                Err(failure) => return Err(self.fail(failure, nested)),
            }

            turns += 1;
            recipient_speaks = !recipient_speaks;
        }

        Ok(ConversationOutcome {
            transcript: self.transcript,
            state: self.state,
            turns,
            nested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, CompletionBackend};
    use crate::transcript::Message;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with `"<name> #<n>"`, or with `terminal` on call `terminate_on`.
    struct CountingBackend {
        calls: AtomicUsize,
        terminate_on: Option<usize>,
        fail_on: Option<usize>,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                terminate_on: None,
                fail_on: None,
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for CountingBackend {
        async fn complete(&self, _history: &[Message], agent: &Agent) -> Result<String, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(n) {
                return Err(BackendError::network("connection reset"));
            }
            if self.terminate_on == Some(n) {
                return Ok("done. TERMINATE".to_string());
            }
            Ok(format!("{} #{n}", agent.name()))
        }
    }

    fn responder(backend: CountingBackend) -> Responder {
        Responder::new(Arc::new(backend))
    }

    fn pair(max_turns: usize) -> Conversation {
        Conversation::new(Agent::new("Initiator", ""), Agent::new("Writer", ""), max_turns).unwrap()
    }

    #[test]
    fn test_zero_turns_rejected() {
        let err = Conversation::new(Agent::new("A", ""), Agent::new("B", ""), 0).unwrap_err();
        assert_eq!(err, ConfigurationError::ZeroLimit { what: "max_turns" });
    }

    #[tokio::test]
    async fn test_alternates_and_respects_turn_limit() {
        let conversation = pair(3);
        assert_eq!(conversation.state(), ConversationState::Idle);

        let outcome = conversation
            .run(&responder(CountingBackend::new()), "hello", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, ConversationState::TerminatedByLimit);
        assert_eq!(outcome.turns, 3);
        assert_eq!(outcome.transcript.len(), 4);
        assert_eq!(
            outcome.transcript.senders(),
            vec!["Initiator", "Writer", "Initiator", "Writer"]
        );
        assert_eq!(outcome.last_content(), "Writer #3");
        assert_eq!(
            outcome.transcript.messages()[1].recipient,
            Recipient::agent("Initiator")
        );
    }

    #[tokio::test]
    async fn test_predicate_stops_early() {
        let backend = CountingBackend {
            terminate_on: Some(1),
            ..CountingBackend::new()
        };

        let outcome = pair(5)
            .run(&responder(backend), "hello", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, ConversationState::TerminatedByPredicate);
        assert_eq!(outcome.transcript.len(), 2);
        assert_eq!(outcome.state.termination(), Some(Termination::Predicate));
    }

    #[tokio::test]
    async fn test_terminal_seed_gets_no_reply() {
        let outcome = pair(2)
            .run(&responder(CountingBackend::new()), "TERMINATE", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.turns, 0);
        assert_eq!(outcome.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_never_predicate_runs_to_limit() {
        let backend = CountingBackend {
            terminate_on: Some(1),
            ..CountingBackend::new()
        };

        let outcome = pair(2)
            .with_termination(TerminationPredicate::never())
            .run(&responder(backend), "hello", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, ConversationState::TerminatedByLimit);
        assert_eq!(outcome.transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_partial_transcript() {
        let backend = CountingBackend {
            fail_on: Some(2),
            ..CountingBackend::new()
        };

        let err = pair(4)
            .run(&responder(backend), "hello", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.transcript.len(), 2);
        assert!(matches!(err.failure, RunFailure::Backend { ref agent, .. } if agent == "Initiator"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_turn() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pair(2)
            .run(&responder(CountingBackend::new()), "hello", &cancel)
            .await
            .unwrap_err();

        assert!(err.failure.is_cancelled());
        assert_eq!(err.transcript.len(), 1);
    }
}
