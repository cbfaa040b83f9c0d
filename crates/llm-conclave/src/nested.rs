//! Nested review pipelines triggered by an agent's turn.
//!
//! When the trigger agent is selected in a group run, its pending content is
//! passed through a fixed chain of one-turn conversations with helper agents.
//! Each helper receives a message built from the previous output. The last
//! helper's reply replaces the trigger agent's turn in the outer transcript;
//! everything in between is kept in a [`NestedRecord`].
//!
//! In a two-party run the pipeline fires when the other participant is
//! about to answer the trigger agent. The trigger's reply seeds step 0 and
//! the last helper's reply is posted as the answering participant's turn.
//!
//! Pipelines are one level deep: helpers answer through the plain responder
//! and never fire pipelines of their own.

use crate::agent::Registry;
use crate::builder::{BuilderContext, MessageBuilder};
use crate::conversation::Conversation;
use crate::error::{ConfigurationError, RunFailure};
use crate::responder::Responder;
use crate::termination::TerminationPredicate;
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Where step 0 takes its input from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSeed {
    /// The trigger agent replies first; that reply seeds step 0.
    #[default]
    PendingReply,
    /// The message the trigger agent was about to answer seeds step 0
    /// and the trigger agent makes no backend call of its own.
    IncomingMessage,
}

/// One helper and the builder that prepares its input.
#[derive(Debug, Clone)]
pub struct NestedStep {
    pub helper: String,
    pub builder: MessageBuilder,
}

/// A fixed sequence of helper steps attached to one trigger agent.
///
/// # Example
///
/// ```rust
/// use llm_conclave::builder::MessageBuilder;
/// use llm_conclave::nested::NestedPipeline;
///
/// let pipeline = NestedPipeline::new("Writer")
///     .with_step("Critic", MessageBuilder::critique())
///     .with_step("Editor", MessageBuilder::refine());
/// assert_eq!(pipeline.steps().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct NestedPipeline {
    trigger: String,
    steps: Vec<NestedStep>,
    seed: TriggerSeed,
}

/// Input and output of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub helper: String,
    pub input: String,
    pub output: String,
}

/// Everything a pipeline produced during one group round or conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedRecord {
    /// Zero-based group round, or the number of replies already made in a
    /// two-party run, at which the trigger fired.
    pub round: usize,
    pub trigger: String,
    /// Content that seeded step 0.
    pub seed: String,
    pub steps: Vec<StepRecord>,
    /// Final output, absent when the pipeline failed.
    pub output: Option<String>,
}

/// A failed pipeline with the steps completed before the failure.
#[derive(Debug)]
pub struct NestedFailure {
    pub failure: RunFailure,
    pub record: NestedRecord,
}

impl NestedPipeline {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            steps: Vec::new(),
            seed: TriggerSeed::default(),
        }
    }

    pub fn with_step(mut self, helper: impl Into<String>, builder: MessageBuilder) -> Self {
        self.steps.push(NestedStep {
            helper: helper.into(),
            builder,
        });
        self
    }

    pub fn with_seed(mut self, seed: TriggerSeed) -> Self {
        self.seed = seed;
        self
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn steps(&self) -> &[NestedStep] {
        &self.steps
    }

    pub fn seed(&self) -> TriggerSeed {
        self.seed
    }

    /// Checks that the pipeline has steps and names only known agents.
    pub(crate) fn validate<F>(&self, is_registered: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&str) -> bool,
    {
        if !is_registered(&self.trigger) {
            return Err(ConfigurationError::UnknownAgent {
                role: "trigger",
                name: self.trigger.clone(),
            });
        }
        if self.steps.is_empty() {
            return Err(ConfigurationError::EmptyPipeline(self.trigger.clone()));
        }
        if let Some(step) = self.steps.iter().find(|s| !is_registered(&s.helper)) {
            return Err(ConfigurationError::UnknownAgent {
                role: "helper",
                name: step.helper.clone(),
            });
        }
        Ok(())
    }

    /// Runs every step in order for group round `round`, seeding step 0
    /// according to [`TriggerSeed`].
    pub async fn run(
        &self,
        registry: &Registry,
        responder: &Responder,
        ctx: &BuilderContext,
        round: usize,
        transcript: &Transcript,
        cancel: &CancellationToken,
    ) -> Result<NestedRecord, NestedFailure> {
        let seed = match self.seed {
            TriggerSeed::PendingReply => {
                let reply = match registry.get(&self.trigger) {
                    Some(agent) => responder
                        .respond(agent, transcript)
                        .await
                        .map_err(|e| RunFailure::backend(&self.trigger, e)),
                    None => Err(self.unknown_trigger().into()),
                };
                match reply {
                    Ok(reply) => reply,
                    Err(failure) => {
                        return Err(NestedFailure {
                            failure,
                            record: self.empty_record(round),
                        });
                    }
                }
            }
            TriggerSeed::IncomingMessage => transcript
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
        };
        self.run_with_seed(registry, responder, ctx, round, seed, cancel)
            .await
    }

    /// Runs every step in order, starting from `seed` as step 0's input.
    ///
    /// Two-party runs call this directly with the trigger agent's latest
    /// reply, since that reply is already in the transcript.
    #[tracing::instrument(
        name = "nested.run",
        skip(self, registry, responder, ctx, seed, cancel),
        fields(trigger = %self.trigger, steps = self.steps.len())
    )]
    pub async fn run_with_seed(
        &self,
        registry: &Registry,
        responder: &Responder,
        ctx: &BuilderContext,
        round: usize,
        seed: String,
        cancel: &CancellationToken,
    ) -> Result<NestedRecord, NestedFailure> {
        let mut record = self.empty_record(round);

        let Some(trigger_agent) = registry.get(&self.trigger) else {
            return Err(NestedFailure {
                failure: self.unknown_trigger().into(),
                record,
            });
        };
        record.seed = seed.clone();

        let mut current = seed;
        for (index, step) in self.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(NestedFailure {
                    failure: RunFailure::Cancelled,
                    record,
                });
            }

            let Some(helper) = registry.get(&step.helper) else {
                let failure = ConfigurationError::UnknownAgent {
                    role: "helper",
                    name: step.helper.clone(),
                };
                return Err(NestedFailure {
                    failure: failure.into(),
                    record,
                });
            };

            let step_ctx = ctx.for_step(&self.trigger, &step.helper, index);
            let input = match step.builder.build(&current, &step_ctx) {
                Ok(input) => input,
                Err(e) => {
                    return Err(NestedFailure {
                        failure: e.into(),
                        record,
                    });
                }
            };

            let conversation = match Conversation::new(trigger_agent.clone(), helper.clone(), 1) {
                Ok(conversation) => conversation.with_termination(TerminationPredicate::never()),
                Err(e) => {
                    return Err(NestedFailure {
                        failure: e.into(),
                        record,
                    });
                }
            };

            match conversation.run_boxed(responder, input.clone(), cancel).await {
                Ok(outcome) => {
                    let output = outcome.last_content().to_string();
                    info!(
                        target: "llm_conclave::nested",
                        trigger = %self.trigger,
                        helper = %step.helper,
                        step = index,
                        event = "nested_step_completed"
                    );
                    record.steps.push(StepRecord {
                        helper: step.helper.clone(),
                        input,
                        output: output.clone(),
                    });
                    current = output;
                }
                Err(e) => {
                    error!(
                        target: "llm_conclave::nested",
                        trigger = %self.trigger,
                        helper = %step.helper,
                        step = index,
                        error = %e.failure,
                        event = "nested_step_failed"
                    );
                    return Err(NestedFailure {
                        failure: e.failure,
                        record,
                    });
                }
            }
        }

        record.output = Some(current);
        Ok(record)
    }

    fn empty_record(&self, round: usize) -> NestedRecord {
        NestedRecord {
            round,
            trigger: self.trigger.clone(),
            seed: String::new(),
            steps: Vec::with_capacity(self.steps.len()),
            output: None,
        }
    }

    fn unknown_trigger(&self) -> ConfigurationError {
        ConfigurationError::UnknownAgent {
            role: "trigger",
            name: self.trigger.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::backend::{BackendError, CompletionBackend};
    use crate::transcript::{Message, Recipient};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Replies `"<name>(<last content>)"`, failing for one agent.
    struct WrappingBackend {
        fail_for: Option<&'static str>,
    }

    #[async_trait]
    impl CompletionBackend for WrappingBackend {
        async fn complete(&self, history: &[Message], agent: &Agent) -> Result<String, BackendError> {
            if self.fail_for == Some(agent.name()) {
                return Err(BackendError::http(500, "boom"));
            }
            let last = history.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("{}({last})", agent.name()))
        }
    }

    fn registry(pipeline: NestedPipeline) -> Registry {
        Registry::register(
            vec![
                Agent::new("Writer", ""),
                Agent::new("Critic", ""),
                Agent::new("Editor", ""),
            ],
            vec![pipeline],
        )
        .unwrap()
    }

    fn outer_transcript() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.append("User_proxy", Recipient::Broadcast, "go");
        transcript
    }

    fn identity_pipeline() -> NestedPipeline {
        NestedPipeline::new("Writer")
            .with_step("Critic", MessageBuilder::identity())
            .with_step("Editor", MessageBuilder::identity())
    }

    #[tokio::test]
    async fn test_steps_chain_outputs() {
        let pipeline = identity_pipeline();
        let registry = registry(pipeline.clone());
        let responder = Responder::new(Arc::new(WrappingBackend { fail_for: None }));

        let record = pipeline
            .run(
                &registry,
                &responder,
                &BuilderContext::new("go"),
                1,
                &outer_transcript(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.round, 1);
        assert_eq!(record.seed, "Writer(go)");
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.steps[0].input, "Writer(go)");
        assert_eq!(record.steps[0].output, "Critic(Writer(go))");
        assert_eq!(record.steps[1].output, "Editor(Critic(Writer(go)))");
        assert_eq!(record.output.as_deref(), Some("Editor(Critic(Writer(go)))"));
    }

    #[tokio::test]
    async fn test_incoming_message_seed_skips_trigger_call() {
        let pipeline = NestedPipeline::new("Writer")
            .with_step("Critic", MessageBuilder::critique())
            .with_seed(TriggerSeed::IncomingMessage);
        let registry = registry(pipeline.clone());
        let responder = Responder::new(Arc::new(WrappingBackend {
            fail_for: Some("Writer"),
        }));

        let record = pipeline
            .run(
                &registry,
                &responder,
                &BuilderContext::new("go"),
                0,
                &outer_transcript(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.seed, "go");
        assert_eq!(
            record.steps[0].input,
            "Reflect and provide critique on the following writing. \n\n go"
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_completed_steps() {
        let pipeline = identity_pipeline();
        let registry = registry(pipeline.clone());
        let responder = Responder::new(Arc::new(WrappingBackend {
            fail_for: Some("Editor"),
        }));

        let failure = pipeline
            .run(
                &registry,
                &responder,
                &BuilderContext::new("go"),
                0,
                &outer_transcript(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(failure.failure, RunFailure::Backend { ref agent, .. } if agent == "Editor"));
        assert_eq!(failure.record.steps.len(), 1);
        assert!(failure.record.output.is_none());
    }

    #[test]
    fn test_validate() {
        let known = |name: &str| matches!(name, "Writer" | "Critic");

        assert!(identity_pipeline().validate(|n| known(n) || n == "Editor").is_ok());
        assert_eq!(
            NestedPipeline::new("Writer").validate(known).unwrap_err(),
            ConfigurationError::EmptyPipeline("Writer".into())
        );
        assert!(matches!(
            identity_pipeline().validate(known).unwrap_err(),
            ConfigurationError::UnknownAgent { role: "helper", .. }
        ));
        assert!(matches!(
            NestedPipeline::new("Ghost")
                .with_step("Critic", MessageBuilder::critique())
                .validate(known)
                .unwrap_err(),
            ConfigurationError::UnknownAgent { role: "trigger", .. }
        ));
    }
}
