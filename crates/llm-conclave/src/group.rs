//! Round-robin group runs.
//!
//! The coordinator posts the seed and is never selected again. In round `r`
//! the speaker is `agents[r % N]` in registration order. An agent with a
//! nested pipeline has its turn replaced by the pipeline's final output, so a
//! trigger always costs exactly one round and one outer message.

use crate::agent::{Agent, Registry};
use crate::builder::BuilderContext;
use crate::error::{ConfigurationError, RunError, RunFailure};
use crate::nested::{NestedFailure, NestedRecord};
use crate::responder::Responder;
use crate::termination::{Termination, TerminationPredicate};
use crate::transcript::{Recipient, Transcript};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of a finished group run.
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub transcript: Transcript,
    pub nested: Vec<NestedRecord>,
    pub termination: Termination,
    /// Rounds played, not counting the seed.
    pub rounds: usize,
}

/// Group scheduler settings.
#[derive(Debug, Clone)]
pub struct GroupChat {
    max_rounds: usize,
    termination: TerminationPredicate,
}

impl GroupChat {
    pub fn new(max_rounds: usize) -> Result<Self, ConfigurationError> {
        if max_rounds == 0 {
            return Err(ConfigurationError::ZeroLimit { what: "max_rounds" });
        }
        Ok(Self {
            max_rounds,
            termination: TerminationPredicate::default(),
        })
    }

    pub fn with_termination(mut self, termination: TerminationPredicate) -> Self {
        self.termination = termination;
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Speaker selected for zero-based `round`.
    pub fn speaker_for_round(registry: &Registry, round: usize) -> Option<&Agent> {
        let agents = registry.agents();
        if agents.is_empty() {
            None
        } else {
            Some(&agents[round % agents.len()])
        }
    }

    /// Plays rounds until the predicate fires or the budget is spent.
    ///
    /// Any failure, including one inside a nested pipeline, ends the run with
    /// the transcript and nested records gathered so far.
    #[tracing::instrument(
        name = "group.run",
        skip(self, registry, coordinator, responder, seed, ctx, cancel),
        fields(
            coordinator = %coordinator.name(),
            agents = registry.len(),
            max_rounds = self.max_rounds,
        )
    )]
    pub async fn run(
        &self,
        registry: &Registry,
        coordinator: &Agent,
        responder: &Responder,
        seed: impl Into<String>,
        ctx: &BuilderContext,
        cancel: &CancellationToken,
    ) -> Result<GroupOutcome, RunError> {
        if registry.is_empty() {
            return Err(RunError::before_start(ConfigurationError::EmptyRegistry));
        }
        if registry.get(coordinator.name()).is_some() {
            return Err(RunError::before_start(ConfigurationError::CoordinatorConflict(
                coordinator.name().to_string(),
            )));
        }

        let mut transcript = Transcript::new();
        let mut nested: Vec<NestedRecord> = Vec::new();
        transcript.append(coordinator.name(), Recipient::Broadcast, seed);

        let mut round = 0;
        let termination = loop {
            let last = transcript.last().map(|m| m.content.as_str()).unwrap_or_default();
            if self.termination.is_terminal(last) {
                break Termination::Predicate;
            }
            if round >= self.max_rounds {
                break Termination::Limit;
            }
            if cancel.is_cancelled() {
                warn!(
                    target: "llm_conclave::group",
                    round,
                    event = "group_run_cancelled"
                );
                return Err(RunError::new(RunFailure::Cancelled, transcript).with_nested(nested));
            }

            let Some(speaker) = Self::speaker_for_round(registry, round) else {
                return Err(
                    RunError::new(ConfigurationError::EmptyRegistry, transcript).with_nested(nested)
                );
            };

            let content = if let Some(pipeline) = registry.trigger_for(speaker.name()) {
                match pipeline
                    .run(registry, responder, ctx, round, &transcript, cancel)
                    .await
                {
                    Ok(record) => {
                        let output = record.output.clone().unwrap_or_default();
                        nested.push(record);
                        output
                    }
                    Err(NestedFailure { failure, record }) => {
                        error!(
                            target: "llm_conclave::group",
                            round,
                            speaker = %speaker.name(),
                            error = %failure,
                            event = "nested_pipeline_failed"
                        );
                        nested.push(record);
                        return Err(RunError::new(failure, transcript).with_nested(nested));
                    }
                }
            } else {
                match responder.respond(speaker, &transcript).await {
                    Ok(content) => content,
                    Err(e) => {
                        error!(
                            target: "llm_conclave::group",
                            round,
                            speaker = %speaker.name(),
                            error = %e,
                            event = "group_turn_failed"
                        );
                        let failure = RunFailure::backend(speaker.name(), e);
                        return Err(RunError::new(failure, transcript).with_nested(nested));
                    }
                }
            };

            transcript.append(speaker.name(), Recipient::Broadcast, content);
            info!(
                target: "llm_conclave::group",
                round,
                speaker = %speaker.name(),
                event = "group_round_completed"
            );
            round += 1;
        };

        info!(
            target: "llm_conclave::group",
            rounds = round,
            termination = ?termination,
            event = "group_run_finished"
        );

        Ok(GroupOutcome {
            transcript,
            nested,
            termination,
            rounds: round,
        })
    }
}
