//! Request entry point.
//!
//! [`Engine`] owns the collaborators shared by every run (completion backend,
//! executor, human input, context provider). Each call to
//! [`Engine::submit_request`] builds the opening message, plays a group or
//! two-party run against a registry snapshot, and summarizes the result.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_conclave::{Engine, RunConfig, Registry};
//!
//! let engine = Engine::new(BackendConfig::try_from_env()?.build_backend()?);
//! let report = engine
//!     .submit_request("Write a post about ownership", registry.snapshot(), &RunConfig::default())
//!     .await?;
//! println!("{}", report.summary);
//! ```

use crate::agent::Registry;
use crate::backend::CompletionBackend;
use crate::builder::{BuilderContext, initial_message};
use crate::config::{RunConfig, RunMode};
use crate::context::{ContextProvider, RoutingContextProvider, fetch_all};
use crate::conversation::Conversation;
use crate::error::{ConfigurationError, RunError, RunFailure};
use crate::executor::Executor;
use crate::group::GroupChat;
use crate::human::HumanInput;
use crate::nested::NestedRecord;
use crate::responder::Responder;
use crate::summary::{SUMMARIZER_NAME, summarize};
use crate::termination::Termination;
use crate::transcript::Transcript;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub transcript: Transcript,
    /// Nested pipeline records in the order they ran.
    pub nested: Vec<NestedRecord>,
    pub termination: Termination,
    pub summary: String,
}

impl RunReport {
    /// Writes the report as pretty-printed JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

/// Runs user requests against agent registries.
#[derive(Clone)]
pub struct Engine {
    backend: Arc<dyn CompletionBackend>,
    executor: Option<Arc<dyn Executor>>,
    human: Option<Arc<dyn HumanInput>>,
    context: Arc<dyn ContextProvider>,
}

impl Engine {
    /// Creates an engine that reads context from files and URLs and has no
    /// executor or human input.
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            executor: None,
            human: None,
            context: Arc::new(RoutingContextProvider::default()),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_human_input(mut self, human: Arc<dyn HumanInput>) -> Self {
        self.human = Some(human);
        self
    }

    pub fn with_context_provider(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    fn responder(&self, config: &RunConfig) -> Responder {
        Responder::new(Arc::clone(&self.backend))
            .with_executor(self.executor.clone())
            .with_human(self.human.clone())
            .with_retry(config.retry)
    }

    /// Runs `user_text` to completion.
    pub async fn submit_request(
        &self,
        user_text: &str,
        registry: Arc<Registry>,
        config: &RunConfig,
    ) -> Result<RunReport, RunError> {
        self.submit_request_with_cancellation(user_text, registry, config, CancellationToken::new())
            .await
    }

    /// Runs `user_text`, checking `cancel` before every turn and round.
    /// A run whose last round has finished is summarized even if `cancel`
    /// fires during that round.
    ///
    /// Configuration and context errors are reported before the first
    /// message exists. Every later failure carries the transcript so far.
    #[tracing::instrument(
        name = "engine.submit_request",
        skip(self, user_text, registry, config, cancel),
        fields(agents = registry.len(), mode = ?config.mode)
    )]
    pub async fn submit_request_with_cancellation(
        &self,
        user_text: &str,
        registry: Arc<Registry>,
        config: &RunConfig,
        cancel: CancellationToken,
    ) -> Result<RunReport, RunError> {
        config.validate(&registry).map_err(RunError::before_start)?;

        let documents = fetch_all(self.context.as_ref(), &config.context)
            .await
            .map_err(RunError::before_start)?;
        let seed = initial_message(&config.preamble, user_text, &documents)
            .map_err(RunError::before_start)?;

        let responder = self.responder(config);
        let ctx = BuilderContext::new(user_text);

        let (transcript, nested, termination) = match &config.mode {
            RunMode::Group { max_rounds } => {
                let group = GroupChat::new(*max_rounds)
                    .map_err(RunError::before_start)?
                    .with_termination(config.termination.clone());
                let outcome = group
                    .run(&registry, &config.coordinator, &responder, seed, &ctx, &cancel)
                    .await?;
                (outcome.transcript, outcome.nested, outcome.termination)
            }
            RunMode::TwoParty {
                recipient,
                max_turns,
            } => {
                let recipient = registry.get(recipient).cloned().ok_or_else(|| {
                    RunError::before_start(ConfigurationError::UnknownAgent {
                        role: "recipient",
                        name: recipient.clone(),
                    })
                })?;
                let conversation =
                    Conversation::new(config.coordinator.clone(), recipient, *max_turns)
                        .map_err(RunError::before_start)?
                        .with_termination(config.termination.clone())
                        .with_triggers(Arc::clone(&registry), ctx.clone());
                let outcome = conversation.run(&responder, seed, &cancel).await?;
                let termination = outcome.state.termination().unwrap_or(Termination::Limit);
                (outcome.transcript, outcome.nested, termination)
            }
        };

        let summary = match summarize(
            &transcript,
            &config.summary,
            responder.backend().as_ref(),
            config.retry,
        )
        .await
        {
            Ok(summary) => summary,
            Err(e) => {
                let failure = RunFailure::backend(SUMMARIZER_NAME, e);
                return Err(RunError::new(failure, transcript).with_nested(nested));
            }
        };

        info!(
            target: "llm_conclave::engine",
            messages = transcript.len(),
            nested = nested.len(),
            termination = ?termination,
            event = "request_completed"
        );

        Ok(RunReport {
            transcript,
            nested,
            termination,
            summary,
        })
    }
}
