//! Produces one agent's turn.
//!
//! The agent's capabilities decide the source of the reply, in order:
//! human input, code execution of the incoming message, then the completion
//! backend. An agent with none of them that apply replies with an empty
//! message.

use crate::agent::{Agent, Capability};
use crate::backend::{BackendError, CompletionBackend, RetryPolicy, complete_with_retry};
use crate::executor::{Executor, extract_code_blocks, format_exec_result};
use crate::human::HumanInput;
use crate::transcript::Transcript;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared collaborators used to answer turns.
#[derive(Clone)]
pub struct Responder {
    backend: Arc<dyn CompletionBackend>,
    executor: Option<Arc<dyn Executor>>,
    human: Option<Arc<dyn HumanInput>>,
    retry: RetryPolicy,
}

impl Responder {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            executor: None,
            human: None,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_executor(mut self, executor: Option<Arc<dyn Executor>>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_human(mut self, human: Option<Arc<dyn HumanInput>>) -> Self {
        self.human = human;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &Arc<dyn CompletionBackend> {
        &self.backend
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Produces `agent`'s reply to the transcript so far.
    ///
    /// Only backend failures are errors. Execution failures are reported as
    /// the reply content.
    pub async fn respond(&self, agent: &Agent, transcript: &Transcript) -> Result<String, BackendError> {
        if agent.can(Capability::AcceptHumanInput)
            && let Some(human) = &self.human
            && let Some(answer) = human.prompt(agent, transcript.last()).await
            && !answer.trim().is_empty()
        {
            debug!(
                target: "llm_conclave::responder",
                agent = agent.name(),
                event = "human_reply"
            );
            return Ok(answer);
        }

        if agent.can(Capability::ExecuteCode)
            && let Some(executor) = &self.executor
            && let Some(incoming) = transcript.last()
        {
            let blocks = extract_code_blocks(&incoming.content);
            if !blocks.is_empty() {
                let output = match executor.execute(&blocks).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(
                            target: "llm_conclave::responder",
                            agent = agent.name(),
                            error = %e,
                            event = "code_execution_failed"
                        );
                        format_exec_result(1, &e.to_string())
                    }
                };
                return Ok(output);
            }
        }

        if agent.can(Capability::Converse) {
            return complete_with_retry(self.backend.as_ref(), transcript.messages(), agent, self.retry)
                .await;
        }

        Ok(String::new())
    }
}
