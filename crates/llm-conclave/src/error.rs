//! Setup and run failures.
//!
//! [`ConfigurationError`] is only produced while building registries,
//! backends and run configurations; it aborts before any run starts.
//! [`RunError`] is the single fatal outcome of a run and always carries the
//! transcript accumulated up to the failure.

use crate::backend::BackendError;
use crate::builder::BuilderError;
use crate::context::FetchError;
use crate::nested::NestedRecord;
use crate::transcript::Transcript;
use thiserror::Error;

/// Invalid setup detected before a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("agent name must not be empty")]
    EmptyAgentName,

    #[error("agent '{0}' is registered more than once")]
    DuplicateAgent(String),

    #[error("{role} '{name}' is not a registered agent")]
    UnknownAgent { role: &'static str, name: String },

    #[error("agent '{0}' already has a nested pipeline")]
    DuplicateTrigger(String),

    #[error("nested pipeline for '{0}' has no steps")]
    EmptyPipeline(String),

    #[error("registry has no agents")]
    EmptyRegistry,

    #[error("coordinator '{0}' must not also be a registered agent")]
    CoordinatorConflict(String),

    #[error("{what} must be positive")]
    ZeroLimit { what: &'static str },

    #[error("invalid message template: {0}")]
    InvalidTemplate(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read configuration: {0}")]
    Io(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(err: serde_json::Error) -> Self {
        ConfigurationError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ConfigurationError {
    fn from(err: std::io::Error) -> Self {
        ConfigurationError::Io(err.to_string())
    }
}

/// What made a run fail.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("backend failed while '{agent}' was replying: {source}")]
    Backend {
        agent: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to fetch context: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to build nested message: {0}")]
    Builder(#[from] BuilderError),

    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("run was cancelled")]
    Cancelled,
}

impl RunFailure {
    pub fn backend(agent: impl Into<String>, source: BackendError) -> Self {
        RunFailure::Backend {
            agent: agent.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunFailure::Cancelled)
    }
}

/// A fatal run failure with everything produced before it.
#[derive(Debug, Error)]
#[error("run failed after {} messages: {failure}", transcript.len())]
pub struct RunError {
    #[source]
    pub failure: RunFailure,
    /// Messages appended before the failure. Never silently truncated.
    pub transcript: Transcript,
    /// Nested pipeline records, including a partial record for a pipeline
    /// that failed mid-way.
    pub nested: Vec<NestedRecord>,
}

impl RunError {
    pub fn new(failure: impl Into<RunFailure>, transcript: Transcript) -> Self {
        Self {
            failure: failure.into(),
            transcript,
            nested: Vec::new(),
        }
    }

    pub fn with_nested(mut self, nested: Vec<NestedRecord>) -> Self {
        self.nested = nested;
        self
    }

    /// A failure that happened before the first message was appended.
    pub fn before_start(failure: impl Into<RunFailure>) -> Self {
        Self::new(failure, Transcript::new())
    }
}
