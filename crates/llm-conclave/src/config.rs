//! Backend and run configuration.
//!
//! Both structs are explicit values handed to the engine. Nothing here is
//! read from global state after construction.

use crate::agent::{Agent, Capability, Registry};
use crate::backend::{CachedBackend, CompletionBackend, OpenAiCompatibleBackend, RetryPolicy};
use crate::error::ConfigurationError;
use crate::summary::SummaryMethod;
use crate::termination::TerminationPredicate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default coordinator name.
pub const DEFAULT_COORDINATOR: &str = "User_proxy";

/// Default preamble placed before the user request in the first message.
pub const DEFAULT_PREAMBLE: &str = "Anything inside three backtick code blocks will be executed \
by the coordinator, so only use them for commands you intend to run. \
Reply TERMINATE when the task is done.";

/// Connection settings for an OpenAI-compatible completion endpoint.
///
/// # Examples
///
/// ```ignore
/// use llm_conclave::config::BackendConfig;
///
/// let config = BackendConfig {
///     base_url: "http://127.0.0.1:5000/v1".into(),
///     cache_seed: Some(42),
///     ..Default::default()
/// };
/// let backend = config.build_backend()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    /// Bearer credential. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Enables the deterministic response cache.
    pub cache_seed: Option<u64>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            cache_seed: None,
            timeout_secs: 120,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl BackendConfig {
    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OPENAI_API_KEY` (optional; local servers usually need none)
    /// - `OPENAI_BASE_URL` (optional)
    /// - `OPENAI_MODEL` (optional, defaults to gpt-4o-mini)
    /// - `CONCLAVE_CACHE_SEED` (optional integer)
    pub fn try_from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            config.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            config.model = model;
        }
        if let Some(seed) = lookup("CONCLAVE_CACHE_SEED") {
            let parsed = seed
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigurationError::InvalidValue {
                    key: "CONCLAVE_CACHE_SEED".to_string(),
                    message: e.to_string(),
                })?;
            config.cache_seed = Some(parsed);
        }
        Ok(config)
    }

    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the HTTP backend, wrapped in a [`CachedBackend`] when a cache
    /// seed is set.
    pub fn build_backend(&self) -> Result<Arc<dyn CompletionBackend>, ConfigurationError> {
        let backend = OpenAiCompatibleBackend::from_config(self)?;
        Ok(match self.cache_seed {
            Some(seed) => Arc::new(CachedBackend::new(backend, seed)),
            None => Arc::new(backend),
        })
    }
}

/// How the agents of a run talk to each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Round-robin over every registered agent.
    Group { max_rounds: usize },
    /// The coordinator talks to a single registered agent.
    TwoParty { recipient: String, max_turns: usize },
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Group { max_rounds: 12 }
    }
}

/// Per-run settings for [`Engine::submit_request`](crate::engine::Engine::submit_request).
///
/// # Examples
///
/// ```ignore
/// use llm_conclave::config::{RunConfig, RunMode};
///
/// let config = RunConfig {
///     mode: RunMode::Group { max_rounds: 6 },
///     context: vec!["notes/brief.md".into()],
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    /// Participant that seeds the run. Never selected by round-robin.
    ///
    /// **Default:** `User_proxy` with code execution and human input.
    pub coordinator: Agent,
    pub summary: SummaryMethod,
    pub termination: TerminationPredicate,
    /// **Default:** no retries.
    pub retry: RetryPolicy,
    /// Text placed before the user request in the first message.
    pub preamble: String,
    /// Document identifiers (paths or URLs) spliced into the first message.
    pub context: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            coordinator: Agent::with_capabilities(
                DEFAULT_COORDINATOR,
                "A human admin.",
                [Capability::ExecuteCode, Capability::AcceptHumanInput],
            ),
            summary: SummaryMethod::default(),
            termination: TerminationPredicate::default(),
            retry: RetryPolicy::default(),
            preamble: DEFAULT_PREAMBLE.to_string(),
            context: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Two-party run against `recipient` with the default turn budget of 2.
    pub fn two_party(recipient: impl Into<String>) -> Self {
        Self {
            mode: RunMode::TwoParty {
                recipient: recipient.into(),
                max_turns: 2,
            },
            ..Default::default()
        }
    }

    /// Group run with `max_rounds`.
    pub fn group(max_rounds: usize) -> Self {
        Self {
            mode: RunMode::Group { max_rounds },
            ..Default::default()
        }
    }

    /// Checks the configuration against the registry the run will use.
    pub fn validate(&self, registry: &Registry) -> Result<(), ConfigurationError> {
        if self.coordinator.name().trim().is_empty() {
            return Err(ConfigurationError::EmptyAgentName);
        }
        if registry.get(self.coordinator.name()).is_some() {
            return Err(ConfigurationError::CoordinatorConflict(
                self.coordinator.name().to_string(),
            ));
        }

        match &self.mode {
            RunMode::Group { max_rounds } => {
                if *max_rounds == 0 {
                    return Err(ConfigurationError::ZeroLimit { what: "max_rounds" });
                }
                if registry.is_empty() {
                    return Err(ConfigurationError::EmptyRegistry);
                }
            }
            RunMode::TwoParty {
                recipient,
                max_turns,
            } => {
                if *max_turns == 0 {
                    return Err(ConfigurationError::ZeroLimit { what: "max_turns" });
                }
                if registry.get(recipient).is_none() {
                    return Err(ConfigurationError::UnknownAgent {
                        role: "recipient",
                        name: recipient.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
