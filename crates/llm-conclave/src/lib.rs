//! # llm-conclave
//!
//! Coordinates several LLM-backed agents so that together they answer one
//! user request.
//!
//! A run starts from a coordinator message built out of the request and any
//! context documents. Registered agents then speak in round-robin order
//! ([`group`]), or a single agent answers the coordinator ([`conversation`]).
//! An agent can carry a nested review pipeline ([`nested`]) whose final
//! output replaces its turn. Runs stop when a message ends with the
//! termination sentinel or the round budget is spent, and finish with a
//! [`summary`].
//!
//! The engine talks to models only through [`CompletionBackend`], reads
//! documents through [`ContextProvider`] and runs code through [`Executor`],
//! so every collaborator can be replaced in tests.
//!
//! ```rust,ignore
//! use llm_conclave::{Agent, Engine, NestedPipeline, Registry, RunConfig};
//! use llm_conclave::builder::MessageBuilder;
//!
//! let registry = Registry::register(
//!     vec![Agent::new("Writer", "You write."), Agent::new("Critic", "You critique.")],
//!     vec![NestedPipeline::new("Writer").with_step("Critic", MessageBuilder::critique())],
//! )?;
//! let report = engine
//!     .submit_request("Draft a release note", Arc::new(registry), &RunConfig::group(4))
//!     .await?;
//! ```

pub mod agent;
pub mod backend;
pub mod builder;
pub mod config;
pub mod context;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod executor;
pub mod group;
pub mod human;
pub mod nested;
pub mod observability;
pub mod responder;
pub mod summary;
pub mod termination;
pub mod transcript;

pub use agent::{Agent, Capability, Registry, RegistryConfig, SharedRegistry};
pub use backend::{BackendError, BackendErrorKind, CompletionBackend, RetryPolicy};
pub use config::{BackendConfig, RunConfig, RunMode};
pub use context::{ContextProvider, FetchError};
pub use engine::{Engine, RunReport};
pub use error::{ConfigurationError, RunError, RunFailure};
pub use executor::{ExecError, Executor};
pub use nested::{NestedPipeline, NestedRecord};
pub use summary::SummaryMethod;
pub use termination::{Termination, TerminationPredicate};
pub use transcript::{Message, Recipient, Transcript};
