//! Agent definitions.
//!
//! An [`Agent`] is a named participant with a system instruction and a set
//! of [`Capability`]s. Agents are plain immutable values; changing one means
//! building a new [`Registry`](registry::Registry).

pub mod registry;

pub use registry::{Registry, RegistryConfig, SharedRegistry};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What an agent is allowed to do on its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Reply through the completion backend.
    Converse,
    /// Run fenced code blocks found in the incoming message.
    ExecuteCode,
    /// Ask a human for the turn's content before anything else.
    AcceptHumanInput,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Capability::Converse => "converse",
            Capability::ExecuteCode => "execute-code",
            Capability::AcceptHumanInput => "accept-human-input",
        };
        f.write_str(label)
    }
}

fn default_capabilities() -> BTreeSet<Capability> {
    BTreeSet::from([Capability::Converse])
}

/// A named conversational participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    name: String,
    #[serde(default, alias = "system_message")]
    instruction: String,
    #[serde(default = "default_capabilities")]
    capabilities: BTreeSet<Capability>,
}

impl Agent {
    /// Creates a conversing agent.
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            capabilities: default_capabilities(),
        }
    }

    /// Creates an agent with an explicit capability set.
    pub fn with_capabilities(
        name: impl Into<String>,
        instruction: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// Adds a capability.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
