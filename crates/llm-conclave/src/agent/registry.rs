//! Agent registry and its shared, atomically replaceable handle.
//!
//! A [`Registry`] is validated once at construction and never mutated.
//! [`SharedRegistry`] hands out `Arc` snapshots; [`SharedRegistry::replace`]
//! swaps in a freshly validated registry without touching snapshots that
//! running tasks already hold.

use super::Agent;
use crate::builder::{MessageBuilder, Preset};
use crate::error::ConfigurationError;
use crate::nested::{NestedPipeline, TriggerSeed};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Validated, immutable set of agents and their nested pipelines.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
    triggers: HashMap<String, NestedPipeline>,
}

impl Registry {
    /// Builds a registry, rejecting empty or duplicate names, pipelines that
    /// name unknown agents, pipelines without steps, and a second pipeline
    /// on the same trigger.
    pub fn register(
        agents: Vec<Agent>,
        triggers: Vec<NestedPipeline>,
    ) -> Result<Self, ConfigurationError> {
        let mut index = HashMap::with_capacity(agents.len());
        for (position, agent) in agents.iter().enumerate() {
            if agent.name().trim().is_empty() {
                return Err(ConfigurationError::EmptyAgentName);
            }
            if index.insert(agent.name().to_string(), position).is_some() {
                return Err(ConfigurationError::DuplicateAgent(agent.name().to_string()));
            }
        }

        let mut by_trigger = HashMap::with_capacity(triggers.len());
        for pipeline in triggers {
            pipeline.validate(|name| index.contains_key(name))?;
            let trigger = pipeline.trigger().to_string();
            if by_trigger.contains_key(&trigger) {
                return Err(ConfigurationError::DuplicateTrigger(trigger));
            }
            by_trigger.insert(trigger, pipeline);
        }

        Ok(Self {
            agents,
            index,
            triggers: by_trigger,
        })
    }

    /// Agents in registration order. Round-robin follows this order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.index.get(name).map(|&i| &self.agents[i])
    }

    pub fn trigger_for(&self, name: &str) -> Option<&NestedPipeline> {
        self.triggers.get(name)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Thread-safe handle whose contents are replaced wholesale.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    current: RwLock<Arc<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// The registry as of now. Later replacements do not affect it.
    pub fn snapshot(&self) -> Arc<Registry> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Validates and installs a new registry, returning the previous one.
    ///
    /// On error the current registry stays in place.
    pub fn replace(
        &self,
        agents: Vec<Agent>,
        triggers: Vec<NestedPipeline>,
    ) -> Result<Arc<Registry>, ConfigurationError> {
        let next = Registry::register(agents, triggers)?;
        Ok(self.install(next))
    }

    /// Installs an already validated registry, returning the previous one.
    pub fn install(&self, registry: Registry) -> Arc<Registry> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(registry))
    }
}

/// How a pipeline step builds its message in a JSON configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StepBuilderSpec {
    Preset { preset: Preset },
    Template { template: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    pub helper: String,
    #[serde(flatten)]
    pub builder: StepBuilderSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerSpec {
    pub trigger: String,
    #[serde(default)]
    pub seed: TriggerSeed,
    pub steps: Vec<StepSpec>,
}

/// Serializable description of a registry.
///
/// ```json
/// {
///   "agents": [
///     {"name": "Writer", "instruction": "You write blog posts."},
///     {"name": "Critic", "instruction": "You review writing."}
///   ],
///   "triggers": [
///     {"trigger": "Writer", "steps": [{"helper": "Critic", "preset": "critique"}]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
}

impl RegistryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Compiles templates and validates the result.
    pub fn build(self) -> Result<Registry, ConfigurationError> {
        let mut pipelines = Vec::with_capacity(self.triggers.len());
        for spec in self.triggers {
            let mut pipeline = NestedPipeline::new(spec.trigger).with_seed(spec.seed);
            for step in spec.steps {
                let builder = match step.builder {
                    StepBuilderSpec::Preset { preset } => MessageBuilder::preset(preset),
                    StepBuilderSpec::Template { template } => MessageBuilder::template(template)
                        .map_err(|e| ConfigurationError::InvalidTemplate(e.to_string()))?,
                };
                pipeline = pipeline.with_step(step.helper, builder);
            }
            pipelines.push(pipeline);
        }
        Registry::register(self.agents, pipelines)
    }
}
