//! # Observability
//!
//! One-call setup for tracing output. Engine events are emitted under the
//! `llm_conclave::*` targets; retry diagnostics go through the `log` facade
//! and are bridged into the same subscriber.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum level captured for `llm_conclave` targets.
    pub level: Level,
    pub target: LogTarget,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
            json: false,
        }
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Log to stderr.
    #[default]
    Console,
    /// Log to a file, truncating it first.
    File(String),
}

/// Builds the filter: `RUST_LOG` directives plus `llm_conclave=<level>`.
pub fn env_filter(level: Level) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env().add_directive(format!("llm_conclave={level}").parse()?))
}

/// Installs the global subscriber and the `log` bridge.
///
/// Call once at startup. A second call returns an error instead of
/// replacing the existing subscriber.
pub fn init(config: ObservabilityConfig) -> anyhow::Result<()> {
    let filter = env_filter(config.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    match (config.target, config.json) {
        (LogTarget::Console, false) => {
            tracing::subscriber::set_global_default(
                registry.with(fmt::layer().with_writer(std::io::stderr)),
            )?;
        }
        (LogTarget::Console, true) => {
            tracing::subscriber::set_global_default(
                registry.with(fmt::layer().json().with_writer(std::io::stderr)),
            )?;
        }
        (LogTarget::File(path), json) => {
            let file = std::fs::File::create(path)?;
            let layer = fmt::layer().with_writer(file).with_ansi(false);
            if json {
                tracing::subscriber::set_global_default(registry.with(layer.json()))?;
            } else {
                tracing::subscriber::set_global_default(registry.with(layer))?;
            }
        }
    }

    tracing_log::LogTracer::init()?;
    Ok(())
}
