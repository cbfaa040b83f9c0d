//! Group conversation with a nested review pipeline, driven by a mock backend.
//!
//! This example shows:
//! - Loading agents and triggers from a JSON registry config
//! - Running a round-robin group where the Writer's turn goes through a
//!   Critic and a FactChecker before it is posted
//! - Inspecting the transcript, the nested records and the summary
//!
//! Run with: cargo run --example group_review

use async_trait::async_trait;
use llm_conclave::observability::{self, ObservabilityConfig};
use llm_conclave::{
    Agent, BackendError, CompletionBackend, Engine, Message, RegistryConfig, RunConfig,
    SummaryMethod,
};
use std::sync::Arc;

const REGISTRY: &str = r#"{
  "agents": [
    {"name": "Writer", "instruction": "You write short technical notes."},
    {"name": "Reviewer", "instruction": "You approve or reject notes."},
    {"name": "Critic", "instruction": "You point out weaknesses."},
    {"name": "FactChecker", "instruction": "You verify claims."}
  ],
  "triggers": [
    {
      "trigger": "Writer",
      "steps": [
        {"helper": "Critic", "preset": "critique"},
        {"helper": "FactChecker", "template": "Check every claim below for {{ user_request }}.\n\n{{ content }}"}
      ]
    }
  ]
}"#;

/// Answers with canned text per agent.
struct MockBackend;

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, history: &[Message], agent: &Agent) -> Result<String, BackendError> {
        let turn = history.len();
        let reply = match agent.name() {
            "Writer" => format!("Draft {turn}: Rust moves values by default."),
            "Critic" => "The draft never mentions Copy types.".to_string(),
            "FactChecker" => {
                "Rust moves values by default; Copy types are duplicated instead.".to_string()
            }
            "Reviewer" if turn >= 3 => "Looks right to me. TERMINATE".to_string(),
            "Reviewer" => "Needs another pass.".to_string(),
            other => format!("{other} has nothing to add."),
        };
        Ok(reply)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init(ObservabilityConfig::default())?;

    let registry = RegistryConfig::from_json_str(REGISTRY)?.build()?;
    println!("📋 Registered {} agents", registry.len());

    let config = RunConfig {
        summary: SummaryMethod::LastMessage,
        ..RunConfig::group(6)
    };
    let engine = Engine::new(Arc::new(MockBackend));
    let report = engine
        .submit_request("Explain move semantics", Arc::new(registry), &config)
        .await?;

    println!("\n💬 Transcript ({} messages)", report.transcript.len());
    for message in &report.transcript {
        println!("  [{}] {}: {}", message.index, message.sender, message.content);
    }

    for record in &report.nested {
        println!("\n🔁 Round {} review of {}", record.round, record.trigger);
        for step in &record.steps {
            println!("  {} -> {}", step.helper, step.output);
        }
    }

    println!("\n🏁 Stopped by {:?}", report.termination);
    println!("📝 Summary: {}", report.summary);
    Ok(())
}
