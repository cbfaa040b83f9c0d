//! Group review against an OpenAI-compatible endpoint.
//!
//! Reads `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL` and
//! `CONCLAVE_CACHE_SEED` from the environment. Any arguments after the
//! request are treated as context document identifiers.
//!
//! Run with:
//!   cargo run --example openai_group -- "Write a blog post about borrow checking" notes.md
//!
//! The finished run is saved to `conclave_report.json`.

use llm_conclave::builder::MessageBuilder;
use llm_conclave::executor::LocalCommandExecutor;
use llm_conclave::human::StdinHumanInput;
use llm_conclave::observability::{self, ObservabilityConfig};
use llm_conclave::{
    Agent, BackendConfig, Capability, Engine, NestedPipeline, Registry, RetryPolicy, RunConfig,
};
use std::sync::Arc;

fn build_registry() -> anyhow::Result<Registry> {
    let agents = vec![
        Agent::new(
            "Writer",
            "You are a professional writer. Polish your writing based on the feedback you receive \
             and reply TERMINATE when the piece is final.",
        ),
        Agent::with_capabilities(
            "Engineer",
            "You check technical claims. When a claim can be demonstrated, reply with a short \
             sh or python code block.",
            [Capability::Converse, Capability::ExecuteCode],
        ),
        Agent::new(
            "Critic",
            "You are a critic. Review the work of the writer and give concrete suggestions.",
        ),
        Agent::new(
            "FactChecker",
            "You verify every factual statement and correct the ones that are wrong.",
        ),
    ];
    let review = NestedPipeline::new("Writer")
        .with_step("Critic", MessageBuilder::critique())
        .with_step("FactChecker", MessageBuilder::fact_check());

    Ok(Registry::register(agents, vec![review])?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init(ObservabilityConfig::default())?;

    let mut args = std::env::args().skip(1);
    let request = args
        .next()
        .unwrap_or_else(|| "Write a short blog post about the Rust borrow checker.".to_string());
    let context: Vec<String> = args.collect();

    let backend = BackendConfig::try_from_env()?.build_backend()?;
    let engine = Engine::new(backend)
        .with_executor(Arc::new(LocalCommandExecutor::default()))
        .with_human_input(Arc::new(StdinHumanInput::default()));

    let config = RunConfig {
        retry: RetryPolicy::with_max_retries(3),
        context,
        ..RunConfig::group(12)
    };

    println!("🚀 Submitting: {request}");
    match engine
        .submit_request(&request, Arc::new(build_registry()?), &config)
        .await
    {
        Ok(report) => {
            println!(
                "✅ Finished after {} messages ({:?})",
                report.transcript.len(),
                report.termination
            );
            println!("\n{}", report.summary);
            report.save_json("conclave_report.json")?;
            println!("\n💾 Saved conclave_report.json");
        }
        Err(e) => {
            eprintln!("❌ {e}");
            eprintln!("{}", e.transcript.render_plain());
            return Err(e.into());
        }
    }
    Ok(())
}
