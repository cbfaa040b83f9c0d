//! Structured tracing emitted by group runs.

use async_trait::async_trait;
use llm_conclave::builder::MessageBuilder;
use llm_conclave::{
    Agent, BackendError, CompletionBackend, Engine, Message, NestedPipeline, Registry, RunConfig,
    RunMode, SummaryMethod,
};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::FmtSpan;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// Captures tracing output to a string for verification
#[derive(Clone)]
struct TestWriter {
    output: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl TestWriter {
    fn new() -> Self {
        Self {
            output: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    fn get_output(&self) -> String {
        let bytes = self.output.lock().unwrap();
        String::from_utf8_lossy(&bytes).to_string()
    }
}

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.output.lock().unwrap().flush()
    }
}

impl<'a> MakeWriter<'a> for TestWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

struct EchoBackend;

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(&self, _history: &[Message], agent: &Agent) -> Result<String, BackendError> {
        Ok(format!("{} replied", agent.name()))
    }
}

// ============================================================================
// Tracing Tests
// ============================================================================

#[tokio::test]
async fn test_group_run_events() {
    let writer = TestWriter::new();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_ansi(false)
        .with_writer(writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let registry = Registry::register(
        vec![Agent::new("Writer", ""), Agent::new("Critic", "")],
        vec![NestedPipeline::new("Writer").with_step("Critic", MessageBuilder::critique())],
    )
    .unwrap();
    let config = RunConfig {
        mode: RunMode::Group { max_rounds: 2 },
        summary: SummaryMethod::LastMessage,
        ..Default::default()
    };

    Engine::new(Arc::new(EchoBackend))
        .submit_request("go", Arc::new(registry), &config)
        .await
        .unwrap();

    let output = writer.get_output();

    assert!(
        output.contains("engine.submit_request"),
        "Top-level span not found in output:\n{}",
        output
    );
    assert!(
        output.contains("group.run"),
        "Group span not found in output:\n{}",
        output
    );
    assert!(
        output.contains("nested.run"),
        "Nested span not found in output:\n{}",
        output
    );
    assert!(
        output.contains("group_round_completed"),
        "Round events not found in output:\n{}",
        output
    );
    assert!(
        output.contains("speaker=Writer") && output.contains("speaker=Critic"),
        "Speaker fields not found in output:\n{}",
        output
    );
    assert!(
        output.contains("nested_step_completed"),
        "Nested step event not found in output:\n{}",
        output
    );
    assert!(
        output.contains("group_run_finished"),
        "Finish event not found in output:\n{}",
        output
    );
}
