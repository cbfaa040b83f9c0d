//! Code execution capability.
//!
//! Agents with [`Capability::ExecuteCode`](crate::agent::Capability) run the
//! fenced code blocks found in the message addressed to them. Execution
//! results, including failures, become the content of that agent's turn.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// A fenced block extracted from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Info string after the opening fence, lowercased. Empty when absent.
    pub language: String,
    pub code: String,
}

impl CodeBlock {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }
}

/// Extracts every fenced code block from `text`, in order.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let Ok(regex) = Regex::new(r"(?m)^\s*```[ \t]*([\w+#.-]*)[^\n]*\n((?:.*\n)*?)^\s*```\s*$") else {
        return Vec::new();
    };

    regex
        .captures_iter(text)
        .filter_map(|captures| {
            let language = captures.get(1)?.as_str().to_ascii_lowercase();
            let code = captures.get(2)?.as_str().trim_end().to_string();
            Some(CodeBlock { language, code })
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs code blocks and reports their combined output.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, blocks: &[CodeBlock]) -> Result<String, ExecError>;
}

/// Formats an execution result the way it is shown in transcripts.
pub fn format_exec_result(exit_code: i32, output: &str) -> String {
    let status = if exit_code == 0 { "succeeded" } else { "failed" };
    format!("exitcode: {exit_code} (execution {status})\nCode output: {output}")
}

/// Executes shell and Python blocks as local processes in a working directory.
///
/// Blocks run sequentially; the first non-zero exit stops the batch.
#[derive(Debug, Clone)]
pub struct LocalCommandExecutor {
    work_dir: PathBuf,
    timeout: Duration,
}

impl Default for LocalCommandExecutor {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("coding"),
            timeout: Duration::from_secs(60),
        }
    }
}

impl LocalCommandExecutor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn interpreter(language: &str) -> Option<&'static str> {
        match language {
            "" | "sh" | "shell" | "console" => Some("sh"),
            "bash" => Some("bash"),
            "python" | "py" | "python3" => Some("python3"),
            _ => None,
        }
    }

    async fn run_block(&self, block: &CodeBlock) -> Result<(i32, String), ExecError> {
        let program = Self::interpreter(&block.language)
            .ok_or_else(|| ExecError::UnsupportedLanguage(block.language.clone()))?;

        let child = Command::new(program)
            .arg("-c")
            .arg(&block.code)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout(self.timeout))??;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok((output.status.code().unwrap_or(-1), text))
    }
}

#[async_trait]
impl Executor for LocalCommandExecutor {
    async fn execute(&self, blocks: &[CodeBlock]) -> Result<String, ExecError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let mut exit_code = 0;
        let mut combined = String::new();
        for block in blocks {
            let (code, output) = self.run_block(block).await?;
            tracing::debug!(
                target: "llm_conclave::executor",
                language = %block.language,
                exit_code = code,
                event = "code_block_executed"
            );
            combined.push_str(&output);
            exit_code = code;
            if code != 0 {
                break;
            }
        }

        Ok(format_exec_result(exit_code, &combined))
    }
}
