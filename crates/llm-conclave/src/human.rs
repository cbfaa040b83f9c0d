//! Human-in-the-loop input.

use crate::agent::Agent;
use crate::termination::DEFAULT_SENTINEL;
use crate::transcript::Message;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;

/// Source of human replies for agents with
/// [`Capability::AcceptHumanInput`](crate::agent::Capability::AcceptHumanInput).
///
/// Returning `None` or an empty string skips the human and lets the agent
/// answer automatically.
#[async_trait]
pub trait HumanInput: Send + Sync {
    async fn prompt(&self, agent: &Agent, last: Option<&Message>) -> Option<String>;
}

/// Writes a prompt and reads one line per call.
///
/// The reader is kept for the lifetime of the value, so lines that arrive
/// together (piped input) are handed out one prompt at a time.
#[derive(Debug)]
pub struct LineHumanInput<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

/// [`LineHumanInput`] over the process's stdin and stdout.
pub type StdinHumanInput = LineHumanInput<BufReader<Stdin>, Stdout>;

impl<R, W> LineHumanInput<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl Default for LineHumanInput<BufReader<Stdin>, Stdout> {
    fn default() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

fn render_prompt(agent: &Agent, last: Option<&Message>) -> String {
    let header = match last {
        Some(message) => format!(
            "\n[{}] {} said:\n{}\n",
            agent.name(),
            message.sender,
            message.content
        ),
        None => format!("\n[{}]\n", agent.name()),
    };
    format!(
        "{header}Reply as {} (press enter to skip, or type 'exit' to end): ",
        agent.name()
    )
}

#[async_trait]
impl<R, W> HumanInput for LineHumanInput<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn prompt(&self, agent: &Agent, last: Option<&Message>) -> Option<String> {
        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(render_prompt(agent, last).as_bytes())
                .await
                .ok()?;
            writer.flush().await.ok()?;
        }

        let mut line = String::new();
        self.reader.lock().await.read_line(&mut line).await.ok()?;

        match line.trim() {
            "" => None,
            "exit" => Some(DEFAULT_SENTINEL.to_string()),
            answer => Some(answer.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(input: &'static str) -> LineHumanInput<&'static [u8], tokio::io::Sink> {
        LineHumanInput::new(input.as_bytes(), tokio::io::sink())
    }

    #[tokio::test]
    async fn test_lines_read_in_one_chunk_are_not_lost() {
        let human = scripted("yes\nno\n");
        let agent = Agent::new("User_proxy", "");

        assert_eq!(human.prompt(&agent, None).await.as_deref(), Some("yes"));
        assert_eq!(human.prompt(&agent, None).await.as_deref(), Some("no"));
        assert_eq!(human.prompt(&agent, None).await, None);
    }

    #[tokio::test]
    async fn test_blank_skips_and_exit_terminates() {
        let human = scripted("\n  exit  \n");
        let agent = Agent::new("User_proxy", "");

        assert_eq!(human.prompt(&agent, None).await, None);
        assert_eq!(
            human.prompt(&agent, None).await.as_deref(),
            Some(DEFAULT_SENTINEL)
        );
    }

    #[tokio::test]
    async fn test_prompt_names_previous_sender() {
        let human = LineHumanInput::new("ok\n".as_bytes(), Vec::new());
        let mut transcript = crate::transcript::Transcript::new();
        let last = transcript
            .append("Writer", crate::transcript::Recipient::agent("User_proxy"), "Draft 1")
            .clone();

        human
            .prompt(&Agent::new("User_proxy", ""), Some(&last))
            .await
            .unwrap();

        let written = String::from_utf8(human.writer.into_inner()).unwrap();
        assert!(written.contains("[User_proxy] Writer said:\nDraft 1"));
        assert!(written.contains("Reply as User_proxy"));
    }
}
