//! Append-only message log shared by conversations and group runs.
//!
//! A [`Transcript`] is owned by exactly one run. Messages receive their
//! ordinal index when appended and are never modified afterwards.
//! [`Transcript::append`] is the only mutating operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Addressee of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Recipient {
    /// A single named agent.
    Agent(String),
    /// Every participant of the group.
    Broadcast,
}

impl Recipient {
    pub fn agent(name: impl Into<String>) -> Self {
        Recipient::Agent(name.into())
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Agent(name) => write!(f, "{name}"),
            Recipient::Broadcast => write!(f, "*"),
        }
    }
}

/// A single immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Position in the owning transcript, starting at 0.
    pub index: usize,
    pub sender: String,
    pub recipient: Recipient,
    pub content: String,
}

/// Ordered, append-only sequence of [`Message`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns it with its assigned index.
    pub fn append(
        &mut self,
        sender: impl Into<String>,
        recipient: Recipient,
        content: impl Into<String>,
    ) -> &Message {
        let index = self.messages.len();
        self.messages.push(Message {
            index,
            sender: sender.into(),
            recipient,
            content: content.into(),
        });
        &self.messages[index]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Sender names in append order.
    pub fn senders(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.sender.as_str()).collect()
    }

    /// Renders the transcript as `sender: content` blocks separated by blank lines.
    pub fn render_plain(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.sender, m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Writes the transcript to `path` as pretty-printed JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Reads a transcript previously written by [`Transcript::save_json`].
    ///
    /// Indices are reassigned on load so the result always satisfies the
    /// `index == position` invariant.
    pub fn load_json(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let loaded: Transcript = serde_json::from_str(&json)?;
        let mut transcript = Transcript::new();
        for message in loaded.messages {
            transcript.append(message.sender, message.recipient, message.content);
        }
        Ok(transcript)
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
