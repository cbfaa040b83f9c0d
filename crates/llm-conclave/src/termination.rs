//! Termination predicates and outcomes.

use std::fmt;
use std::sync::Arc;

/// Sentinel that ends a run when a message finishes with it.
pub const DEFAULT_SENTINEL: &str = "TERMINATE";

/// Decides whether a message ends the run.
///
/// The default predicate fires when the message, with trailing whitespace
/// removed, ends with [`DEFAULT_SENTINEL`].
#[derive(Clone)]
pub struct TerminationPredicate {
    label: String,
    check: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl TerminationPredicate {
    /// Fires when the trimmed content ends with `sentinel`.
    pub fn sentinel(sentinel: impl Into<String>) -> Self {
        let sentinel = sentinel.into();
        Self {
            label: format!("ends-with({sentinel})"),
            check: Arc::new(move |content: &str| content.trim_end().ends_with(sentinel.as_str())),
        }
    }

    /// Never fires. Runs end only at their turn or round limit.
    pub fn never() -> Self {
        Self {
            label: "never".to_string(),
            check: Arc::new(|_| false),
        }
    }

    /// Wraps an arbitrary predicate.
    pub fn from_fn<F>(label: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            check: Arc::new(check),
        }
    }

    pub fn is_terminal(&self, content: &str) -> bool {
        (self.check)(content)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for TerminationPredicate {
    fn default() -> Self {
        Self::sentinel(DEFAULT_SENTINEL)
    }
}

impl fmt::Debug for TerminationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminationPredicate")
            .field("label", &self.label)
            .finish()
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The predicate fired on the most recent message.
    Predicate,
    /// The turn or round budget was used up.
    Limit,
}
