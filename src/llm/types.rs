//! Common types for model interactions

use super::LlmError;
use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in the request context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[allow(dead_code)] // Constructor for API completeness
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One item of a streamed completion.
///
/// A well-behaved stream is zero or more `Delta`s followed by exactly one
/// `Done`, or is cut short by a single `Error`. Nothing follows a terminal
/// event.
#[derive(Debug)]
pub enum StreamEvent {
    /// An incremental piece of assistant text, in arrival order.
    Delta(String),
    /// End-of-stream: no further fragments will arrive.
    Done,
    /// The capability failed mid-stream.
    Error(LlmError),
}
