//! Message and response types for the chat API.

use serde::{Deserialize, Serialize};

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One complete batched reply from the chat API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    /// The full reply text.
    pub message: String,
}

/// One increment of a streamed reply.
///
/// `message` carries the full cumulative text so far, not a delta:
/// index 0 is the first visible fragment and later chunks replace
/// everything previously displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Monotonically increasing chunk index, starting at 0.
    pub index: usize,
    /// Cumulative reply text up to and including this chunk.
    pub message: String,
}
