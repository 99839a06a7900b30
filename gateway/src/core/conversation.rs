//! Ordered turn history shared by both transports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One conversation turn, serialized as `{role, content}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Append-only record of exchanged messages in chronological order.
///
/// Besides [`clear`](Self::clear), entries are only removed to roll back an
/// optimistically appended user turn whose round-trip failed
/// ([`pop_last`](Self::pop_last) over HTTP, [`retract`](Self::retract) over
/// the realtime socket, where later events may already have been appended).
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log seeded with a single system message.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Insert at `index`, or append when `index` is past the end.
    ///
    /// Used for turns that are reported after later turns were logged, such
    /// as an input transcription arriving after the assistant's answer.
    pub fn insert(&mut self, index: usize, message: Message) {
        let index = index.min(self.messages.len());
        self.messages.insert(index, message);
    }

    pub fn pop_last(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    /// Remove the most recent entry equal to `message`.
    pub fn retract(&mut self, message: &Message) -> bool {
        match self.messages.iter().rposition(|m| m == message) {
            Some(pos) => {
                self.messages.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Read-only copy of the messages in insertion order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
