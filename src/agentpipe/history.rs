//! Append-only conversation log shared by the participants of one group chat.

use crate::client_wrapper::Role;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A single message in a group chat.
///
/// Messages are immutable once appended to a [`ChatHistory`]; the content is an
/// `Arc<str>` so handing copies to callers and transcripts is cheap.
///
/// ```
/// use agentpipe::history::ChatMessage;
/// use agentpipe::Role;
///
/// let seed = ChatMessage::user("Analyze this data");
/// assert!(seed.author.is_none());
///
/// let reply = ChatMessage::from_agent("checker", "Approved");
/// assert_eq!(reply.author.as_deref(), Some("checker"));
/// assert_eq!(reply.role, Role::Assistant);
/// ```
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// UTC timestamp recorded when the message was created.
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    /// Identifier of the agent that produced the message, `None` for user and
    /// system messages.
    pub author: Option<String>,
    pub content: Arc<str>,
}

impl ChatMessage {
    pub fn new(role: Role, author: Option<String>, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            role,
            author,
            content: Arc::from(content.into().as_str()),
        }
    }

    /// A user-role message with no author.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, None, content)
    }

    /// An assistant-role message attributed to `agent_id`.
    pub fn from_agent(agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(agent_id.into()), content)
    }
}

/// Errors raised by [`ChatHistory`] queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// `last()` was called before anything was appended.
    Empty,
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::Empty => write!(f, "Conversation history is empty"),
        }
    }
}

impl Error for HistoryError {}

/// Ordered, append-only sequence of [`ChatMessage`]s.
///
/// Insertion order defines turn order and "last message" semantics. There is
/// intentionally no way to remove or edit an entry.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// The most recently appended message.
    ///
    /// ```
    /// use agentpipe::history::{ChatHistory, ChatMessage, HistoryError};
    ///
    /// let mut history = ChatHistory::new();
    /// assert_eq!(history.last().unwrap_err(), HistoryError::Empty);
    ///
    /// history.append(ChatMessage::user("first"));
    /// history.append(ChatMessage::from_agent("a", "second"));
    /// assert_eq!(&*history.last().unwrap().content, "second");
    /// ```
    pub fn last(&self) -> Result<&ChatMessage, HistoryError> {
        self.messages.last().ok_or(HistoryError::Empty)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }
}
