//! Backend abstraction shared by every agent.
//!
//! A [`ClientWrapper`] is a wrapper around a specific chat-completion service.
//! It does not keep track of any conversation: agents rebuild the full prompt
//! from their [`ChatHistory`](crate::history::ChatHistory) on every turn and
//! hand it to the wrapper, which performs exactly one request.
//!
//! # Example
//!
//! ```rust
//! use agentpipe::client_wrapper::{ClientWrapper, Message, Role};
//! use async_trait::async_trait;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ClientWrapper for Echo {
//!     async fn send_message(
//!         &self,
//!         messages: &[Message],
//!     ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
//!         let last = messages.last().map(|m| m.content.clone()).unwrap_or_else(|| "".into());
//!         Ok(Message::new(Role::Assistant, last.as_ref()))
//!     }
//!
//!     fn model_name(&self) -> &str {
//!         "echo"
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Set by the developer to steer the model's responses.
    System,
    /// A message sent by a human user (or by the orchestrator on their behalf).
    User,
    /// Content generated by the model.
    Assistant,
}

impl Role {
    /// Wire name used by OpenAI-compatible chat APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// A single prompt message sent to (or received from) a backend.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The message body. Stored as `Arc<str>` so cloning prompts is cheap.
    pub content: Arc<str>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: Arc::from(content),
        }
    }
}

/// Trait defining the interface to a chat-completion backend.
///
/// Implementations must be shareable across agents: the orchestrator hands the
/// same `Arc<dyn ClientWrapper>` to every agent of every stage.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the full prompt to the model and return its reply.
    ///
    /// Any error is treated by callers as the backend being unavailable; the
    /// wrapper itself should not retry.
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Model or deployment identifier used for logging.
    fn model_name(&self) -> &str;

    /// Usage reported by the *last* `send_message()` call.
    ///
    /// The default implementation reads [`usage_slot`](ClientWrapper::usage_slot),
    /// so wrappers that do not track usage get `None` for free.
    async fn get_last_usage(&self) -> Option<TokenUsage> {
        match self.usage_slot() {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        }
    }

    /// Wrappers supporting [`TokenUsage`] tracking return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}
