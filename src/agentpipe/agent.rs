//! Agent System
//!
//! This module provides the [`Participant`] trait, the single operation a group
//! chat needs from its members, and [`Agent`], the LLM-backed implementation.
//!
//! An agent is stateless beyond its identity: it holds immutable persona
//! instructions and a shared backend handle. Every turn rebuilds the prompt
//! from the chat's full history and calls the backend exactly once. Failures
//! are never retried here; retry policy belongs to the caller.
//!
//! # Prompt layout
//!
//! ```text
//! system    : <instructions>
//! user      : <seed message>
//! assistant : [DataCleaning]: <other agent's turn>
//! assistant : <this agent's own earlier turn>
//! ...
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use agentpipe::Agent;
//! use agentpipe::clients::openai::OpenAIClient;
//! use std::sync::Arc;
//!
//! let backend = Arc::new(OpenAIClient::new("key", "gpt-4o"));
//! let agent = Agent::new("DataCleaning", "Data Cleaning Specialist", backend)
//!     .with_instructions("Remove outliers using the IQR method.");
//! assert_eq!(agent.id, "DataCleaning");
//! ```

use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::event::{AgentEvent, EventHandler};
use crate::history::{ChatHistory, ChatMessage};
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Errors produced while an agent takes its turn.
#[derive(Debug, Clone)]
pub enum AgentError {
    /// The model backend failed (transport error, bad response, outage).
    BackendUnavailable { agent_id: String, message: String },
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::BackendUnavailable { agent_id, message } => {
                write!(f, "Backend unavailable for agent {}: {}", agent_id, message)
            }
        }
    }
}

impl Error for AgentError {}

/// A member of a [`GroupChat`](crate::group_chat::GroupChat).
///
/// Implementors produce exactly one new message per call and must not mutate
/// any internal state while doing so.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Identifier, unique within a group chat. Used for round-robin bookkeeping
    /// and termination authorization.
    fn id(&self) -> &str;

    /// Produce the next message given the full conversation so far.
    async fn take_turn(&self, history: &ChatHistory) -> Result<ChatMessage, AgentError>;
}

/// An LLM-backed participant with a fixed persona.
pub struct Agent {
    /// Stable identifier referenced by termination strategies and transcripts.
    pub id: String,
    /// Human-readable display name for logging.
    pub name: String,
    instructions: String,
    client: Arc<dyn ClientWrapper>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Agent {
    /// Create an agent with empty instructions.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: String::new(),
            client,
            event_handler: None,
        }
    }

    /// Set the persona/contract text sent as the system message (builder pattern).
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_agent_event(&event).await;
        }
    }

    /// Build the prompt sent to the backend for the given history.
    pub fn build_prompt(&self, history: &ChatHistory) -> Vec<Message> {
        let mut prompt = Vec::with_capacity(history.len() + 1);
        if !self.instructions.is_empty() {
            prompt.push(Message::new(Role::System, &self.instructions));
        }
        for msg in history.iter() {
            match (&msg.role, &msg.author) {
                (Role::Assistant, Some(author)) if author != &self.id => {
                    prompt.push(Message::new(
                        Role::Assistant,
                        &format!("[{}]: {}", author, msg.content),
                    ));
                }
                (role, _) => prompt.push(Message {
                    role: *role,
                    content: msg.content.clone(),
                }),
            }
        }
        prompt
    }
}

#[async_trait]
impl Participant for Agent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn take_turn(&self, history: &ChatHistory) -> Result<ChatMessage, AgentError> {
        self.emit(AgentEvent::TurnStarted {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            history_len: history.len(),
        })
        .await;

        let prompt = self.build_prompt(history);
        log::debug!(
            "Agent::take_turn(...): {} sending {} messages to {}",
            self.id,
            prompt.len(),
            self.client.model_name()
        );

        match self.client.send_message(&prompt).await {
            Ok(reply) => {
                let tokens_used = self.client.get_last_usage().await;
                self.emit(AgentEvent::TurnCompleted {
                    agent_id: self.id.clone(),
                    agent_name: self.name.clone(),
                    response_length: reply.content.len(),
                    tokens_used,
                })
                .await;
                Ok(ChatMessage::from_agent(self.id.clone(), reply.content.as_ref()))
            }
            Err(e) => {
                log::error!("Agent::take_turn(...): {} backend error: {}", self.id, e);
                self.emit(AgentEvent::TurnFailed {
                    agent_id: self.id.clone(),
                    agent_name: self.name.clone(),
                    error: e.to_string(),
                })
                .await;
                Err(AgentError::BackendUnavailable {
                    agent_id: self.id.clone(),
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    #[async_trait]
    impl ClientWrapper for Silent {
        async fn send_message(
            &self,
            _messages: &[Message],
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            Ok(Message::new(Role::Assistant, ""))
        }

        fn model_name(&self) -> &str {
            "silent"
        }
    }

    #[test]
    fn test_prompt_labels_other_agents() {
        let agent = Agent::new("stats", "Statistics", Arc::new(Silent))
            .with_instructions("Compute statistics.");

        let mut history = ChatHistory::new();
        history.append(ChatMessage::user("data: 1, 2, 3"));
        history.append(ChatMessage::from_agent("cleaning", "cleaned"));
        history.append(ChatMessage::from_agent("stats", "mean = 2"));

        let prompt = agent.build_prompt(&history);
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, Role::System);
        assert_eq!(&*prompt[0].content, "Compute statistics.");
        assert_eq!(prompt[1].role, Role::User);
        assert_eq!(&*prompt[2].content, "[cleaning]: cleaned");
        assert_eq!(&*prompt[3].content, "mean = 2");
    }

    #[test]
    fn test_prompt_without_instructions_has_no_system_message() {
        let agent = Agent::new("a", "A", Arc::new(Silent));
        let mut history = ChatHistory::new();
        history.append(ChatMessage::user("hi"));
        let prompt = agent.build_prompt(&history);
        assert_eq!(prompt.len(), 1);
        assert_eq!(prompt[0].role, Role::User);
    }
}
