//! Round-robin multi-agent conversation bounded by a termination strategy.
//!
//! A [`GroupChat`] owns one [`ChatHistory`], an ordered list of participants and
//! a [`TerminationStrategy`]. Each call to [`post`](GroupChat::post) seeds the
//! conversation and arms a run; the run then yields one message per iteration:
//!
//! ```text
//! participant[i % n].take_turn(&history)
//!   → history.append(message)
//!   → emit message to caller
//!   → strategy.should_terminate(participant, &history)?  → Approved
//!   → iteration == maximum_iterations?                   → IterationLimit
//! ```
//!
//! Runs are lazy: [`next_turn`](GroupChat::next_turn) advances by exactly one
//! message, [`turns`](GroupChat::turns) exposes the same sequence as a
//! [`Stream`], and [`run`](GroupChat::run) drives it to the end. A finished run
//! yields nothing more until another message is posted.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentpipe::group_chat::GroupChat;
//! use agentpipe::termination::KeywordApproval;
//! use agentpipe::Agent;
//! use agentpipe::clients::openai::OpenAIClient;
//! use std::sync::Arc;
//!
//! # async {
//! let backend = Arc::new(OpenAIClient::new("key", "gpt-4o"));
//! let writer = Arc::new(Agent::new("writer", "Writer", backend.clone()));
//! let checker = Arc::new(Agent::new("checker", "Checker", backend));
//!
//! let mut chat = GroupChat::new(
//!     "report",
//!     vec![writer, checker],
//!     Box::new(KeywordApproval::new(["checker"], 10)),
//! );
//! chat.post("Write the report.");
//! let outcome = chat.run().await?;
//! println!("{} turns, {:?}", outcome.iterations, outcome.reason);
//! # Ok::<(), agentpipe::group_chat::ChatError>(())
//! # };
//! ```

use crate::agent::{AgentError, Participant};
use crate::event::{ChatEvent, EventHandler};
use crate::history::{ChatHistory, ChatMessage, HistoryError};
use crate::termination::TerminationStrategy;
use futures_util::stream::{self, Stream};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Why a group-chat run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The termination strategy signalled after `by`'s turn.
    Approved { by: String },
    /// The run used all of its iterations without the strategy signalling.
    IterationLimit,
}

impl TerminationReason {
    pub fn is_approved(&self) -> bool {
        matches!(self, TerminationReason::Approved { .. })
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Approved { by } => write!(f, "approved by {}", by),
            TerminationReason::IterationLimit => write!(f, "iteration limit reached"),
        }
    }
}

/// Errors that abort a group-chat run.
#[derive(Debug, Clone)]
pub enum ChatError {
    /// A participant's backend failed. Not retried at this layer.
    BackendUnavailable { agent_id: String, message: String },
    /// A result was requested from a chat with no messages.
    EmptyHistory,
    /// The chat was run without participants.
    NoParticipants,
    /// The termination strategy reported a zero iteration cap.
    InvalidIterationCap,
    /// `run()` was called on a chat aborted by an earlier failure.
    Faulted,
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::BackendUnavailable { agent_id, message } => {
                write!(f, "Backend unavailable for agent {}: {}", agent_id, message)
            }
            ChatError::EmptyHistory => write!(f, "Conversation history is empty"),
            ChatError::NoParticipants => write!(f, "No participants in group chat"),
            ChatError::InvalidIterationCap => {
                write!(f, "Maximum iterations must be a positive integer")
            }
            ChatError::Faulted => {
                write!(f, "Group chat was aborted by an earlier failure; post a message to restart")
            }
        }
    }
}

impl Error for ChatError {}

impl From<AgentError> for ChatError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::BackendUnavailable { agent_id, message } => {
                ChatError::BackendUnavailable { agent_id, message }
            }
        }
    }
}

impl From<HistoryError> for ChatError {
    fn from(_: HistoryError) -> Self {
        ChatError::EmptyHistory
    }
}

/// The result of driving a run to completion with [`GroupChat::run`].
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Messages emitted during this run, in order. Excludes posted user messages.
    pub messages: Vec<ChatMessage>,
    /// Number of iterations executed; equals `messages.len()`.
    pub iterations: usize,
    pub reason: TerminationReason,
}

impl ChatOutcome {
    /// The last message emitted by the run.
    pub fn final_message(&self) -> Result<&ChatMessage, ChatError> {
        self.messages.last().ok_or(ChatError::EmptyHistory)
    }

    pub fn is_approved(&self) -> bool {
        self.reason.is_approved()
    }
}

#[derive(Debug, Clone)]
enum RunState {
    Active,
    Finished(TerminationReason),
    Faulted,
}

/// A bounded, ordered, multi-agent conversation.
pub struct GroupChat {
    /// Identifier used in events and logs (e.g. `"analysis"`).
    pub id: String,
    participants: Vec<Arc<dyn Participant>>,
    history: ChatHistory,
    termination: Box<dyn TerminationStrategy>,
    iteration: usize,
    state: RunState,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl GroupChat {
    pub fn new(
        id: impl Into<String>,
        participants: Vec<Arc<dyn Participant>>,
        termination: Box<dyn TerminationStrategy>,
    ) -> Self {
        Self {
            id: id.into(),
            participants,
            history: ChatHistory::new(),
            termination,
            iteration: 0,
            state: RunState::Active,
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    async fn emit(&self, event: ChatEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_chat_event(&event).await;
        }
    }

    /// Append a user message and arm a new run.
    ///
    /// The iteration counter and the round-robin position restart at zero; the
    /// history is kept so the next run sees everything said so far.
    pub fn post(&mut self, content: impl Into<String>) {
        let message = ChatMessage::user(content);
        log::debug!(
            "GroupChat::post(...): [{}] {} chars",
            self.id,
            message.content.len()
        );
        self.history.append(message);
        self.iteration = 0;
        self.state = RunState::Active;
    }

    /// Advance the current run by one turn.
    ///
    /// Returns `Ok(None)` once the run has finished (or after a failed turn).
    /// A backend failure is returned once and leaves the chat faulted.
    pub async fn next_turn(&mut self) -> Result<Option<ChatMessage>, ChatError> {
        if !matches!(self.state, RunState::Active) {
            return Ok(None);
        }
        if self.participants.is_empty() {
            self.state = RunState::Faulted;
            return Err(ChatError::NoParticipants);
        }
        let cap = self.termination.maximum_iterations();
        if cap == 0 {
            self.state = RunState::Faulted;
            return Err(ChatError::InvalidIterationCap);
        }

        let participant = self.participants[self.iteration % self.participants.len()].clone();
        let agent_id = participant.id().to_string();

        let message = match participant.take_turn(&self.history).await {
            Ok(message) => message,
            Err(e) => {
                self.state = RunState::Faulted;
                self.emit(ChatEvent::RunAborted {
                    chat_id: self.id.clone(),
                    agent_id,
                    error: e.to_string(),
                })
                .await;
                return Err(e.into());
            }
        };

        self.history.append(message.clone());
        self.iteration += 1;

        self.emit(ChatEvent::TurnCompleted {
            chat_id: self.id.clone(),
            agent_id: agent_id.clone(),
            iteration: self.iteration,
            content_length: message.content.len(),
        })
        .await;

        let reason = if self.termination.should_terminate(&agent_id, &self.history) {
            Some(TerminationReason::Approved { by: agent_id })
        } else if self.iteration >= cap {
            Some(TerminationReason::IterationLimit)
        } else {
            None
        };

        if let Some(reason) = reason {
            log::info!(
                "GroupChat::next_turn(...): [{}] finished after {} turns ({})",
                self.id,
                self.iteration,
                reason
            );
            self.emit(ChatEvent::RunFinished {
                chat_id: self.id.clone(),
                iterations: self.iteration,
                reason: reason.clone(),
            })
            .await;
            self.state = RunState::Finished(reason);
        }

        Ok(Some(message))
    }

    /// The current run as a lazy stream of messages.
    ///
    /// The stream ends when the run finishes; an error item is always the last.
    pub fn turns(&mut self) -> impl Stream<Item = Result<ChatMessage, ChatError>> + '_ {
        stream::unfold(Some(self), |chat| async move {
            let chat = chat?;
            match chat.next_turn().await {
                Ok(Some(message)) => Some((Ok(message), Some(chat))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Drive the current run to completion.
    pub async fn run(&mut self) -> Result<ChatOutcome, ChatError> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_turn().await? {
            messages.push(message);
        }
        let reason = match &self.state {
            RunState::Finished(reason) => reason.clone(),
            _ => return Err(ChatError::Faulted),
        };
        Ok(ChatOutcome {
            iterations: messages.len(),
            messages,
            reason,
        })
    }

    /// Iterations executed in the current run.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// How the latest run ended, if it has.
    pub fn termination_reason(&self) -> Option<&TerminationReason> {
        match &self.state {
            RunState::Finished(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self.state, RunState::Active)
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn participant_ids(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.id()).collect()
    }

    pub fn maximum_iterations(&self) -> usize {
        self.termination.maximum_iterations()
    }
}
