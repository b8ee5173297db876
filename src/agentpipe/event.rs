//! Agent, group-chat and pipeline event system.
//!
//! Provides a callback-based observability layer. Implement [`EventHandler`]
//! to receive real-time notifications about:
//!
//! - **Agent turns**: when an agent calls its backend and what came back
//! - **Group chats**: per-turn progress, and why a run stopped or aborted
//! - **Pipeline lifecycle**: stage boundaries, the approval decision, sandbox
//!   attempts, the feedback round and the terminal status
//!
//! # Architecture
//!
//! Events flow through a single [`EventHandler`] trait with three methods, all
//! with default no-op implementations so you only override what you care about.
//! The handler is wrapped in `Arc<dyn EventHandler>` and shared: registering it
//! on a [`PipelineOrchestrator`](crate::pipeline::PipelineOrchestrator) propagates
//! it to every group chat and sandbox the orchestrator drives. Agents receive it
//! when built through [`PipelineAgents::from_instructions`](crate::pipeline::PipelineAgents::from_instructions).
//!
//! # Example
//!
//! ```rust,no_run
//! use agentpipe::event::{ChatEvent, EventHandler, PipelineEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_chat_event(&self, event: &ChatEvent) {
//!         if let ChatEvent::TurnCompleted { agent_id, iteration, .. } = event {
//!             println!("{} spoke (turn {})", agent_id, iteration);
//!         }
//!     }
//!     async fn on_pipeline_event(&self, event: &PipelineEvent) {
//!         println!("pipeline: {:?}", event);
//!     }
//! }
//! ```

use crate::client_wrapper::TokenUsage;
use crate::group_chat::TerminationReason;
use crate::pipeline::{PipelineStage, PipelineStatus};
use async_trait::async_trait;

/// Events emitted by an [`Agent`](crate::Agent) while taking a turn.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Emitted right before the backend call.
    TurnStarted {
        agent_id: String,
        agent_name: String,
        /// Number of history messages included in the prompt.
        history_len: usize,
    },
    /// Emitted after the backend answered.
    TurnCompleted {
        agent_id: String,
        agent_name: String,
        response_length: usize,
        tokens_used: Option<TokenUsage>,
    },
    /// Emitted when the backend call failed. The error is propagated afterwards.
    TurnFailed {
        agent_id: String,
        agent_name: String,
        error: String,
    },
}

/// Events emitted by a [`GroupChat`](crate::group_chat::GroupChat).
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A participant produced a message.
    TurnCompleted {
        chat_id: String,
        agent_id: String,
        /// 1-based iteration number within the current run.
        iteration: usize,
        content_length: usize,
    },
    /// The run ended, either by approval or by hitting the iteration cap.
    RunFinished {
        chat_id: String,
        iterations: usize,
        reason: TerminationReason,
    },
    /// A participant's turn failed and the run was aborted.
    RunAborted {
        chat_id: String,
        agent_id: String,
        error: String,
    },
}

/// Events emitted by the [`PipelineOrchestrator`](crate::pipeline::PipelineOrchestrator).
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted { run_id: String, stage: PipelineStage },
    StageCompleted { run_id: String, stage: PipelineStage },
    /// The analysis is waiting on the operator.
    ApprovalRequested { run_id: String, summary_length: usize },
    ApprovalDecided { run_id: String, approved: bool },
    /// One sandbox execution failed; `attempt` is 1-based. Emitted by
    /// [`CodeSandbox`](crate::sandbox::CodeSandbox), which knows no run id.
    SandboxAttemptFailed {
        attempt: usize,
        max_attempts: usize,
        error: String,
    },
    /// The sandbox gave up and the failure is being fed back to the code agent.
    FeedbackRoundStarted { run_id: String, round: usize, error: String },
    /// A named artifact was persisted.
    ArtifactStored { run_id: String, name: String, bytes: usize },
    /// Terminal status reached.
    PipelineFinished { run_id: String, status: PipelineStatus },
}

/// Callback trait for receiving events.
///
/// Both agents and orchestrators hold an `Option<Arc<dyn EventHandler>>`.
/// Handlers should return quickly; the pipeline awaits them inline.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called for every [`AgentEvent`].
    async fn on_agent_event(&self, _event: &AgentEvent) {}

    /// Called for every [`ChatEvent`].
    async fn on_chat_event(&self, _event: &ChatEvent) {}

    /// Called for every [`PipelineEvent`].
    async fn on_pipeline_event(&self, _event: &PipelineEvent) {}
}
