//! # agentpipe
//!
//! agentpipe runs a dataset through a small team of LLM agents under human
//! supervision: agents clean and summarise the data, an operator approves the
//! result, a code agent writes a visualization script that is executed in a
//! sandbox (with its failures fed back for one fix), and a final pair of agents
//! writes and reviews a markdown report.
//!
//! The crate provides layered abstractions for:
//!
//! * **Backends**: the [`ClientWrapper`] trait, implemented by
//!   [`clients::openai::OpenAIClient`] for OpenAI-compatible and Azure OpenAI endpoints
//! * **Agents**: [`Agent`], a persona bound to a shared backend, taking one turn at a time
//! * **Group chats**: [`group_chat::GroupChat`], a round-robin conversation bounded by a
//!   [`termination::TerminationStrategy`] and a hard iteration cap
//! * **Sandboxed execution**: [`sandbox::CodeSandbox`] retries generated code a fixed number
//!   of times in fresh interpreter processes
//! * **Orchestration**: [`pipeline::PipelineOrchestrator`] sequences the stages, the approval
//!   gate and the feedback round, and persists artifacts and a transcript
//!
//! ## Core Concepts
//!
//! ### Group chats and termination
//!
//! A group chat cycles through its participants until the termination strategy
//! signals or the cap is reached. [`termination::KeywordApproval`] ends a stage
//! when one of its authorized agents says the approval keyword:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agentpipe::Agent;
//! use agentpipe::clients::openai::OpenAIClient;
//! use agentpipe::group_chat::GroupChat;
//! use agentpipe::termination::KeywordApproval;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = Arc::new(OpenAIClient::new(&std::env::var("OPENAI_API_KEY")?, "gpt-4o-mini"));
//!
//!     let writer = Arc::new(Agent::new("writer", "Writer", client.clone())
//!         .with_instructions("Write a haiku about Rust."));
//!     let editor = Arc::new(Agent::new("editor", "Editor", client)
//!         .with_instructions("Reply 'Approved' when the haiku is 5-7-5, else explain."));
//!
//!     let mut chat = GroupChat::new(
//!         "haiku",
//!         vec![writer, editor],
//!         Box::new(KeywordApproval::new(["editor"], 6)),
//!     );
//!     chat.post("Begin.");
//!     let outcome = chat.run().await?;
//!     println!("{} ({} turns)", outcome.final_message()?.content, outcome.iterations);
//!     Ok(())
//! }
//! ```
//!
//! ### Observability
//!
//! Diagnostics go through the `log` facade; call [`init_logger`] to route them
//! to `env_logger` under `RUST_LOG`. Structured progress is available through
//! [`event::EventHandler`].
//!
//! ## Getting Started
//!
//! The `agentpipe` binary wires everything to the console: it lists the CSV
//! files under `data/`, reads the backend from the environment
//! ([`config::BackendConfig::from_env`]) and asks for approval on stdin.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// ```rust
/// agentpipe::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `agentpipe` module.
pub mod agentpipe;

// Re-exporting key items for easier external access.
pub use agentpipe::agent;
pub use agentpipe::agent::{Agent, Participant};
pub use agentpipe::approval;
pub use agentpipe::artifacts;
pub use agentpipe::client_wrapper;
pub use agentpipe::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use agentpipe::clients;
pub use agentpipe::code_block;
pub use agentpipe::config;
pub use agentpipe::config::{BackendConfig, PipelineConfig};
pub use agentpipe::event;
pub use agentpipe::event::{AgentEvent, ChatEvent, EventHandler, PipelineEvent};
pub use agentpipe::group_chat;
pub use agentpipe::history;
pub use agentpipe::http_client_pool;
pub use agentpipe::loader;
pub use agentpipe::personas;
pub use agentpipe::pipeline;
pub use agentpipe::pipeline::{PipelineOrchestrator, PipelineStatus};
pub use agentpipe::sandbox;
pub use agentpipe::termination;
pub use agentpipe::transcript;
