// src/agentpipe/mod.rs

pub mod agent;
pub mod approval;
pub mod artifacts;
pub mod client_wrapper;
pub mod clients;
pub mod code_block;
pub mod config;
pub mod event;
pub mod group_chat;
pub mod history;
pub mod http_client_pool;
pub mod loader;
pub mod personas;
pub mod pipeline;
pub mod sandbox;
pub mod termination;
pub mod transcript;

// Let's explicitly export the orchestrator so it can be reached as agentpipe::PipelineOrchestrator
pub use pipeline::PipelineOrchestrator;
