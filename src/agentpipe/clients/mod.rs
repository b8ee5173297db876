//! Provider specific [`ClientWrapper`](crate::client_wrapper::ClientWrapper) implementations.
//!
//! The pipeline only needs chat completions, so a single client covers both
//! the public OpenAI API (and compatible servers) and Azure OpenAI deployments.

pub mod openai;
