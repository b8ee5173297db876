//! The `OpenAIClient` struct implements `ClientWrapper` for the Chat Completions
//! API, capturing both the assistant response and the token usage of the most
//! recent request.
//!
//! Two endpoint flavours are supported:
//!
//! - **OpenAI** (and compatible servers): `POST {base_url}/chat/completions`
//!   with `Authorization: Bearer <key>` and the model in the request body.
//! - **Azure OpenAI**: `POST {endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`
//!   with an `api-key` header; the deployment selects the model.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentpipe::clients::openai::OpenAIClient;
//! use agentpipe::client_wrapper::{ClientWrapper, Message, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let key = std::env::var("OPENAI_API_KEY")?;
//!     let client = OpenAIClient::new(&key, "gpt-4o");
//!
//!     let reply = client
//!         .send_message(&[
//!             Message::new(Role::System, "You are an assistant."),
//!             Message::new(Role::User, "Hello!"),
//!         ])
//!         .await?;
//!     println!("Assistant: {}", reply.content);
//!
//!     if let Some(usage) = client.get_last_usage().await {
//!         println!("Tokens: {} in, {} out", usage.input_tokens, usage.output_tokens);
//!     }
//!     Ok(())
//! }
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use crate::http_client_pool::get_http_client;

/// Default base URL of the public OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Azure OpenAI REST API version used when none is given.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-12-01-preview";

/// Failures of a chat-completions request.
#[derive(Debug)]
pub enum ClientError {
    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    Transport(String),
    /// The server answered with a non-success status.
    Status { status: u16, body: String },
    /// The response body did not have the expected shape.
    InvalidResponse(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ClientError::Status { status, body } => {
                write!(f, "HTTP {} from chat completions endpoint: {}", status, body)
            }
            ClientError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone)]
enum Endpoint {
    OpenAI { base_url: String },
    Azure { endpoint: String, api_version: String },
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Client wrapper for OpenAI-compatible and Azure OpenAI chat completions.
pub struct OpenAIClient {
    secret_key: String,
    /// Model name (OpenAI) or deployment name (Azure).
    model: String,
    endpoint: Endpoint,
    /// Storage for the token usage returned by the most recent request.
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Client for the public OpenAI API.
    pub fn new(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, OPENAI_BASE_URL)
    }

    /// Client targeting a custom OpenAI compatible base URL (e.g. a local server).
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            secret_key: secret_key.to_string(),
            model: model_name.to_string(),
            endpoint: Endpoint::OpenAI {
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            token_usage: Mutex::new(None),
        }
    }

    /// Client for an Azure OpenAI deployment.
    ///
    /// `endpoint` is the resource URL, e.g. `https://my-resource.openai.azure.com`.
    pub fn azure(secret_key: &str, endpoint: &str, deployment: &str, api_version: &str) -> Self {
        OpenAIClient {
            secret_key: secret_key.to_string(),
            model: deployment.to_string(),
            endpoint: Endpoint::Azure {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_version: api_version.to_string(),
            },
            token_usage: Mutex::new(None),
        }
    }

    /// Full URL of the chat completions call.
    pub fn completions_url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAI { base_url } => format!("{}/chat/completions", base_url),
            Endpoint::Azure {
                endpoint,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, self.model, api_version
            ),
        }
    }

    fn pool_key(&self) -> &str {
        match &self.endpoint {
            Endpoint::OpenAI { base_url } => base_url,
            Endpoint::Azure { endpoint, .. } => endpoint,
        }
    }

    fn request_body<'a>(&'a self, messages: &'a [Message]) -> ChatRequest<'a> {
        ChatRequest {
            // Azure routes by deployment and ignores the body's model field.
            model: match self.endpoint {
                Endpoint::OpenAI { .. } => Some(self.model.as_str()),
                Endpoint::Azure { .. } => None,
            },
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        }
    }

    async fn complete(&self, messages: &[Message]) -> Result<Message, ClientError> {
        let http = get_http_client(self.pool_key())?;
        let request = http.post(self.completions_url()).json(&self.request_body(messages));
        let request = match self.endpoint {
            Endpoint::OpenAI { .. } => request.bearer_auth(&self.secret_key),
            Endpoint::Azure { .. } => request.header("api-key", &self.secret_key),
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let (content, usage) = parse_response(&body)?;
        *self.token_usage.lock().await = usage;
        Ok(Message {
            role: Role::Assistant,
            content: Arc::from(content.as_str()),
        })
    }
}

/// Pull the first choice's content and the usage block out of a response body.
fn parse_response(body: &str) -> Result<(String, Option<TokenUsage>), ClientError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::InvalidResponse("response has no choices".to_string()))?
        .message
        .content
        .unwrap_or_default();
    Ok((content, parsed.usage.map(TokenUsage::from)))
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        match self.complete(messages).await {
            Ok(message) => Ok(message),
            Err(err) => {
                log::error!("OpenAIClient::send_message(...): {} ({})", err, self.model);
                Err(Box::new(err))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_url_and_body() {
        let client = OpenAIClient::new_with_base_url("k", "gpt-4o", "http://localhost:8080/v1/");
        assert_eq!(
            client.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
        let messages = vec![
            Message::new(Role::System, "be brief"),
            Message::new(Role::User, "hi"),
        ];
        let body = serde_json::to_value(client.request_body(&messages)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_azure_url_omits_model_from_body() {
        let client = OpenAIClient::azure(
            "k",
            "https://res.openai.azure.com/",
            "gpt-4o-mini",
            DEFAULT_AZURE_API_VERSION,
        );
        assert_eq!(
            client.completions_url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-12-01-preview"
        );
        let messages = vec![Message::new(Role::User, "hi")];
        let body = serde_json::to_value(client.request_body(&messages)).unwrap();
        assert!(body.get("model").is_none());
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_parse_response_with_usage() {
        let body = r#"{
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Approved"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let (content, usage) = parse_response(body).unwrap();
        assert_eq!(content, "Approved");
        assert_eq!(
            usage,
            Some(TokenUsage {
                input_tokens: 12,
                output_tokens: 3,
                total_tokens: 15
            })
        );
    }

    #[test]
    fn test_parse_response_without_choices_is_invalid() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
        assert!(parse_response("not json").is_err());
    }
}
