//! Configuration for agentpipe.
//!
//! Plain structs that callers construct however they want; no config-file
//! parsing dependencies are involved. [`PipelineConfig`] carries the stage
//! budgets and file locations, [`BackendConfig`] the model endpoint.
//!
//! # Example
//!
//! ```rust
//! use agentpipe::config::PipelineConfig;
//! use std::path::PathBuf;
//!
//! let config = PipelineConfig {
//!     artifacts_dir: PathBuf::from("/tmp/run-42"),
//!     sandbox_attempts: 5,
//!     ..PipelineConfig::default()
//! };
//! assert_eq!(config.analysis_max_iterations, 10);
//! ```

use crate::client_wrapper::ClientWrapper;
use crate::clients::openai::{OpenAIClient, DEFAULT_AZURE_API_VERSION, OPENAI_BASE_URL};
use crate::personas::VISUALIZATION_FILE;
use crate::termination::DEFAULT_APPROVAL_KEYWORD;
use std::env;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Budgets and locations for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory holding the input `.csv` files.
    pub data_dir: PathBuf,
    /// Directory holding `Data_Quality_Instructions.txt` and `Report_Instructions.txt`.
    pub specs_dir: PathBuf,
    /// Where artifacts are written.
    pub artifacts_dir: PathBuf,
    /// Transcript file; truncated at the start of every run.
    pub transcript_path: PathBuf,
    pub analysis_max_iterations: usize,
    pub code_max_iterations: usize,
    pub report_max_iterations: usize,
    /// Executions of identical code per sandbox run.
    pub sandbox_attempts: usize,
    /// Times a sandbox failure is fed back to the code agent.
    pub feedback_rounds: usize,
    /// Transcript lines included in the report seed.
    pub log_tail_lines: usize,
    pub approval_keyword: String,
    pub python_interpreter: String,
    pub sandbox_timeout_secs: u64,
    /// Run the interpreter with `-I`. Turn off when pandas/matplotlib come from `pip --user`.
    pub sandbox_isolated: bool,
}

impl PipelineConfig {
    pub fn quality_instructions_path(&self) -> PathBuf {
        self.specs_dir.join("Data_Quality_Instructions.txt")
    }

    pub fn report_instructions_path(&self) -> PathBuf {
        self.specs_dir.join("Report_Instructions.txt")
    }

    /// Where the generated code saves its figure, inside the artifacts directory.
    pub fn visualization_path(&self) -> PathBuf {
        self.artifacts_dir.join(VISUALIZATION_FILE)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides through `lookup`. Only `AGENTPIPE_SANDBOX_ISOLATED`
    /// (`0`, `false`, `no` or `off` disables `-I`) is read.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("AGENTPIPE_SANDBOX_ISOLATED") {
            self.sandbox_isolated = !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            specs_dir: PathBuf::from("specs"),
            artifacts_dir: PathBuf::from("artifacts"),
            transcript_path: PathBuf::from("logs").join("agent_chat.log"),
            analysis_max_iterations: 10,
            code_max_iterations: 5,
            report_max_iterations: 10,
            sandbox_attempts: 3,
            feedback_rounds: 1,
            log_tail_lines: 50,
            approval_keyword: DEFAULT_APPROVAL_KEYWORD.to_string(),
            python_interpreter: "python3".to_string(),
            sandbox_timeout_secs: 120,
            sandbox_isolated: true,
        }
    }
}

/// A required environment variable was not set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEnvVar(pub String);

impl fmt::Display for MissingEnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable {} is not set", self.0)
    }
}

impl Error for MissingEnvVar {}

/// Which chat-completions service to talk to.
#[derive(Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Azure {
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: String,
    },
    OpenAI {
        api_key: String,
        base_url: String,
        model: String,
    },
}

impl fmt::Debug for BackendConfig {
    // Keys stay out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendConfig::Azure {
                endpoint,
                deployment,
                api_version,
                ..
            } => f
                .debug_struct("Azure")
                .field("endpoint", endpoint)
                .field("deployment", deployment)
                .field("api_version", api_version)
                .finish_non_exhaustive(),
            BackendConfig::OpenAI {
                base_url, model, ..
            } => f
                .debug_struct("OpenAI")
                .field("base_url", base_url)
                .field("model", model)
                .finish_non_exhaustive(),
        }
    }
}

impl BackendConfig {
    /// Read the backend from the process environment.
    ///
    /// `AZURE_OPENAI_KEY` selects Azure, with the resource URL in `URL`, the
    /// deployment in `AZURE_OPENAI_DEPLOYMENT` (default `gpt-4o-mini`) and the
    /// API version in `AZURE_OPENAI_API_VERSION`. Otherwise `OPENAI_API_KEY` is
    /// used with `URL` as an optional base URL and `MODEL` (default `gpt-4o-mini`).
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MissingEnvVar>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("AZURE_OPENAI_KEY") {
            let endpoint = lookup("URL").ok_or_else(|| MissingEnvVar("URL".to_string()))?;
            return Ok(BackendConfig::Azure {
                api_key,
                endpoint,
                deployment: lookup("AZURE_OPENAI_DEPLOYMENT")
                    .unwrap_or_else(|| "gpt-4o-mini".to_string()),
                api_version: lookup("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            });
        }
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            return Ok(BackendConfig::OpenAI {
                api_key,
                base_url: lookup("URL").unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                model: lookup("MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            });
        }
        Err(MissingEnvVar("AZURE_OPENAI_KEY or OPENAI_API_KEY".to_string()))
    }

    /// Build the shared client all agents will use.
    pub fn build_client(&self) -> Arc<dyn ClientWrapper> {
        match self {
            BackendConfig::Azure {
                api_key,
                endpoint,
                deployment,
                api_version,
            } => Arc::new(OpenAIClient::azure(api_key, endpoint, deployment, api_version)),
            BackendConfig::OpenAI {
                api_key,
                base_url,
                model,
            } => Arc::new(OpenAIClient::new_with_base_url(api_key, model, base_url)),
        }
    }
}
