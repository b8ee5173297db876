//! Sandboxed execution of model-generated code with bounded retries.
//!
//! The [`CodeSandbox`] runs a code payload through a [`CodeRunner`] up to a
//! fixed number of times, retrying the *same* code to absorb transient faults
//! (a flaky plotting backend, a busy filesystem). Faults are captured as data
//! in the returned [`SandboxResult`]; they never propagate as errors.
//!
//! # Isolation
//!
//! The shipped [`PythonRunner`] starts a fresh interpreter subprocess for every
//! attempt, so each attempt gets a brand-new variable scope and no access to
//! the orchestrator's memory. Isolation stops there: the code can still touch
//! the filesystem and network with the privileges of the current user. The
//! runner bounds wall-clock time and lets callers pin the working directory
//! and environment.
//!
//! ```text
//! CodeSandbox::run(code, max_attempts)
//!   └─ for attempt in 1..=max_attempts
//!        └─ runner.execute(code)  ── Ok  → success
//!                                 └─ Err → remember fault, retry
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use agentpipe::sandbox::{CodeSandbox, PythonRunner};
//! use std::sync::Arc;
//!
//! # async {
//! let sandbox = CodeSandbox::new(Arc::new(PythonRunner::new().with_timeout(60)));
//! let result = sandbox.run("print('hello')", 3).await;
//! assert!(result.success);
//! # };
//! ```

use crate::event::{EventHandler, PipelineEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Outcome of one [`CodeSandbox::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxResult {
    pub success: bool,
    /// Description of the last fault when `success` is false.
    pub error: Option<String>,
    /// Number of executions performed.
    pub attempts: usize,
}

impl SandboxResult {
    pub fn success(attempts: usize) -> Self {
        Self {
            success: true,
            error: None,
            attempts,
        }
    }

    pub fn failure(error: String, attempts: usize) -> Self {
        Self {
            success: false,
            error: Some(error),
            attempts,
        }
    }
}

/// A runtime fault raised while executing code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxFault {
    /// Short, single-line description fed back to the code agent.
    pub description: String,
    /// Full diagnostic output (stderr) when available.
    pub details: Option<String>,
}

impl SandboxFault {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for SandboxFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Executes a code payload once, in a scope disjoint from the caller's.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn execute(&self, code: &str) -> Result<(), SandboxFault>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Bounded-retry executor wrapping a [`CodeRunner`].
pub struct CodeSandbox {
    runner: Arc<dyn CodeRunner>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl CodeSandbox {
    pub fn new(runner: Arc<dyn CodeRunner>) -> Self {
        Self {
            runner,
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn set_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handler = Some(handler);
    }

    /// Execute `code` until it succeeds or `max_attempts` executions have run.
    ///
    /// The code is never modified between attempts. With `max_attempts == 0`
    /// nothing is executed and a failure is reported.
    pub async fn run(&self, code: &str, max_attempts: usize) -> SandboxResult {
        if max_attempts == 0 {
            return SandboxResult::failure("no execution attempts permitted".to_string(), 0);
        }

        let mut last_fault = String::new();
        for attempt in 1..=max_attempts {
            match self.runner.execute(code).await {
                Ok(()) => {
                    log::info!(
                        "CodeSandbox::run(...): {} succeeded on attempt {}/{}",
                        self.runner.name(),
                        attempt,
                        max_attempts
                    );
                    return SandboxResult::success(attempt);
                }
                Err(fault) => {
                    log::error!(
                        "CodeSandbox::run(...): execution attempt {} failed: {}",
                        attempt,
                        fault
                    );
                    if let Some(handler) = &self.event_handler {
                        handler
                            .on_pipeline_event(&PipelineEvent::SandboxAttemptFailed {
                                attempt,
                                max_attempts,
                                error: fault.description.clone(),
                            })
                            .await;
                    }
                    last_fault = fault.description;
                }
            }
        }
        SandboxResult::failure(last_fault, max_attempts)
    }
}

/// Runs Python code in a fresh `python3 -I -` subprocess per execution.
///
/// The code is written to the child's stdin. By default `-I` keeps the
/// interpreter away from user site-packages and `PYTHON*` environment
/// variables; call [`PythonRunner::with_isolated`] with `false` when the
/// libraries the generated code needs live in a `pip --user` install. A non-zero
/// exit status, a spawn failure or a timeout is reported as a [`SandboxFault`]
/// whose description is the last non-empty stderr line, which for an uncaught
/// exception is `ExceptionType: message`.
#[derive(Debug, Clone)]
pub struct PythonRunner {
    interpreter: String,
    timeout_secs: u64,
    working_dir: Option<PathBuf>,
    env_vars: HashMap<String, String>,
    isolated: bool,
}

impl PythonRunner {
    /// Runner using `python3` from `PATH` with a 120 second timeout.
    pub fn new() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 120,
            working_dir: None,
            env_vars: HashMap::new(),
            isolated: true,
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Wall-clock limit per execution, in seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Directory the interpreter starts in; relative paths in the code resolve here.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Pass `-I` to the interpreter. On by default.
    pub fn with_isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    fn args(&self) -> Vec<&'static str> {
        if self.isolated {
            vec!["-I", "-"]
        } else {
            vec!["-"]
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

impl Default for PythonRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Last non-empty line of `stderr`, or `None` when there is none.
fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl CodeRunner for PythonRunner {
    async fn execute(&self, code: &str) -> Result<(), SandboxFault> {
        let start_time = Instant::now();
        let mut command = Command::new(&self.interpreter);
        command
            .args(self.args())
            .envs(&self.env_vars)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            SandboxFault::new(format!("failed to start {}: {}", self.interpreter, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| SandboxFault::new(format!("failed to send code: {}", e)))?;
            // Dropping stdin closes the pipe so the interpreter sees EOF.
        }

        let timeout = Duration::from_secs(self.timeout_secs);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| SandboxFault::new(format!("failed to collect output: {}", e)))?
            }
            Err(_) => {
                return Err(SandboxFault::new(format!(
                    "execution exceeded {} second timeout",
                    self.timeout_secs
                )))
            }
        };

        log::debug!(
            "PythonRunner::execute(...): exited with {:?} after {} ms",
            output.status.code(),
            start_time.elapsed().as_millis()
        );

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let description = last_error_line(&stderr).unwrap_or_else(|| match output.status.code() {
            Some(code) => format!("process exited with status {}", code),
            None => "process terminated by signal".to_string(),
        });
        Err(SandboxFault::new(description).with_details(stderr))
    }

    fn name(&self) -> &str {
        "PythonRunner"
    }
}
