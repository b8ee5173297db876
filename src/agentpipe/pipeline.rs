//! The human-gated analysis pipeline.
//!
//! [`PipelineOrchestrator`] sequences three group chats with a human approval
//! gate and a sandboxed execution step in between:
//!
//! ```text
//! Analysis ──▶ ApprovalGate ──▶ CodeGeneration ──▶ Execution ──▶ Report ──▶ Completed
//! (cleaning,     (operator)       (code agent)      (sandbox,      (writer,
//!  statistics,       │                 ▲             retries)       checker)
//!  checker)          ▼                 └── feedback ────┘
//!                 Declined                 round           ▼
//!                                                    ExecutionFailed
//! ```
//!
//! Each stage gets a fresh [`GroupChat`] seeded with one user message. Every
//! message the agents produce is written to the [`TranscriptSink`], and the
//! report stage reads the tail of that transcript back. Declining the analysis
//! or exhausting the execution budget are normal terminal statuses, not errors;
//! only collaborator failures (backend, approval channel, sinks) surface as
//! [`PipelineError`].
//!
//! # Example
//!
//! ```rust,no_run
//! use agentpipe::approval::AutoApprove;
//! use agentpipe::artifacts::FileArtifactSink;
//! use agentpipe::clients::openai::OpenAIClient;
//! use agentpipe::config::PipelineConfig;
//! use agentpipe::personas::AgentInstructions;
//! use agentpipe::pipeline::{PipelineAgents, PipelineOrchestrator};
//! use agentpipe::sandbox::{CodeSandbox, PythonRunner};
//! use agentpipe::transcript::MemoryTranscript;
//! use std::sync::Arc;
//!
//! # async {
//! let backend = Arc::new(OpenAIClient::new("key", "gpt-4o"));
//! let agents = PipelineAgents::from_instructions(backend, &AgentInstructions::default(), None);
//! let orchestrator = PipelineOrchestrator::new(
//!     agents,
//!     CodeSandbox::new(Arc::new(PythonRunner::new())),
//!     Arc::new(AutoApprove),
//!     Arc::new(FileArtifactSink::new("artifacts")),
//!     Arc::new(MemoryTranscript::new()),
//!     PipelineConfig::default(),
//! );
//! let outcome = orchestrator.run("data/sales.csv", "a, 1, b, 2").await?;
//! println!("{:?}", outcome.status);
//! # Ok::<(), agentpipe::pipeline::PipelineError>(())
//! # };
//! ```

use crate::agent::{Agent, Participant};
use crate::approval::ApprovalChannel;
use crate::artifacts::{ArtifactSink, CLEANED_DATA, FINAL_REPORT, VISUALIZATION_SCRIPT};
use crate::client_wrapper::ClientWrapper;
use crate::code_block::extract_code;
use crate::config::PipelineConfig;
use crate::event::{EventHandler, PipelineEvent};
use crate::group_chat::{ChatError, ChatOutcome, GroupChat, TerminationReason};
use crate::personas::{
    AgentInstructions, ANALYSIS_CHECKER, CODE_GENERATOR, DATA_CLEANING, DATA_STATISTICS,
    REPORT_CHECKER, REPORT_GENERATOR,
};
use crate::sandbox::{CodeSandbox, SandboxResult};
use crate::termination::KeywordApproval;
use crate::transcript::{TranscriptSink, TurnRecord};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Position of a run in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Analysis,
    ApprovalGate,
    CodeGeneration,
    Execution,
    Report,
    Completed,
    Aborted,
}

impl PipelineStage {
    /// Short lowercase label used in transcripts and chat ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Analysis => "analysis",
            PipelineStage::ApprovalGate => "approval",
            PipelineStage::CodeGeneration => "code",
            PipelineStage::Execution => "execution",
            PipelineStage::Report => "report",
            PipelineStage::Completed => "completed",
            PipelineStage::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a pipeline run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// All stages ran and the report was stored.
    Completed,
    /// The operator did not approve the analysis.
    Declined,
    /// The generated code still failed after the feedback rounds.
    ExecutionFailed { error: String },
}

impl PipelineStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineStatus::Completed)
    }
}

/// Everything a run learned, owned by the orchestrator while it runs.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub run_id: String,
    /// Where the input came from (typically the CSV path).
    pub input_reference: String,
    pub stage: PipelineStage,
    pub analysis: Option<String>,
    pub analysis_reason: Option<TerminationReason>,
    /// Latest code extracted from the code agent's reply.
    pub code: Option<String>,
    pub sandbox: Option<SandboxResult>,
    pub feedback_rounds_used: usize,
    pub report: Option<String>,
    pub report_reason: Option<TerminationReason>,
    /// Names of the artifacts stored so far, in order.
    pub artifacts: Vec<String>,
}

impl WorkflowState {
    fn new(input_reference: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            input_reference: input_reference.to_string(),
            stage: PipelineStage::Analysis,
            analysis: None,
            analysis_reason: None,
            code: None,
            sandbox: None,
            feedback_rounds_used: 0,
            report: None,
            report_reason: None,
            artifacts: Vec::new(),
        }
    }
}

/// Terminal status plus the state accumulated on the way.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub status: PipelineStatus,
    pub state: WorkflowState,
}

/// Failures that abort a run.
#[derive(Debug)]
pub enum PipelineError {
    /// A group chat aborted, usually because a backend was unavailable.
    Chat {
        stage: PipelineStage,
        source: ChatError,
    },
    /// The approval channel could not produce an answer.
    Approval(String),
    Artifact { name: String, message: String },
    Transcript(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Chat { stage, source } => {
                write!(f, "Pipeline aborted during {} stage: {}", stage, source)
            }
            PipelineError::Approval(msg) => write!(f, "Approval channel failed: {}", msg),
            PipelineError::Artifact { name, message } => {
                write!(f, "Failed to store artifact {}: {}", name, message)
            }
            PipelineError::Transcript(msg) => write!(f, "Transcript failure: {}", msg),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Chat { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Seed of the analysis stage.
pub fn analysis_request(data_text: &str) -> String {
    format!(
        "Please analyze and clean this CSV data, then compute statistics:\n{}",
        data_text
    )
}

/// Seed of the code generation stage.
pub fn visualization_request(analysis: &str, visualization_path: &Path) -> String {
    format!(
        "Generate Python visualization code for this cleaned data. Save the plot to '{}':\n{}",
        visualization_path.display(),
        analysis
    )
}

/// Message posted to the code chat after the sandbox gave up.
pub fn feedback_message(error: &str) -> String {
    format!("The code failed with error: {}. Please fix it.", error)
}

/// Seed of the report stage.
pub fn report_request(analysis: &str, log_lines: &[String]) -> String {
    format!(
        "Generate a comprehensive data analysis report based on the following analysis results and agent workflow:\n\nAnalysis Results:\n{}\n\nAgent Logs:\n{}",
        analysis,
        log_lines.join("\n")
    )
}

/// The six participants of a pipeline run.
#[derive(Clone)]
pub struct PipelineAgents {
    pub data_cleaning: Arc<dyn Participant>,
    pub data_statistics: Arc<dyn Participant>,
    pub analysis_checker: Arc<dyn Participant>,
    pub code_generator: Arc<dyn Participant>,
    pub report_generator: Arc<dyn Participant>,
    pub report_checker: Arc<dyn Participant>,
}

impl PipelineAgents {
    /// Build LLM-backed agents sharing `client`, one per persona.
    pub fn from_instructions(
        client: Arc<dyn ClientWrapper>,
        instructions: &AgentInstructions,
        event_handler: Option<Arc<dyn EventHandler>>,
    ) -> Self {
        let make = |id: &str, name: &str, persona: &str| -> Arc<dyn Participant> {
            let mut agent = Agent::new(id, name, client.clone()).with_instructions(persona);
            if let Some(handler) = &event_handler {
                agent = agent.with_event_handler(handler.clone());
            }
            Arc::new(agent)
        };
        Self {
            data_cleaning: make(
                DATA_CLEANING,
                "Data Cleaning Specialist",
                &instructions.data_cleaning,
            ),
            data_statistics: make(
                DATA_STATISTICS,
                "Statistical Analysis Specialist",
                &instructions.data_statistics,
            ),
            analysis_checker: make(
                ANALYSIS_CHECKER,
                "Analysis Validation Auditor",
                &instructions.analysis_checker,
            ),
            code_generator: make(
                CODE_GENERATOR,
                "Visualization Code Generator",
                &instructions.code_generator,
            ),
            report_generator: make(
                REPORT_GENERATOR,
                "Report Writer",
                &instructions.report_generator,
            ),
            report_checker: make(
                REPORT_CHECKER,
                "Report Reviewer",
                &instructions.report_checker,
            ),
        }
    }
}

/// Drives one dataset through analysis, approval, code execution and reporting.
pub struct PipelineOrchestrator {
    agents: PipelineAgents,
    sandbox: CodeSandbox,
    approval: Arc<dyn ApprovalChannel>,
    artifacts: Arc<dyn ArtifactSink>,
    transcript: Arc<dyn TranscriptSink>,
    config: PipelineConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl PipelineOrchestrator {
    pub fn new(
        agents: PipelineAgents,
        sandbox: CodeSandbox,
        approval: Arc<dyn ApprovalChannel>,
        artifacts: Arc<dyn ArtifactSink>,
        transcript: Arc<dyn TranscriptSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            agents,
            sandbox,
            approval,
            artifacts,
            transcript,
            config,
            event_handler: None,
        }
    }

    /// Register a handler for pipeline, chat and sandbox events.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.sandbox.set_event_handler(handler.clone());
        self.event_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_pipeline_event(&event).await;
        }
    }

    fn chat(
        &self,
        stage: PipelineStage,
        participants: Vec<Arc<dyn Participant>>,
        approver: &Arc<dyn Participant>,
        maximum_iterations: usize,
    ) -> GroupChat {
        let termination = KeywordApproval::new([approver.id()], maximum_iterations)
            .with_keyword(self.config.approval_keyword.as_str());
        let chat = GroupChat::new(stage.as_str(), participants, Box::new(termination));
        match &self.event_handler {
            Some(handler) => chat.with_event_handler(handler.clone()),
            None => chat,
        }
    }

    /// Run the armed chat to its end, writing every message to the transcript.
    async fn drive(
        &self,
        stage: PipelineStage,
        chat: &mut GroupChat,
    ) -> Result<ChatOutcome, PipelineError> {
        let mut messages = Vec::new();
        loop {
            let message = match chat.next_turn().await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(source) => {
                    log::error!(
                        "PipelineOrchestrator::drive(...): {} stage aborted: {}",
                        stage,
                        source
                    );
                    return Err(PipelineError::Chat { stage, source });
                }
            };
            self.transcript
                .record(&TurnRecord::from_message(stage.as_str(), &message))
                .await
                .map_err(|e| PipelineError::Transcript(e.to_string()))?;
            messages.push(message);
        }
        let reason = chat
            .termination_reason()
            .cloned()
            .ok_or(PipelineError::Chat {
                stage,
                source: ChatError::Faulted,
            })?;
        Ok(ChatOutcome {
            iterations: messages.len(),
            messages,
            reason,
        })
    }

    async fn store(
        &self,
        state: &mut WorkflowState,
        name: &str,
        content: &str,
    ) -> Result<(), PipelineError> {
        self.artifacts
            .store(name, content)
            .await
            .map_err(|e| PipelineError::Artifact {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        state.artifacts.push(name.to_string());
        self.emit(PipelineEvent::ArtifactStored {
            run_id: state.run_id.clone(),
            name: name.to_string(),
            bytes: content.len(),
        })
        .await;
        Ok(())
    }

    async fn enter(&self, state: &mut WorkflowState, stage: PipelineStage) {
        state.stage = stage;
        log::info!(
            "PipelineOrchestrator::run(...): [{}] entering {} stage",
            state.run_id,
            stage
        );
        self.emit(PipelineEvent::StageStarted {
            run_id: state.run_id.clone(),
            stage,
        })
        .await;
    }

    async fn leave(&self, state: &WorkflowState, stage: PipelineStage) {
        self.emit(PipelineEvent::StageCompleted {
            run_id: state.run_id.clone(),
            stage,
        })
        .await;
    }

    async fn finish(
        &self,
        mut state: WorkflowState,
        status: PipelineStatus,
    ) -> Result<PipelineOutcome, PipelineError> {
        state.stage = match status {
            PipelineStatus::Completed => PipelineStage::Completed,
            _ => PipelineStage::Aborted,
        };
        log::info!(
            "PipelineOrchestrator::run(...): [{}] finished with {:?}",
            state.run_id,
            status
        );
        self.emit(PipelineEvent::PipelineFinished {
            run_id: state.run_id.clone(),
            status: status.clone(),
        })
        .await;
        Ok(PipelineOutcome { status, state })
    }

    /// Generate code in `chat` and extract it from the final reply.
    async fn generate_code(&self, chat: &mut GroupChat) -> Result<String, PipelineError> {
        let outcome = self.drive(PipelineStage::CodeGeneration, chat).await?;
        let reply = outcome.final_message().map_err(|source| PipelineError::Chat {
            stage: PipelineStage::CodeGeneration,
            source,
        })?;
        Ok(extract_code(&reply.content))
    }

    /// Run the whole pipeline on one dataset.
    ///
    /// `data_text` is the flattened dataset handed to the analysis agents;
    /// `input_reference` only identifies it in logs and state.
    pub async fn run(
        &self,
        input_reference: &str,
        data_text: &str,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut state = WorkflowState::new(input_reference);
        log::info!(
            "PipelineOrchestrator::run(...): [{}] starting on {}",
            state.run_id,
            input_reference
        );

        // Analysis
        self.enter(&mut state, PipelineStage::Analysis).await;
        let mut analysis_chat = self.chat(
            PipelineStage::Analysis,
            vec![
                self.agents.data_cleaning.clone(),
                self.agents.data_statistics.clone(),
                self.agents.analysis_checker.clone(),
            ],
            &self.agents.analysis_checker,
            self.config.analysis_max_iterations,
        );
        analysis_chat.post(analysis_request(data_text));
        let outcome = self.drive(PipelineStage::Analysis, &mut analysis_chat).await?;
        let analysis = outcome
            .final_message()
            .map_err(|source| PipelineError::Chat {
                stage: PipelineStage::Analysis,
                source,
            })?
            .content
            .to_string();
        state.analysis = Some(analysis.clone());
        state.analysis_reason = Some(outcome.reason);
        self.leave(&state, PipelineStage::Analysis).await;

        // Approval gate
        self.enter(&mut state, PipelineStage::ApprovalGate).await;
        self.emit(PipelineEvent::ApprovalRequested {
            run_id: state.run_id.clone(),
            summary_length: analysis.len(),
        })
        .await;
        let approved = self
            .approval
            .request_approval("Analysis review", &analysis)
            .await
            .map_err(|e| PipelineError::Approval(e.to_string()))?;
        self.emit(PipelineEvent::ApprovalDecided {
            run_id: state.run_id.clone(),
            approved,
        })
        .await;
        if !approved {
            return self.finish(state, PipelineStatus::Declined).await;
        }
        self.store(&mut state, CLEANED_DATA, &analysis).await?;
        self.leave(&state, PipelineStage::ApprovalGate).await;

        // Code generation
        self.enter(&mut state, PipelineStage::CodeGeneration).await;
        let mut code_chat = self.chat(
            PipelineStage::CodeGeneration,
            vec![self.agents.code_generator.clone()],
            &self.agents.code_generator,
            self.config.code_max_iterations,
        );
        code_chat.post(visualization_request(
            &analysis,
            &self.config.visualization_path(),
        ));
        let mut code = self.generate_code(&mut code_chat).await?;
        state.code = Some(code.clone());
        self.leave(&state, PipelineStage::CodeGeneration).await;

        // Execution, with feedback rounds through the same code chat
        self.enter(&mut state, PipelineStage::Execution).await;
        let mut result = self.sandbox.run(&code, self.config.sandbox_attempts).await;
        while !result.success && state.feedback_rounds_used < self.config.feedback_rounds {
            state.feedback_rounds_used += 1;
            let error = result.error.clone().unwrap_or_default();
            log::warn!(
                "PipelineOrchestrator::run(...): [{}] code failed after {} attempts, feedback round {}",
                state.run_id,
                result.attempts,
                state.feedback_rounds_used
            );
            self.emit(PipelineEvent::FeedbackRoundStarted {
                run_id: state.run_id.clone(),
                round: state.feedback_rounds_used,
                error: error.clone(),
            })
            .await;

            code_chat.post(feedback_message(&error));
            code = self.generate_code(&mut code_chat).await?;
            state.code = Some(code.clone());
            result = self.sandbox.run(&code, self.config.sandbox_attempts).await;
        }
        state.sandbox = Some(result.clone());
        if !result.success {
            let error = result.error.unwrap_or_default();
            return self
                .finish(state, PipelineStatus::ExecutionFailed { error })
                .await;
        }
        self.store(&mut state, VISUALIZATION_SCRIPT, &code).await?;
        self.leave(&state, PipelineStage::Execution).await;

        // Report
        self.enter(&mut state, PipelineStage::Report).await;
        let log_lines = self
            .transcript
            .tail(self.config.log_tail_lines)
            .await
            .map_err(|e| PipelineError::Transcript(e.to_string()))?;
        let mut report_chat = self.chat(
            PipelineStage::Report,
            vec![
                self.agents.report_generator.clone(),
                self.agents.report_checker.clone(),
            ],
            &self.agents.report_checker,
            self.config.report_max_iterations,
        );
        report_chat.post(report_request(&analysis, &log_lines));
        let outcome = self.drive(PipelineStage::Report, &mut report_chat).await?;
        // The checker speaks last; the report is the writer's latest draft.
        let writer_id = self.agents.report_generator.id();
        let report = match outcome
            .messages
            .iter()
            .rev()
            .find(|m| m.author.as_deref() == Some(writer_id))
        {
            Some(draft) => draft.content.to_string(),
            None => outcome
                .final_message()
                .map_err(|source| PipelineError::Chat {
                    stage: PipelineStage::Report,
                    source,
                })?
                .content
                .to_string(),
        };
        self.store(&mut state, FINAL_REPORT, &report).await?;
        state.report = Some(report);
        state.report_reason = Some(outcome.reason);
        self.leave(&state, PipelineStage::Report).await;

        self.finish(state, PipelineStatus::Completed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_messages() {
        assert_eq!(
            analysis_request("a, 1"),
            "Please analyze and clean this CSV data, then compute statistics:\na, 1"
        );
        assert!(visualization_request("stats", Path::new("artifacts/data_visualization.png"))
            .starts_with("Generate Python visualization code for this cleaned data. Save the plot to 'artifacts/data_visualization.png':\n"));
        assert!(visualization_request("stats", Path::new("/srv/out/data_visualization.png"))
            .contains("Save the plot to '/srv/out/data_visualization.png'"));
        assert_eq!(
            feedback_message("NameError: name 'df' is not defined"),
            "The code failed with error: NameError: name 'df' is not defined. Please fix it."
        );
        let seed = report_request("stats", &["l1".to_string(), "l2".to_string()]);
        assert!(seed.ends_with("Analysis Results:\nstats\n\nAgent Logs:\nl1\nl2"));
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(PipelineStage::CodeGeneration.to_string(), "code");
        assert_eq!(PipelineStage::ApprovalGate.as_str(), "approval");
        assert!(PipelineStatus::Completed.is_completed());
        assert!(!PipelineStatus::Declined.is_completed());
    }
}
