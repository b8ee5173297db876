use agentpipe::agent::Participant;
use agentpipe::approval::{ApprovalChannel, AutoApprove, AutoDecline};
use agentpipe::artifacts::{
    FileArtifactSink, MemoryArtifactSink, CLEANED_DATA, FINAL_REPORT, VISUALIZATION_SCRIPT,
};
use agentpipe::client_wrapper::{ClientWrapper, Message, Role};
use agentpipe::config::PipelineConfig;
use agentpipe::event::{EventHandler, PipelineEvent};
use agentpipe::group_chat::ChatError;
use agentpipe::pipeline::{
    PipelineAgents, PipelineError, PipelineOrchestrator, PipelineStage, PipelineStatus,
};
use agentpipe::sandbox::{CodeRunner, CodeSandbox, SandboxFault};
use agentpipe::transcript::{FileTranscript, MemoryTranscript, TranscriptSink};
use agentpipe::Agent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Replies from a queue (repeating the last one), counting calls and keeping prompts.
struct SequencedMockClient {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl SequencedMockClient {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(String::new()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientWrapper for SequencedMockClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(messages.to_vec());
        let mut last = self.last.lock().await;
        if let Some(next) = self.responses.lock().await.pop_front() {
            *last = next;
        }
        Ok(Message::new(Role::Assistant, &last))
    }

    fn model_name(&self) -> &str {
        "sequenced-mock"
    }
}

struct FailingClient;

#[async_trait]
impl ClientWrapper for FailingClient {
    async fn send_message(
        &self,
        _messages: &[Message],
    ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        Err("503 Service Unavailable".into())
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Fails any code containing `raise`, succeeds otherwise.
#[derive(Default)]
struct ScriptedRunner {
    executed: std::sync::Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn executions(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeRunner for ScriptedRunner {
    async fn execute(&self, code: &str) -> Result<(), SandboxFault> {
        self.executed.lock().unwrap().push(code.to_string());
        if code.contains("raise") {
            Err(SandboxFault::new("ValueError: bad"))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        "ScriptedRunner"
    }
}

struct BrokenApproval;

#[async_trait]
impl ApprovalChannel for BrokenApproval {
    async fn request_approval(
        &self,
        _stage: &str,
        _summary: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Err("stdin closed".into())
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<PipelineEvent>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_pipeline_event(&self, event: &PipelineEvent) {
        self.events.lock().await.push(event.clone());
    }
}

struct Clients {
    cleaning: Arc<dyn ClientWrapper>,
    statistics: Arc<dyn ClientWrapper>,
    checker: Arc<SequencedMockClient>,
    code: Arc<SequencedMockClient>,
    writer: Arc<SequencedMockClient>,
    reviewer: Arc<SequencedMockClient>,
}

impl Clients {
    fn with_code(code_replies: &[&str]) -> Self {
        Self {
            cleaning: SequencedMockClient::new(&["{\"cleaned_data\": {\"row_count\": 2}}"]),
            statistics: SequencedMockClient::new(&["{\"statistics\": {\"value\": {\"mean\": 1.5}}}"]),
            checker: SequencedMockClient::new(&["{\"title\": \"Approved\"}"]),
            code: SequencedMockClient::new(code_replies),
            writer: SequencedMockClient::new(&["# Final Report\n\n## Overview"]),
            reviewer: SequencedMockClient::new(&["Approved"]),
        }
    }

    fn agents(&self) -> PipelineAgents {
        let make = |id: &str, client: Arc<dyn ClientWrapper>| -> Arc<dyn Participant> {
            Arc::new(Agent::new(id, id, client).with_instructions(format!("You are {}.", id)))
        };
        PipelineAgents {
            data_cleaning: make("DataCleaning", self.cleaning.clone()),
            data_statistics: make("DataStatistics", self.statistics.clone()),
            analysis_checker: make("AnalysisChecker", self.checker.clone()),
            code_generator: make("PythonExecutorAgent", self.code.clone()),
            report_generator: make("ReportGenerator", self.writer.clone()),
            report_checker: make("ReportChecker", self.reviewer.clone()),
        }
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        code_max_iterations: 1,
        ..PipelineConfig::default()
    }
}

struct Harness {
    runner: Arc<ScriptedRunner>,
    artifacts: Arc<MemoryArtifactSink>,
    transcript: Arc<MemoryTranscript>,
    events: Arc<RecordingHandler>,
    orchestrator: PipelineOrchestrator,
}

fn harness(clients: &Clients, approval: Arc<dyn ApprovalChannel>) -> Harness {
    let runner = Arc::new(ScriptedRunner::default());
    let artifacts = Arc::new(MemoryArtifactSink::new());
    let transcript = Arc::new(MemoryTranscript::new());
    let events = Arc::new(RecordingHandler::default());
    let orchestrator = PipelineOrchestrator::new(
        clients.agents(),
        CodeSandbox::new(runner.clone()),
        approval,
        artifacts.clone(),
        transcript.clone(),
        config(),
    )
    .with_event_handler(events.clone());
    Harness {
        runner,
        artifacts,
        transcript,
        events,
        orchestrator,
    }
}

#[tokio::test]
async fn test_happy_path_persists_all_artifacts() {
    let clients = Clients::with_code(&["Here you go:\n```python\nprint('ok')\n```"]);
    let h = harness(&clients, Arc::new(AutoApprove));

    let outcome = h.orchestrator.run("data/sample.csv", "a, 1, b, 2").await.unwrap();

    assert_eq!(outcome.status, PipelineStatus::Completed);
    assert_eq!(outcome.state.stage, PipelineStage::Completed);
    assert_eq!(outcome.state.feedback_rounds_used, 0);
    assert_eq!(outcome.state.sandbox.as_ref().unwrap().attempts, 1);
    assert!(outcome.state.analysis_reason.as_ref().unwrap().is_approved());
    assert_eq!(
        outcome.state.artifacts,
        vec![CLEANED_DATA, VISUALIZATION_SCRIPT, FINAL_REPORT]
    );

    assert_eq!(
        h.artifacts.get(CLEANED_DATA).await.as_deref(),
        Some("{\"title\": \"Approved\"}")
    );
    assert_eq!(
        h.artifacts.get(VISUALIZATION_SCRIPT).await.as_deref(),
        Some("print('ok')")
    );
    assert_eq!(
        h.artifacts.get(FINAL_REPORT).await.as_deref(),
        Some("# Final Report\n\n## Overview")
    );
    assert_eq!(h.runner.executions(), 1);
    assert_eq!(clients.checker.calls(), 1);
    assert_eq!(clients.reviewer.calls(), 1);
}

#[tokio::test]
async fn test_report_seed_contains_analysis_and_transcript_tail() {
    let clients = Clients::with_code(&["print('ok')"]);
    let h = harness(&clients, Arc::new(AutoApprove));
    h.orchestrator.run("data/sample.csv", "a, 1").await.unwrap();

    let prompts = clients.writer.prompts.lock().await;
    let seed = &prompts[0][1];
    assert_eq!(seed.role, Role::User);
    assert!(seed.content.contains("Analysis Results:\n{\"title\": \"Approved\"}"));
    assert!(seed.content.contains("Agent Logs:\n"));
    assert!(seed.content.contains("analysis - assistant - DataCleaning:"));
    assert!(seed.content.contains("code - assistant - PythonExecutorAgent: print('ok')"));

    // 3 analysis turns + 1 code turn + 2 report turns
    let records = h.transcript.records().await;
    assert_eq!(records.len(), 6);
    assert_eq!(records[0].stage, "analysis");
    assert_eq!(records[5].author.as_deref(), Some("ReportChecker"));
}

#[tokio::test]
async fn test_declined_analysis_stops_pipeline() {
    let clients = Clients::with_code(&["print('never')"]);
    let h = harness(&clients, Arc::new(AutoDecline));

    let outcome = h.orchestrator.run("data/sample.csv", "a, 1").await.unwrap();

    assert_eq!(outcome.status, PipelineStatus::Declined);
    assert_eq!(outcome.state.stage, PipelineStage::Aborted);
    assert!(outcome.state.analysis.is_some());
    assert!(h.artifacts.names().await.is_empty());
    assert_eq!(clients.code.calls(), 0);
    assert_eq!(clients.writer.calls(), 0);
    assert_eq!(h.runner.executions(), 0);
}

#[tokio::test]
async fn test_single_feedback_round_recovers() {
    let clients = Clients::with_code(&["raise ValueError('bad')", "```python\nprint('fixed')\n```"]);
    let h = harness(&clients, Arc::new(AutoApprove));

    let outcome = h.orchestrator.run("data/sample.csv", "a, 1").await.unwrap();

    assert_eq!(outcome.status, PipelineStatus::Completed);
    assert_eq!(outcome.state.feedback_rounds_used, 1);
    // three attempts on the broken script, one on the fix
    assert_eq!(h.runner.executions(), 4);
    assert_eq!(clients.code.calls(), 2);
    assert_eq!(
        h.artifacts.get(VISUALIZATION_SCRIPT).await.as_deref(),
        Some("print('fixed')")
    );

    let prompts = clients.code.prompts.lock().await;
    let feedback = prompts[1]
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .unwrap();
    assert_eq!(
        &*feedback.content,
        "The code failed with error: ValueError: bad. Please fix it."
    );
}

#[tokio::test]
async fn test_execution_failure_halts_before_report() {
    let clients = Clients::with_code(&["raise ValueError('bad')"]);
    let h = harness(&clients, Arc::new(AutoApprove));

    let outcome = h.orchestrator.run("data/sample.csv", "a, 1").await.unwrap();

    assert_eq!(
        outcome.status,
        PipelineStatus::ExecutionFailed {
            error: "ValueError: bad".to_string()
        }
    );
    assert_eq!(outcome.state.feedback_rounds_used, 1);
    assert_eq!(h.runner.executions(), 6);
    assert_eq!(clients.code.calls(), 2);
    assert_eq!(clients.writer.calls(), 0);
    assert_eq!(h.artifacts.names().await, vec![CLEANED_DATA.to_string()]);
    assert!(outcome.state.report.is_none());
}

#[tokio::test]
async fn test_backend_failure_aborts_pipeline() {
    let mut clients = Clients::with_code(&["print('ok')"]);
    clients.statistics = Arc::new(FailingClient);
    let h = harness(&clients, Arc::new(AutoApprove));

    let err = h.orchestrator.run("data/sample.csv", "a, 1").await.unwrap_err();
    match err {
        PipelineError::Chat {
            stage: PipelineStage::Analysis,
            source: ChatError::BackendUnavailable { agent_id, .. },
        } => assert_eq!(agent_id, "DataStatistics"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(clients.checker.calls(), 0);
    assert!(h.artifacts.names().await.is_empty());
    let events = h.events.events.lock().await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::ApprovalRequested { .. })));
}

#[tokio::test]
async fn test_approval_channel_failure_is_an_error() {
    let clients = Clients::with_code(&["print('ok')"]);
    let h = harness(&clients, Arc::new(BrokenApproval));

    let err = h.orchestrator.run("data/sample.csv", "a, 1").await.unwrap_err();
    assert!(matches!(err, PipelineError::Approval(_)));
    assert_eq!(clients.code.calls(), 0);
}

#[tokio::test]
async fn test_pipeline_events_in_order() {
    let clients = Clients::with_code(&["raise ValueError('bad')", "print('fixed')"]);
    let h = harness(&clients, Arc::new(AutoApprove));
    let outcome = h.orchestrator.run("data/sample.csv", "a, 1").await.unwrap();

    let events = h.events.events.lock().await;
    assert!(matches!(
        events.first(),
        Some(PipelineEvent::StageStarted {
            stage: PipelineStage::Analysis,
            ..
        })
    ));
    match events.last() {
        Some(PipelineEvent::PipelineFinished { run_id, status }) => {
            assert_eq!(run_id, &outcome.state.run_id);
            assert_eq!(status, &PipelineStatus::Completed);
        }
        other => panic!("unexpected last event: {:?}", other),
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::ApprovalDecided { approved: true, .. })));
    let failed_attempts = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::SandboxAttemptFailed { .. }))
        .count();
    assert_eq!(failed_attempts, 3);
    let feedback_rounds = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::FeedbackRoundStarted { round: 1, .. }))
        .count();
    assert_eq!(feedback_rounds, 1);
}

#[tokio::test]
async fn test_file_sinks_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let artifacts_dir = tmp.path().join("artifacts");
    let log_path = tmp.path().join("logs").join("agent_chat.log");

    let clients = Clients::with_code(&["print('ok')"]);
    let transcript = Arc::new(FileTranscript::create(&log_path).await.unwrap());
    let orchestrator = PipelineOrchestrator::new(
        clients.agents(),
        CodeSandbox::new(Arc::new(ScriptedRunner::default())),
        Arc::new(AutoApprove),
        Arc::new(FileArtifactSink::new(&artifacts_dir)),
        transcript.clone(),
        config(),
    );

    let outcome = orchestrator.run("data/sample.csv", "a, 1").await.unwrap();
    assert!(outcome.status.is_completed());

    for name in [CLEANED_DATA, VISUALIZATION_SCRIPT, FINAL_REPORT] {
        assert!(artifacts_dir.join(name).is_file(), "missing {}", name);
    }
    let tail = transcript.tail(50).await.unwrap();
    assert!(tail.iter().any(|l| l.contains("report - assistant - ReportChecker: Approved")));
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("analysis - assistant - AnalysisChecker:"));
}

#[tokio::test]
async fn test_code_seed_points_into_configured_artifacts_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let artifacts_dir = tmp.path().join("run-9");

    let clients = Clients::with_code(&["print('ok')"]);
    let orchestrator = PipelineOrchestrator::new(
        clients.agents(),
        CodeSandbox::new(Arc::new(ScriptedRunner::default())),
        Arc::new(AutoApprove),
        Arc::new(FileArtifactSink::new(&artifacts_dir)),
        Arc::new(MemoryTranscript::new()),
        PipelineConfig {
            artifacts_dir: artifacts_dir.clone(),
            ..config()
        },
    );
    orchestrator.run("data/sample.csv", "a, 1").await.unwrap();

    let expected = artifacts_dir.join("data_visualization.png");
    let prompts = clients.code.prompts.lock().await;
    let seed = &prompts[0][1];
    assert!(seed
        .content
        .contains(&format!("Save the plot to '{}'", expected.display())));
}

#[tokio::test]
async fn test_unfenced_script_with_banner_comments_is_stored_whole() {
    let script = "import pandas as pd\n# ~~~~~~~~~~~~\n# Plot\n# ~~~~~~~~~~~~\nprint(pd.__version__)";
    let clients = Clients::with_code(&[script]);
    let h = harness(&clients, Arc::new(AutoApprove));

    let outcome = h.orchestrator.run("data/sample.csv", "a, 1").await.unwrap();

    assert_eq!(outcome.status, PipelineStatus::Completed);
    assert_eq!(outcome.state.code.as_deref(), Some(script));
    assert_eq!(
        h.artifacts.get(VISUALIZATION_SCRIPT).await.as_deref(),
        Some(script)
    );
}
