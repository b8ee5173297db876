use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use agentpipe::approval::ConsoleApproval;
use agentpipe::artifacts::FileArtifactSink;
use agentpipe::config::{BackendConfig, PipelineConfig};
use agentpipe::event::{AgentEvent, ChatEvent, EventHandler, PipelineEvent};
use agentpipe::loader::{list_csv_files, load_csv_text, load_instruction_lines};
use agentpipe::personas::AgentInstructions;
use agentpipe::pipeline::{PipelineAgents, PipelineOrchestrator, PipelineStatus};
use agentpipe::sandbox::{CodeSandbox, PythonRunner};
use agentpipe::transcript::FileTranscript;
use async_trait::async_trait;

/// Prints pipeline progress to stdout.
struct ConsoleProgress;

#[async_trait]
impl EventHandler for ConsoleProgress {
    async fn on_agent_event(&self, event: &AgentEvent) {
        if let AgentEvent::TurnFailed { agent_id, error, .. } = event {
            println!("  ✗ {} failed: {}", agent_id, error);
        }
    }

    async fn on_chat_event(&self, event: &ChatEvent) {
        match event {
            ChatEvent::TurnCompleted {
                chat_id,
                agent_id,
                iteration,
                content_length,
            } => println!(
                "  [{}] #{} {} ({} chars)",
                chat_id, iteration, agent_id, content_length
            ),
            ChatEvent::RunFinished { chat_id, reason, .. } => {
                println!("  [{}] {}", chat_id, reason)
            }
            ChatEvent::RunAborted { .. } => {}
        }
    }

    async fn on_pipeline_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { stage, .. } => println!("\n▶ {} stage", stage),
            PipelineEvent::SandboxAttemptFailed {
                attempt,
                max_attempts,
                error,
            } => println!("  attempt {}/{} failed: {}", attempt, max_attempts, error),
            PipelineEvent::FeedbackRoundStarted { error, .. } => {
                println!("  sending the error back to the code agent: {}", error)
            }
            PipelineEvent::ArtifactStored { name, bytes, .. } => {
                println!("  saved {} ({} bytes)", name, bytes)
            }
            _ => {}
        }
    }
}

/// Ask the operator to pick one of `files` by number.
fn choose_csv(files: &[PathBuf]) -> io::Result<PathBuf> {
    println!("Available CSV files:");
    for (i, file) in files.iter().enumerate() {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.display().to_string());
        println!("{}. {}", i + 1, name);
    }

    let stdin = io::stdin();
    loop {
        print!("Select a CSV file by number: ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no selection made",
            ));
        }
        match line.trim().parse::<usize>() {
            Ok(choice) if (1..=files.len()).contains(&choice) => {
                return Ok(files[choice - 1].clone())
            }
            Ok(_) => println!("Invalid selection. Please try again."),
            Err(_) => println!("Invalid input. Please enter a number."),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    agentpipe::init_logger();

    let mut config = PipelineConfig::default();
    config.apply_env_overrides();
    let backend = BackendConfig::from_env()?;
    log::info!("main(): using backend {:?}", backend);

    let files = list_csv_files(&config.data_dir)?;
    let csv_path = choose_csv(&files)?;
    let data_text = load_csv_text(&csv_path)?;
    println!("Loaded data from {}", csv_path.display());

    let instructions = AgentInstructions::new(
        &load_instruction_lines(config.quality_instructions_path()),
        &load_instruction_lines(config.report_instructions_path()),
        &config.visualization_path(),
    );

    let progress: Arc<dyn EventHandler> = Arc::new(ConsoleProgress);
    let agents = PipelineAgents::from_instructions(
        backend.build_client(),
        &instructions,
        Some(progress.clone()),
    );
    let runner = PythonRunner::new()
        .with_interpreter(config.python_interpreter.clone())
        .with_timeout(config.sandbox_timeout_secs)
        .with_isolated(config.sandbox_isolated)
        .with_env_var("MPLBACKEND", "Agg");

    let orchestrator = PipelineOrchestrator::new(
        agents,
        CodeSandbox::new(Arc::new(runner)),
        Arc::new(ConsoleApproval::new()),
        Arc::new(FileArtifactSink::new(config.artifacts_dir.clone())),
        Arc::new(FileTranscript::create(config.transcript_path.clone()).await?),
        config.clone(),
    )
    .with_event_handler(progress);

    let outcome = orchestrator
        .run(&csv_path.display().to_string(), &data_text)
        .await?;

    match &outcome.status {
        PipelineStatus::Completed => println!(
            "\nDone. Report saved to {}",
            config.artifacts_dir.join("final_report.md").display()
        ),
        PipelineStatus::Declined => println!("\nAnalysis not approved. Exiting workflow."),
        PipelineStatus::ExecutionFailed { error } => {
            println!("\nVisualization code could not be executed: {}", error)
        }
    }
    Ok(())
}
