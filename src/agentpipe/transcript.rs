//! Per-turn audit log of a pipeline run.
//!
//! Every message emitted by any stage is handed to a [`TranscriptSink`] as a
//! [`TurnRecord`]. The report stage reads the log back through
//! [`TranscriptSink::tail`] to show the report writer how the run unfolded.
//!
//! The text format is one record per line:
//!
//! ```text
//! 2026-01-05T10:12:03.123Z - analysis - assistant - AnalysisChecker: Approved
//! ```
//!
//! Multi-line content spans several physical lines, exactly as it was spoken.

use crate::client_wrapper::Role;
use crate::history::ChatMessage;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One transcript entry.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub timestamp: DateTime<Utc>,
    /// Pipeline stage the message belongs to (e.g. `"analysis"`).
    pub stage: String,
    pub role: Role,
    pub author: Option<String>,
    pub content: String,
}

impl TurnRecord {
    pub fn from_message(stage: &str, message: &ChatMessage) -> Self {
        Self {
            timestamp: message.timestamp,
            stage: stage.to_string(),
            role: message.role,
            author: message.author.clone(),
            content: message.content.to_string(),
        }
    }

    /// `"{timestamp} - {stage} - {role} - {author}: {content}"`, author `*` when absent.
    pub fn to_log_line(&self) -> String {
        format!(
            "{} - {} - {} - {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.stage,
            self.role,
            self.author.as_deref().unwrap_or("*"),
            self.content
        )
    }
}

/// Append-only destination for [`TurnRecord`]s.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn record(&self, record: &TurnRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// The last `n` non-empty lines of the log, oldest first.
    async fn tail(&self, n: usize) -> Result<Vec<String>, Box<dyn Error + Send + Sync>>;
}

/// On-disk line format of a [`FileTranscript`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscriptFormat {
    /// Human-readable lines, see [`TurnRecord::to_log_line`].
    #[default]
    Text,
    /// One JSON object per record.
    JsonLines,
}

/// Transcript written to a file. The file is truncated when opened.
pub struct FileTranscript {
    path: PathBuf,
    format: TranscriptFormat,
    file: Mutex<tokio::fs::File>,
}

impl FileTranscript {
    /// Create (or truncate) the log at `path`, creating parent directories.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Self::create_with_format(path, TranscriptFormat::Text).await
    }

    pub async fn create_with_format(
        path: impl Into<PathBuf>,
        format: TranscriptFormat,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = tokio::fs::File::create(&path).await?;
        log::debug!("FileTranscript::create(...): logging turns to {}", path.display());
        Ok(Self {
            path,
            format,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self, record: &TurnRecord) -> Result<String, serde_json::Error> {
        match self.format {
            TranscriptFormat::Text => Ok(record.to_log_line()),
            TranscriptFormat::JsonLines => serde_json::to_string(record),
        }
    }
}

#[async_trait]
impl TranscriptSink for FileTranscript {
    async fn record(&self, record: &TurnRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut line = self.render(record)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn tail(&self, n: usize) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        // Hold the writer lock so a concurrent record cannot be half-read.
        let _guard = self.file.lock().await;
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(last_lines(&text, n))
    }
}

/// Transcript kept in memory, rendered in the text format.
#[derive(Debug, Default)]
pub struct MemoryTranscript {
    records: Mutex<Vec<TurnRecord>>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<TurnRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl TranscriptSink for MemoryTranscript {
    async fn record(&self, record: &TurnRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn tail(&self, n: usize) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        let records = self.records.lock().await;
        let text = records
            .iter()
            .map(TurnRecord::to_log_line)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(last_lines(&text, n))
    }
}

fn last_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(author: Option<&str>, content: &str) -> TurnRecord {
        TurnRecord {
            timestamp: Utc::now(),
            stage: "analysis".to_string(),
            role: if author.is_some() { Role::Assistant } else { Role::User },
            author: author.map(str::to_string),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_log_line_format() {
        let line = record(Some("AnalysisChecker"), "Approved").to_log_line();
        assert!(line.ends_with(" - analysis - assistant - AnalysisChecker: Approved"));
        let line = record(None, "seed").to_log_line();
        assert!(line.ends_with(" - analysis - user - *: seed"));
    }

    #[test]
    fn test_last_lines_window() {
        let text = "a\n\nb\nc\n";
        assert_eq!(last_lines(text, 2), vec!["b", "c"]);
        assert_eq!(last_lines(text, 50), vec!["a", "b", "c"]);
        assert!(last_lines(text, 0).is_empty());
    }

    #[tokio::test]
    async fn test_memory_transcript_tail() {
        let transcript = MemoryTranscript::new();
        for i in 0..5 {
            transcript
                .record(&record(Some("DataCleaning"), &format!("turn {}", i)))
                .await
                .unwrap();
        }
        let tail = transcript.tail(2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].ends_with("turn 3"));
        assert!(tail[1].ends_with("turn 4"));
        assert_eq!(transcript.records().await.len(), 5);
    }

    #[tokio::test]
    async fn test_file_transcript_truncates_on_create() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs").join("agent_chat.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale line from a previous run\n").unwrap();

        let transcript = FileTranscript::create(&path).await.unwrap();
        transcript
            .record(&record(Some("ReportGenerator"), "line one\nline two"))
            .await
            .unwrap();
        let tail = transcript.tail(50).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].contains("ReportGenerator: line one"));
        assert_eq!(tail[1], "line two");
    }

    #[tokio::test]
    async fn test_json_lines_format() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("turns.jsonl");
        let transcript = FileTranscript::create_with_format(&path, TranscriptFormat::JsonLines)
            .await
            .unwrap();
        transcript
            .record(&record(Some("PythonExecutorAgent"), "print(1)\nprint(2)"))
            .await
            .unwrap();
        let tail = transcript.tail(10).await.unwrap();
        assert_eq!(tail.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&tail[0]).unwrap();
        assert_eq!(value["author"], "PythonExecutorAgent");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "print(1)\nprint(2)");
    }
}
