//! Human approval gate between pipeline stages.
//!
//! The orchestrator shows the operator a summary of the analysis and blocks
//! until an [`ApprovalChannel`] answers. Only an explicit approval lets the
//! pipeline continue; anything else declines.

use async_trait::async_trait;
use std::error::Error;
use std::io::{self, BufRead, Write};

/// Source of the operator's go/no-go decision.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Present `summary` for `stage` and return `true` only on explicit approval.
    ///
    /// An `Err` means the channel itself failed (e.g. stdin closed) and aborts
    /// the pipeline; it is not the same as a decline.
    async fn request_approval(
        &self,
        stage: &str,
        summary: &str,
    ) -> Result<bool, Box<dyn Error + Send + Sync>>;
}

/// `true` for an affirmative answer (`yes` or `y`, any case, surrounding
/// whitespace ignored).
pub fn parse_approval(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "yes" | "y")
}

/// Prints the summary on stdout and reads one line from stdin.
#[derive(Debug, Clone, Default)]
pub struct ConsoleApproval {
    /// Print at most this many characters of the summary; `None` prints it all.
    preview_chars: Option<usize>,
}

impl ConsoleApproval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = Some(chars);
        self
    }

    fn preview<'a>(&self, summary: &'a str) -> &'a str {
        match self.preview_chars {
            Some(limit) => match summary.char_indices().nth(limit) {
                Some((idx, _)) => &summary[..idx],
                None => summary,
            },
            None => summary,
        }
    }
}

#[async_trait]
impl ApprovalChannel for ConsoleApproval {
    async fn request_approval(
        &self,
        stage: &str,
        summary: &str,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let prompt = format!(
            "\n=== {} ===\n{}\n\nProceed? (yes/no): ",
            stage,
            self.preview(summary)
        );
        let answer = tokio::task::spawn_blocking(move || -> io::Result<Option<String>> {
            let mut stdout = io::stdout();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
            let mut line = String::new();
            let read = io::stdin().lock().read_line(&mut line)?;
            Ok(if read == 0 { None } else { Some(line) })
        })
        .await??;

        match answer {
            Some(line) => {
                let approved = parse_approval(&line);
                log::info!(
                    "ConsoleApproval::request_approval(...): operator answered {:?} for {}",
                    line.trim(),
                    stage
                );
                Ok(approved)
            }
            None => Err("stdin closed before an approval answer was read".into()),
        }
    }
}

/// Approves every request. For unattended runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalChannel for AutoApprove {
    async fn request_approval(
        &self,
        stage: &str,
        _summary: &str,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        log::debug!("AutoApprove::request_approval(...): approving {}", stage);
        Ok(true)
    }
}

/// Declines every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecline;

#[async_trait]
impl ApprovalChannel for AutoDecline {
    async fn request_approval(
        &self,
        stage: &str,
        _summary: &str,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        log::debug!("AutoDecline::request_approval(...): declining {}", stage);
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_approval() {
        assert!(parse_approval("yes"));
        assert!(parse_approval("  YES\n"));
        assert!(parse_approval("y"));
        assert!(!parse_approval("no"));
        assert!(!parse_approval("yes please"));
        assert!(!parse_approval(""));
        assert!(!parse_approval("approved"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let console = ConsoleApproval::new().with_preview_chars(3);
        assert_eq!(console.preview("ñandú"), "ñan");
        assert_eq!(console.preview("ab"), "ab");
        assert_eq!(ConsoleApproval::new().preview("full text"), "full text");
    }

    #[tokio::test]
    async fn test_auto_channels() {
        assert!(AutoApprove.request_approval("analysis", "s").await.unwrap());
        assert!(!AutoDecline.request_approval("analysis", "s").await.unwrap());
    }
}
