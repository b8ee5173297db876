//! Named text artifacts produced by a pipeline run.
//!
//! The orchestrator writes three artifacts: the approved analysis
//! ([`CLEANED_DATA`]), the working visualization script ([`VISUALIZATION_SCRIPT`])
//! and the final report ([`FINAL_REPORT`]). Where they land is up to the
//! [`ArtifactSink`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const CLEANED_DATA: &str = "cleaned_data.txt";
pub const VISUALIZATION_SCRIPT: &str = "visualization_script.py";
pub const FINAL_REPORT: &str = "final_report.md";

/// Destination for named artifacts. Storing an existing name replaces it.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn store(&self, name: &str, content: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Writes each artifact as a file inside one directory, created on demand.
#[derive(Debug, Clone)]
pub struct FileArtifactSink {
    dir: PathBuf,
}

impl FileArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactSink {
    async fn store(&self, name: &str, content: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(format!("invalid artifact name: {:?}", name).into());
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_of(name);
        tokio::fs::write(&path, content).await?;
        log::info!(
            "FileArtifactSink::store(...): wrote {} bytes to {}",
            content.len(),
            path.display()
        );
        Ok(())
    }
}

/// Keeps artifacts in memory.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    artifacts: Mutex<BTreeMap<String, String>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<String> {
        self.artifacts.lock().await.get(name).cloned()
    }

    /// Stored names in sorted order.
    pub async fn names(&self) -> Vec<String> {
        self.artifacts.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn store(&self, name: &str, content: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.artifacts
            .lock()
            .await
            .insert(name.to_string(), content.to_string());
        Ok(())
    }
}
