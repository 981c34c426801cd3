use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use volbal_core::{EngineError, EngineEvent, EventLogger};

/// Append-only event journal, one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesEventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesEventLog {
    /// Opens (or creates) the journal at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every event back from a journal file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on I/O failure or a malformed line.
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<EngineEvent>, EngineError> {
        let contents = tokio::fs::read_to_string(path).await?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .map_err(|e| EngineError::Storage(format!("journal line {}: {e}", n + 1)))
            })
            .collect()
    }
}

#[async_trait]
impl EventLogger for JsonLinesEventLog {
    async fn append(&self, event: EngineEvent) -> Result<(), EngineError> {
        let mut line = serde_json::to_string(&event)
            .map_err(|e| EngineError::Storage(format!("failed to serialize event: {e}")))?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
