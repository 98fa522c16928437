//! Persistence boundary for finished documents.
//!
//! The core does not prescribe a storage schema: it hands each
//! [`PersistedDocument`] to a [`ResultSink`]. [`JsonLinesSink`] is the
//! built-in file sink used by the CLI.

use crate::error::DocProcError;
use crate::summary::PersistedDocument;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

/// Receives finished documents.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn store(&self, record: &PersistedDocument) -> Result<(), DocProcError>;

    /// Called once after the last record. Default: nothing to do.
    async fn flush(&self) -> Result<(), DocProcError> {
        Ok(())
    }
}

/// Writes one JSON object per line.
///
/// Records are buffered and the file is replaced in one step on
/// [`flush`](ResultSink::flush) (temp file + rename), so readers never see a
/// half-written batch.
pub struct JsonLinesSink {
    path: PathBuf,
    lines: Mutex<Vec<String>>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonLinesSink {
    async fn store(&self, record: &PersistedDocument) -> Result<(), DocProcError> {
        let line = serde_json::to_string(record)
            .map_err(|e| DocProcError::Internal(format!("Failed to serialise record: {e}")))?;
        self.lines.lock().await.push(line);
        Ok(())
    }

    async fn flush(&self) -> Result<(), DocProcError> {
        let mut body = self.lines.lock().await.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        write_atomic(&self.path, body.as_bytes()).await?;
        info!("Wrote records to {}", self.path.display());
        Ok(())
    }
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DocProcError> {
    let write_failed = |source| DocProcError::SinkWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}
