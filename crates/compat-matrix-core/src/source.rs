//! Snapshot acquisition.
//!
//! [`SnapshotSource`] abstracts where a snapshot's text comes from so the
//! pipeline can decode file snapshots and live scrapes the same way.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::Result;

/// Injectable source of one telemetry snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Human-readable origin, used as the snapshot's provenance.
    fn describe(&self) -> String;

    /// Fetch the snapshot text. `Ok(None)` means the source had no data.
    async fn fetch(&self) -> Result<Option<String>>;
}

/// Snapshot stored in a file.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used for provenance parsing.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    fn describe(&self) -> String {
        self.file_name()
    }

    async fn fetch(&self) -> Result<Option<String>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(Some(text))
    }
}
