//! Live telemetry scrape over HTTP.
//!
//! A convenience path for capturing a snapshot straight from the proxy's
//! metrics endpoint. Every failure is soft: the source reports "no data" and
//! logs a warning instead of failing the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::MatrixConfig;
use crate::domain::{CombinationKey, Result};
use crate::provenance::provenance_stem;
use crate::source::SnapshotSource;

/// Snapshot fetched from a live metrics endpoint.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    /// Build a source with a bounded per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &MatrixConfig) -> Result<Self> {
        Self::new(
            config.scrape_url.clone(),
            Duration::from_secs(config.scrape_timeout_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn try_fetch(&self) -> std::result::Result<String, reqwest::Error> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Option<String>> {
        match self.try_fetch().await {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "telemetry scrape failed");
                Ok(None)
            }
        }
    }
}

/// Scrape once and persist the snapshot under the file name the batch
/// pipeline expects for `key`. Returns `None` when the scrape had no data.
pub async fn scrape_to_file(
    source: &dyn SnapshotSource,
    key: &CombinationKey,
    output_dir: &Path,
    config: &MatrixConfig,
) -> Result<Option<PathBuf>> {
    let Some(text) = source.fetch().await? else {
        return Ok(None);
    };
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(format!(
        "{}{}",
        provenance_stem(key, config),
        config.snapshot_suffix
    ));
    tokio::fs::write(&path, text).await?;
    tracing::info!(path = %path.display(), source = %source.describe(), "snapshot captured");
    Ok(Some(path))
}
