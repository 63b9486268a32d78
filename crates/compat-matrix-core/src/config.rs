//! Engine configuration.
//!
//! Every field has a default so an empty TOML file (or no file at all) gives a
//! working configuration. CLI flags are layered on top by the binary.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{MatrixError, Result};

/// Operations whose imbalance is expected to vary across versions.
pub const DEFAULT_ACCEPTABLE_FAILURES: [&str; 4] = [
    "metadata",
    "describe_cluster",
    "find_coordinator",
    "api_versions",
];

/// Default live telemetry endpoint of the proxy.
pub const DEFAULT_SCRAPE_URL: &str = "http://localhost:9190/metrics";

/// Configuration for a matrix batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Client versions the matrix is expected to cover. Empty means "derive
    /// from what was observed".
    pub client_versions: Vec<String>,

    /// Server versions the matrix is expected to cover. Empty means "derive
    /// from what was observed".
    pub server_versions: Vec<String>,

    /// Operation names whose imbalance does not fail a combination.
    pub acceptable_failures: BTreeSet<String>,

    /// Accepted prefixes for the client token in provenance names.
    pub client_prefixes: Vec<String>,

    /// Prefix for the server token in provenance names.
    pub server_prefix: String,

    /// File name suffix of telemetry snapshots.
    pub snapshot_suffix: String,

    /// File name suffix of setup status blocks.
    pub status_suffix: String,

    /// Directory (under the results dir) holding execution summaries.
    pub evidence_dir: String,

    /// Live telemetry endpoint for scrapes.
    pub scrape_url: String,

    /// Upper bound on one scrape, in seconds.
    pub scrape_timeout_secs: u64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            client_versions: Vec::new(),
            server_versions: Vec::new(),
            acceptable_failures: DEFAULT_ACCEPTABLE_FAILURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            client_prefixes: vec!["client".to_string(), "java".to_string()],
            server_prefix: "server".to_string(),
            snapshot_suffix: "_metrics.txt".to_string(),
            status_suffix: "_status.txt".to_string(),
            evidence_dir: "test-results".to_string(),
            scrape_url: DEFAULT_SCRAPE_URL.to_string(),
            scrape_timeout_secs: 10,
        }
    }
}

impl MatrixConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: MatrixConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject configurations that would make provenance parsing impossible.
    pub fn validate(&self) -> Result<()> {
        if self.client_prefixes.iter().all(|p| p.is_empty()) {
            return Err(MatrixError::InvalidConfig(
                "client_prefixes must contain a non-empty prefix".to_string(),
            ));
        }
        if self.server_prefix.is_empty() {
            return Err(MatrixError::InvalidConfig(
                "server_prefix must not be empty".to_string(),
            ));
        }
        if self.snapshot_suffix.is_empty() || self.status_suffix.is_empty() {
            return Err(MatrixError::InvalidConfig(
                "file suffixes must not be empty".to_string(),
            ));
        }
        if self.snapshot_suffix == self.status_suffix {
            return Err(MatrixError::InvalidConfig(
                "snapshot_suffix and status_suffix must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an operation's imbalance is tolerated. Case-insensitive.
    pub fn is_acceptable_failure(&self, operation: &str) -> bool {
        let lower = operation.to_ascii_lowercase();
        self.acceptable_failures
            .iter()
            .any(|op| op.to_ascii_lowercase() == lower)
    }

    /// Replace the acceptable-failure set (builder pattern).
    pub fn with_acceptable_failures<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acceptable_failures = ops.into_iter().map(Into::into).collect();
        self
    }

    /// Set the expected version axes (builder pattern).
    pub fn with_versions(mut self, clients: Vec<String>, servers: Vec<String>) -> Self {
        self.client_versions = clients;
        self.server_versions = servers;
        self
    }
}
