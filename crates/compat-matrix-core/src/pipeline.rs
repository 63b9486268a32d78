//! Batch pipeline: discover, decode, aggregate, reconcile.
//!
//! Snapshot decoding is independent per file and runs concurrently on a
//! [`JoinSet`]; results are put back in discovery order before aggregation,
//! which runs single-threaded over the closed input set. Any per-item
//! failure becomes a [`SkippedSource`] and the batch carries on.

use std::collections::HashMap;
use std::fs::FileType;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::{Id, JoinSet};
use tracing::Instrument;

use crate::aggregator::{aggregate, CompatibilityMatrix};
use crate::config::MatrixConfig;
use crate::decoder::{decode_snapshot, DecodedSnapshot, ObservationParser, PrometheusTextParser};
use crate::domain::{MatrixError, Result, TransportMode};
use crate::evidence::{parse_execution_summary, parse_setup_status, EvidenceSet};
use crate::metrics::METRICS;
use crate::obs;
use crate::provenance::parse_provenance;
use crate::source::{FileSnapshotSource, SnapshotSource};

/// An input item that was left out of the batch, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

impl SkippedSource {
    fn new(source: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let source = source.into();
        obs::emit_source_skipped(&source, &reason);
        METRICS.inc_skipped();
        Self {
            source,
            reason: reason.to_string(),
        }
    }
}

/// Input files found in a results directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredInputs {
    pub snapshots: Vec<PathBuf>,
    pub status_blocks: Vec<PathBuf>,
    /// `(combination dir, group dir)` pairs under the evidence directory.
    pub evidence_dirs: Vec<(PathBuf, PathBuf)>,
}

/// Everything a batch produced.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub matrix: CompatibilityMatrix,
    pub snapshots: Vec<DecodedSnapshot>,
    pub skipped: Vec<SkippedSource>,
}

/// Directory entries sorted by path, with symlinks resolved to their
/// target's file type. Dangling links are dropped.
async fn sorted_entries(dir: &Path) -> Result<Vec<(PathBuf, FileType)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let mut file_type = entry.file_type().await?;
        if file_type.is_symlink() {
            match tokio::fs::metadata(&path).await {
                Ok(meta) => file_type = meta.file_type(),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "dangling symlink");
                    continue;
                }
            }
        }
        paths.push((path, file_type));
    }
    paths.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(paths)
}

fn dirs(entries: Vec<(PathBuf, FileType)>) -> impl Iterator<Item = PathBuf> {
    entries
        .into_iter()
        .filter(|(_, ft)| ft.is_dir())
        .map(|(path, _)| path)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// List snapshot files, status blocks and evidence directories.
///
/// Only the results directory itself must be readable; an unreadable
/// evidence subtree is logged and ignored.
pub async fn discover(results_dir: &Path, config: &MatrixConfig) -> Result<DiscoveredInputs> {
    let mut inputs = DiscoveredInputs::default();
    for (path, file_type) in sorted_entries(results_dir).await? {
        if !file_type.is_file() {
            continue;
        }
        let name = file_name(&path);
        if name.ends_with(&config.snapshot_suffix) {
            inputs.snapshots.push(path);
        } else if name.ends_with(&config.status_suffix) {
            inputs.status_blocks.push(path);
        }
    }

    let evidence_root = results_dir.join(&config.evidence_dir);
    match sorted_entries(&evidence_root).await {
        Ok(combo_dirs) => {
            for combo_dir in dirs(combo_dirs) {
                match sorted_entries(&combo_dir).await {
                    Ok(groups) => inputs
                        .evidence_dirs
                        .extend(dirs(groups).map(|g| (combo_dir.clone(), g))),
                    Err(e) => tracing::warn!(
                        dir = %combo_dir.display(),
                        error = %e,
                        "unreadable evidence directory"
                    ),
                }
            }
        }
        Err(MatrixError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            dir = %evidence_root.display(),
            error = %e,
            "unreadable evidence root"
        ),
    }

    Ok(inputs)
}

/// Decode a set of snapshot sources concurrently.
///
/// Output order follows input order regardless of completion order.
pub async fn decode_sources(
    sources: Vec<Arc<dyn SnapshotSource>>,
    parser: Arc<dyn ObservationParser>,
    config: &MatrixConfig,
) -> (Vec<DecodedSnapshot>, Vec<SkippedSource>) {
    let mut skipped = Vec::new();
    let mut join_set = JoinSet::new();
    let mut task_names: HashMap<Id, String> = HashMap::new();

    for (idx, source) in sources.into_iter().enumerate() {
        let name = source.describe();
        let key = match parse_provenance(&name, config) {
            Ok(key) => key,
            Err(e) => {
                skipped.push(SkippedSource::new(name, e));
                continue;
            }
        };
        let parser = Arc::clone(&parser);
        let task_name = name.clone();
        let handle = join_set.spawn(async move {
            let outcome = match source.fetch().await {
                Ok(Some(text)) => Ok(decode_snapshot(parser.as_ref(), key, name.clone(), &text)),
                Ok(None) => Err("source returned no data".to_string()),
                Err(e) => Err(e.to_string()),
            };
            (idx, name, outcome)
        });
        task_names.insert(handle.id(), task_name);
    }

    let mut decoded: Vec<(usize, DecodedSnapshot)> = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, _, Ok(snapshot))) => {
                METRICS.inc_snapshot_decoded(snapshot.observation_count as u64);
                obs::emit_snapshot_decoded(
                    &snapshot.source,
                    &snapshot.key,
                    snapshot.flows.len(),
                    snapshot.observation_count,
                );
                decoded.push((idx, snapshot));
            }
            Ok((_, name, Err(reason))) => skipped.push(SkippedSource::new(name, reason)),
            Err(e) => {
                let name = task_names
                    .remove(&e.id())
                    .unwrap_or_else(|| format!("decode task {}", e.id()));
                skipped.push(SkippedSource::new(name, format!("decode task failed: {e}")));
            }
        }
    }

    decoded.sort_by_key(|(idx, _)| *idx);
    skipped.sort_by(|a, b| a.source.cmp(&b.source));
    (decoded.into_iter().map(|(_, s)| s).collect(), skipped)
}

/// Read setup status blocks and execution summaries into an [`EvidenceSet`].
pub async fn collect_evidence(
    inputs: &DiscoveredInputs,
    config: &MatrixConfig,
) -> (EvidenceSet, Vec<SkippedSource>) {
    let mut evidence = EvidenceSet::new();
    let mut skipped = Vec::new();

    for path in &inputs.status_blocks {
        let name = file_name(path);
        let key = match parse_provenance(&name, config) {
            Ok(key) => key,
            Err(e) => {
                skipped.push(SkippedSource::new(name, e));
                continue;
            }
        };
        let status = match tokio::fs::read_to_string(path).await {
            Ok(text) => parse_setup_status(&name, &text),
            Err(e) => Err(MatrixError::Io(e)),
        };
        match status {
            Ok(status) => {
                METRICS.inc_evidence();
                evidence.add_setup(key, status);
            }
            Err(e) => skipped.push(SkippedSource::new(name, e)),
        }
    }

    for (combo_dir, group_dir) in &inputs.evidence_dirs {
        let source = format!("{}/{}", file_name(combo_dir), file_name(group_dir));
        let key = match parse_provenance(&file_name(combo_dir), config) {
            Ok(key) => key,
            Err(e) => {
                skipped.push(SkippedSource::new(source, e));
                continue;
            }
        };
        let transport = TransportMode::classify(&file_name(group_dir));

        let files = match sorted_entries(group_dir).await {
            Ok(files) => files,
            Err(e) => {
                skipped.push(SkippedSource::new(source, e));
                continue;
            }
        };

        let mut found = false;
        for (file, _) in files.iter().filter(|(_, ft)| ft.is_file()) {
            let text = match tokio::fs::read_to_string(file).await {
                Ok(text) => text,
                Err(e) => {
                    skipped.push(SkippedSource::new(
                        format!("{}/{}", source, file_name(file)),
                        e,
                    ));
                    continue;
                }
            };
            if let Some(summary) = parse_execution_summary(&text) {
                METRICS.inc_evidence();
                evidence.add_execution(key.clone(), transport, summary);
                found = true;
            }
        }
        if !found {
            skipped.push(SkippedSource::new(source, "no execution summary found"));
        }
    }

    (evidence, skipped)
}

/// Run the whole batch over a results directory.
///
/// Fails only when the directory itself cannot be read, or when nothing in
/// it was usable ([`MatrixError::NoUsableInput`]).
pub async fn run_batch(config: &MatrixConfig, results_dir: &Path) -> Result<BatchOutcome> {
    let root = results_dir.display().to_string();
    run_batch_inner(config, results_dir, &root)
        .instrument(obs::batch_span(&root))
        .await
}

async fn run_batch_inner(
    config: &MatrixConfig,
    results_dir: &Path,
    root: &str,
) -> Result<BatchOutcome> {
    let inputs = discover(results_dir, config).await?;
    obs::emit_batch_started(root, inputs.snapshots.len(), inputs.status_blocks.len());

    let sources: Vec<Arc<dyn SnapshotSource>> = inputs
        .snapshots
        .iter()
        .map(|p| Arc::new(FileSnapshotSource::new(p)) as Arc<dyn SnapshotSource>)
        .collect();
    let parser: Arc<dyn ObservationParser> = Arc::new(PrometheusTextParser::new());
    let (snapshots, mut skipped) = decode_sources(sources, parser, config).await;

    let (evidence, evidence_skipped) = collect_evidence(&inputs, config).await;
    skipped.extend(evidence_skipped);

    if snapshots.is_empty() && evidence.is_empty() {
        return Err(MatrixError::NoUsableInput {
            root: results_dir.to_path_buf(),
        });
    }

    let matrix = aggregate(&snapshots, &evidence, config);
    for combination in &matrix.combinations {
        obs::emit_combination_verdict(&combination.key, combination.verdict);
    }
    obs::emit_matrix_aggregated(
        matrix.summary.tested_combinations,
        matrix.summary.expected_combinations,
        matrix.summary.compatibility_percentage,
    );
    METRICS.flush();

    Ok(BatchOutcome {
        matrix,
        snapshots,
        skipped,
    })
}
