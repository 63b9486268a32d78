//! Compatibility Matrix Core Library
//!
//! Decodes proxy telemetry snapshots, judges per-flow traffic balance,
//! aggregates verdicts per client/server version pair and reconciles them
//! with test-execution evidence.

pub mod aggregator;
pub mod balance;
pub mod catalog;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod evidence;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod provenance;
pub mod report;
pub mod reporting;
pub mod scrape;
pub mod source;
pub mod telemetry;

pub use aggregator::{
    aggregate, CombinationResult, CompatibilityMatrix, GroupResult, MatrixSummary,
};
pub use balance::{evaluate, evaluate_flow, FlowVerdict};
pub use catalog::{id_to_name, name_to_id, ApiKey, CatalogEntry};
pub use config::MatrixConfig;
pub use decoder::{decode_snapshot, DecodedSnapshot, ObservationParser, PrometheusTextParser};
pub use domain::{
    CombinationKey, ErrorSide, ErrorTotals, FlowTuple, LegTotals, MatrixError, Observation,
    Result, TrafficLeg, TransportMode, Verdict,
};
pub use evidence::{
    parse_execution_summary, parse_setup_status, EvidenceAgreement, EvidenceSet,
    ExecutionSummary, SetupStatus,
};
pub use pipeline::{run_batch, BatchOutcome, SkippedSource};
pub use provenance::parse_provenance;
pub use report::{CompatibilityReport, FlowDetailRow};
pub use reporting::{write_all, ReportPaths};
pub use scrape::{scrape_to_file, HttpSnapshotSource};
pub use source::{FileSnapshotSource, SnapshotSource};
pub use telemetry::init_tracing;

/// Crate version, stamped into CLI output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
