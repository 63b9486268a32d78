//! Error taxonomy for the compatibility-matrix engine.
//!
//! Most per-item failures are not errors at the batch level: they are turned
//! into skipped-source entries by the pipeline. These variants describe what
//! went wrong with one item, plus the single batch-level failure
//! ([`MatrixError::NoUsableInput`]).

use std::path::PathBuf;

/// Errors produced by the matrix engine.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("unparseable provenance: {0}")]
    UnparseableProvenance(String),

    #[error("malformed evidence in {source_name}: {detail}")]
    MalformedEvidence { source_name: String, detail: String },

    #[error("no usable input under {}", root.display())]
    NoUsableInput { root: PathBuf },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for matrix engine operations.
pub type Result<T> = std::result::Result<T, MatrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_provenance_display() {
        let err = MatrixError::UnparseableProvenance("random_file.txt".to_string());
        assert!(err.to_string().contains("unparseable provenance"));
        assert!(err.to_string().contains("random_file.txt"));
    }

    #[test]
    fn test_malformed_evidence_display() {
        let err = MatrixError::MalformedEvidence {
            source_name: "client3.6_server3.8_status.txt".to_string(),
            detail: "missing FAILURE_TYPE".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("client3.6_server3.8_status.txt"));
        assert!(msg.contains("missing FAILURE_TYPE"));
    }

    #[test]
    fn test_no_usable_input_names_root() {
        let err = MatrixError::NoUsableInput {
            root: PathBuf::from("/tmp/results"),
        };
        assert!(err.to_string().contains("/tmp/results"));
    }
}
