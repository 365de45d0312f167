//! Parity error types.

use std::path::PathBuf;

use tessera_embeddings::EmbeddingError;
use thiserror::Error;

use crate::comparator::ComparisonReport;

/// Errors from fixture handling and reference comparison.
#[derive(Debug, Error)]
pub enum ParityError {
    /// The fixture file does not exist.
    #[error("missing resource: {}", path.display())]
    MissingResource {
        /// The offending path.
        path: PathBuf,
    },

    /// The fixture file exists but is not a valid reference set.
    #[error("malformed fixture file {}: {source}", path.display())]
    Fixture {
        /// File being parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A fixture entry parsed but holds an unusable value.
    #[error("invalid fixture '{id}': {reason}")]
    InvalidFixture {
        /// Fixture identifier.
        id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A reference set could not be serialized.
    #[error("failed to serialize fixtures: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Reading or writing a fixture file failed.
    #[error("fixture I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding a case failed while generating fixtures.
    #[error("encoding fixture '{fixture_id}' failed: {source}")]
    Embedding {
        /// Fixture being encoded.
        fixture_id: String,
        /// Pipeline error.
        #[source]
        source: EmbeddingError,
    },

    /// One or more fixtures diverged from their reference.
    #[error("{} of {} fixtures diverged", .0.failures.len(), .0.checked.len())]
    ComparisonFailed(ComparisonReport),
}

/// Result alias for parity operations.
pub type Result<T> = std::result::Result<T, ParityError>;
