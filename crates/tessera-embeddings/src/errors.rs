//! Embedding pipeline error types.
//!
//! Every variant is fatal to the call that produced it. Divergence from a
//! reference is not an error here; see `tessera-parity`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from tokenization, tensor construction, inference and extraction.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// A tokenizer, model or fixture file does not exist.
    #[error("missing resource: {}", path.display())]
    MissingResource {
        /// The offending path.
        path: PathBuf,
    },

    /// The tokenizer returned parallel sequences of different lengths.
    #[error("malformed tokenizer output: {0}")]
    MalformedTokenizerOutput(String),

    /// A model output tensor disagrees with the input sequence shape.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Similarity requested over vectors of different lengths.
    #[error("dimension mismatch: {left} != {right}")]
    DimensionMismatch {
        /// Length of the first vector.
        left: usize,
        /// Length of the second vector.
        right: usize,
    },

    /// Session creation failed.
    #[error("model initialization failed: {0}")]
    ModelInit(String),

    /// Tokenizer or model inference failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Result alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Extension trait to reduce `.map_err()` boilerplate when wrapping foreign errors.
pub trait ResultExt<T> {
    /// Wrap the error as [`EmbeddingError::Inference`] with `context` prefix.
    fn inference(self, context: &str) -> Result<T>;
    /// Wrap the error as [`EmbeddingError::ModelInit`] with `context` prefix.
    fn model_init(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn inference(self, context: &str) -> Result<T> {
        self.map_err(|e| EmbeddingError::Inference(format!("{context}: {e}")))
    }

    fn model_init(self, context: &str) -> Result<T> {
        self.map_err(|e| EmbeddingError::ModelInit(format!("{context}: {e}")))
    }
}

/// Fail with [`EmbeddingError::MissingResource`] unless `path` exists.
pub fn require_file(path: impl Into<PathBuf>) -> Result<PathBuf> {
    let path = path.into();
    if path.exists() {
        Ok(path)
    } else {
        Err(EmbeddingError::MissingResource { path })
    }
}
