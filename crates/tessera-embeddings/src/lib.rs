//! # tessera-embeddings
//!
//! Text → dense, sparse and multi-vector representations over `ONNX`
//! tokenizer and embedding models:
//! - Ragged tokenizer output reordered by position
//! - Single-row `ids` / `attention_mask` tensors
//! - Extraction of the pooled vector, per-token lexical weights and
//!   per-token vectors, skipping special and padded positions
//! - Cosine similarity and scaled query × document scoring
//!
//! The real sessions live behind the `ort` feature; [`mock`] provides
//! deterministic stand-ins for everything else.

#![deny(unsafe_code)]

pub mod embedder;
pub mod errors;
pub mod extract;
pub mod mock;
pub mod normalize;
#[cfg(feature = "ort")]
pub mod ort_service;
pub mod session;
pub mod tensors;
pub mod text;
pub mod tokens;
pub mod types;

pub use embedder::Embedder;
pub use errors::{EmbeddingError, Result};
pub use extract::{ExtractionConfig, extract};
pub use normalize::{DEFAULT_SIMILARITY_SCALE, cosine_similarity, l2_normalize, similarity_matrix};
pub use session::{ModelSession, RepresentationSource, TokenizerSession};
pub use text::{WEB_SEARCH_TASK, instruct_query};
pub use types::{DenseEmbedding, MultiVector, Representations, SparseWeights};

#[cfg(feature = "ort")]
pub use ort_service::{OrtEmbedder, open_embedder};
