//! Core pipeline types.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};

/// Pooled, L2-normalized vector for a whole text.
pub type DenseEmbedding = Vec<f32>;

/// Vocabulary id → lexical weight. Keys are unique, values strictly positive.
pub type SparseWeights = BTreeMap<i64, f32>;

/// One vector per attended token, in sequence order.
pub type MultiVector = Vec<Vec<f32>>;

/// A token id and its position in the sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    /// Vocabulary id.
    pub token_id: i64,
    /// Position within the sequence; the authoritative ordering key.
    pub position: i64,
}

/// Raw tokenizer output: three parallel sequences in no particular order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RaggedTokens {
    /// Vocabulary ids.
    pub tokens: Vec<i64>,
    /// Batch position of each token (always 0 for a single text).
    pub instance_indices: Vec<i64>,
    /// Position of each token within its sequence.
    pub token_indices: Vec<i64>,
}

impl RaggedTokens {
    /// Build from already-ordered ids for a single text.
    pub fn from_ordered(ids: impl IntoIterator<Item = i64>) -> Self {
        let tokens: Vec<i64> = ids.into_iter().collect();
        #[allow(clippy::cast_possible_wrap)]
        let token_indices = (0..tokens.len()).map(|i| i as i64).collect();
        Self {
            instance_indices: vec![0; tokens.len()],
            tokens,
            token_indices,
        }
    }
}

/// Model inputs for one text: `ids` and `attention_mask`, both `[1, N]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputTensors {
    /// Token ids, shape `[1, N]`.
    pub ids: Array2<i64>,
    /// Attention mask, shape `[1, N]`, 1 for attended positions.
    pub attention_mask: Array2<i64>,
}

impl InputTensors {
    /// Sequence length `N`.
    pub fn seq_len(&self) -> usize {
        self.ids.ncols()
    }
}

/// Raw model output tensors.
///
/// Dense-only models populate just `dense`.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelOutputs {
    /// Pooled output, `[1, D]`.
    pub dense: ArrayD<f32>,
    /// Per-position lexical scores, `[1, N, H]` or `[1, N]`.
    pub sparse: Option<ArrayD<f32>>,
    /// Per-position hidden vectors, `[1, N, D2]`.
    pub multi_vector: Option<ArrayD<f32>>,
}

/// Everything extracted for one text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Representations {
    /// Dense embedding.
    pub dense: DenseEmbedding,
    /// Lexical weights, when the model emits them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseWeights>,
    /// Token-level vectors, when the model emits them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_vector: Option<MultiVector>,
}
