//! Representation extraction from raw model outputs.
//!
//! - Dense: batch dimension removed, values passed through unchanged.
//! - Sparse: per attended, non-special position, the max score over the
//!   hidden dimension; strictly positive weights only; recurring ids keep
//!   their largest weight.
//! - Multi-vector: the hidden vector of every attended position, in order.

use std::collections::BTreeSet;

use ndarray::{ArrayD, ArrayView1, Axis};
use tessera_settings::ExtractionSettings;
use tracing::{debug, warn};

use crate::errors::{EmbeddingError, Result};
use crate::normalize::l2_norm;
use crate::types::{
    DenseEmbedding, InputTensors, ModelOutputs, MultiVector, Representations, SparseWeights,
};

/// Allowed deviation of a dense embedding's norm from 1.0 before warning.
pub const DENSE_NORM_TOLERANCE: f32 = 1e-4;

/// Extraction parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Vocabulary ids never reported in sparse weights.
    pub special_token_ids: BTreeSet<i64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self::from_settings(&ExtractionSettings::default())
    }
}

impl ExtractionConfig {
    /// Create config from settings.
    pub fn from_settings(s: &ExtractionSettings) -> Self {
        Self {
            special_token_ids: s.special_token_ids.iter().copied().collect(),
        }
    }
}

/// Extract every representation the model produced.
pub fn extract(
    inputs: &InputTensors,
    outputs: &ModelOutputs,
    config: &ExtractionConfig,
) -> Result<Representations> {
    check_inputs(inputs)?;
    let dense = extract_dense(&outputs.dense)?;
    let sparse = outputs
        .sparse
        .as_ref()
        .map(|t| extract_sparse(inputs, t, config))
        .transpose()?;
    let multi_vector = outputs
        .multi_vector
        .as_ref()
        .map(|t| extract_multi_vector(inputs, t))
        .transpose()?;
    Ok(Representations {
        dense,
        sparse,
        multi_vector,
    })
}

/// Remove the batch dimension from a `[1, D]` (or bare `[D]`) dense tensor.
pub fn extract_dense(dense: &ArrayD<f32>) -> Result<DenseEmbedding> {
    let vector: Vec<f32> = match dense.shape() {
        [_] => dense.iter().copied().collect(),
        [1, _] => dense.index_axis(Axis(0), 0).iter().copied().collect(),
        other => {
            return Err(EmbeddingError::ShapeMismatch(format!(
                "dense output must be [1, D], got {other:?}"
            )));
        }
    };

    let norm = l2_norm(&vector);
    if (norm - 1.0).abs() > DENSE_NORM_TOLERANCE {
        warn!(norm, dims = vector.len(), "dense embedding is not unit length");
    }
    Ok(vector)
}

/// Lexical weights from a `[1, N, H]` or `[1, N]` score tensor.
///
/// Positions past the tensor's sequence length are ignored.
pub fn extract_sparse(
    inputs: &InputTensors,
    sparse: &ArrayD<f32>,
    config: &ExtractionConfig,
) -> Result<SparseWeights> {
    check_inputs(inputs)?;
    let scores = match sparse.shape() {
        [1, _] | [1, _, _] => sparse.index_axis(Axis(0), 0),
        other => {
            return Err(EmbeddingError::ShapeMismatch(format!(
                "sparse output must be [1, N, H] or [1, N], got {other:?}"
            )));
        }
    };

    let n = inputs.seq_len();
    let scored = scores.len_of(Axis(0));
    if scored < n {
        debug!(scored, seq_len = n, "sparse output shorter than sequence");
    }

    let ids = inputs.ids.row(0);
    let mask = inputs.attention_mask.row(0);
    let mut weights = SparseWeights::new();

    for i in 0..n.min(scored) {
        let token_id = ids[i];
        if mask[i] != 1 || config.special_token_ids.contains(&token_id) {
            continue;
        }
        let weight = scores
            .index_axis(Axis(0), i)
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        if weight > 0.0 {
            let _ = weights
                .entry(token_id)
                .and_modify(|w| *w = w.max(weight))
                .or_insert(weight);
        }
    }

    Ok(weights)
}

/// Token vectors from a `[1, N, D2]` tensor, attended positions only.
pub fn extract_multi_vector(inputs: &InputTensors, tensor: &ArrayD<f32>) -> Result<MultiVector> {
    check_inputs(inputs)?;
    let n = inputs.seq_len();
    let vectors = match tensor.shape() {
        [1, seq, _] if *seq == n => tensor.index_axis(Axis(0), 0),
        other => {
            return Err(EmbeddingError::ShapeMismatch(format!(
                "multi-vector output must be [1, {n}, D], got {other:?}"
            )));
        }
    };

    let mask = inputs.attention_mask.row(0);
    Ok(vectors
        .axis_iter(Axis(0))
        .zip(mask.iter())
        .filter(|(_, m)| **m == 1)
        .map(|(row, _)| row.iter().copied().collect())
        .collect())
}

/// Number of attended positions.
pub fn attended_count(mask: ArrayView1<'_, i64>) -> usize {
    mask.iter().filter(|&&m| m == 1).count()
}

fn check_inputs(inputs: &InputTensors) -> Result<()> {
    if inputs.ids.nrows() != 1 || inputs.ids.shape() != inputs.attention_mask.shape() {
        return Err(EmbeddingError::ShapeMismatch(format!(
            "ids {:?} and attention mask {:?} must both be [1, N]",
            inputs.ids.shape(),
            inputs.attention_mask.shape()
        )));
    }
    Ok(())
}
