//! Model input construction.

use ndarray::Array2;

use crate::errors::{EmbeddingError, Result};
use crate::types::InputTensors;

/// Build `[1, N]` id and attention-mask tensors for one unpadded text.
pub fn build_inputs(ids: &[i64]) -> Result<InputTensors> {
    let n = ids.len();
    let ids = Array2::from_shape_vec((1, n), ids.to_vec())
        .map_err(|e| EmbeddingError::ShapeMismatch(format!("input ids: {e}")))?;
    let attention_mask = Array2::ones((1, n));
    Ok(InputTensors {
        ids,
        attention_mask,
    })
}

/// Flatten a `[1, N]` tensor into an ONNX `(shape, data)` pair.
#[allow(clippy::cast_possible_wrap)]
pub fn to_onnx_parts(tensor: &Array2<i64>) -> (Vec<i64>, Vec<i64>) {
    let shape = tensor.shape().iter().map(|&d| d as i64).collect();
    (shape, tensor.iter().copied().collect())
}
