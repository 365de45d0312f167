//! Vector normalization and similarity functions.

use crate::errors::{EmbeddingError, Result};

/// Default multiplier for [`similarity_matrix`].
pub const DEFAULT_SIMILARITY_SCALE: f64 = 100.0;

/// Compute the L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize a vector in-place. Zero vectors remain zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity, accumulated in `f64`.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// `R×C` matrix of `cosine(queries[i], documents[j]) * scale`.
///
/// Inputs are not normalized here.
pub fn similarity_matrix<Q, D>(queries: &[Q], documents: &[D], scale: f64) -> Result<Vec<Vec<f64>>>
where
    Q: AsRef<[f32]>,
    D: AsRef<[f32]>,
{
    queries
        .iter()
        .map(|q| {
            documents
                .iter()
                .map(|d| cosine_similarity(q.as_ref(), d.as_ref()).map(|s| s * scale))
                .collect::<Result<Vec<f64>>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn l2_norm_known() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_known_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0), "zero vector stays zero");
    }

    #[test]
    fn cosine_identical() {
        let v = vec![0.6, 0.8];
        assert!(approx_eq(cosine_similarity(&v, &v).unwrap(), 1.0));
    }

    #[test]
    fn cosine_orthogonal() {
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0));
    }

    #[test]
    fn cosine_opposite() {
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap(), -1.0));
    }

    #[test]
    fn cosine_known_values() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let expected = 32.0 / (14.0f64.sqrt() * 77.0f64.sqrt());
        assert!(approx_eq(cosine_similarity(&a, &b).unwrap(), expected));
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        assert!(approx_eq(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0));
    }

    #[test]
    fn cosine_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { left: 2, right: 3 }
        ));
    }

    #[test]
    fn cosine_f64_accumulation_beats_f32() {
        // Many tiny components: an f32 accumulator drifts, f64 does not.
        let v = vec![1e-3f32; 100_000];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn matrix_shape_and_scale() {
        let queries = vec![vec![1.0f32, 0.0], vec![0.0, 1.0]];
        let docs = vec![vec![1.0f32, 0.0], vec![0.6, 0.8], vec![0.0, -1.0]];
        let m = similarity_matrix(&queries, &docs, DEFAULT_SIMILARITY_SCALE).unwrap();
        assert_eq!(m.len(), 2);
        assert!(m.iter().all(|row| row.len() == 3));
        assert!((m[0][0] - 100.0).abs() < 1e-4);
        assert!((m[0][1] - 60.0).abs() < 1e-4);
        assert!((m[1][1] - 80.0).abs() < 1e-4);
        assert!((m[1][2] + 100.0).abs() < 1e-4);
    }

    #[test]
    fn matrix_custom_scale() {
        let m = similarity_matrix(&[[1.0f32, 0.0]], &[[1.0f32, 0.0]], 1.0).unwrap();
        assert!(approx_eq(m[0][0], 1.0));
    }

    #[test]
    fn matrix_empty_inputs() {
        let empty: Vec<Vec<f32>> = Vec::new();
        assert!(similarity_matrix(&empty, &[vec![1.0f32]], 100.0).unwrap().is_empty());
        let m = similarity_matrix(&[vec![1.0f32]], &empty, 100.0).unwrap();
        assert_eq!(m, vec![Vec::<f64>::new()]);
    }

    #[test]
    fn matrix_propagates_dimension_mismatch() {
        let result = similarity_matrix(&[vec![1.0f32, 0.0]], &[vec![1.0f32]], 100.0);
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_produces_unit(v in proptest::collection::vec(-100.0f32..100.0, 1..64)) {
                let has_nonzero = v.iter().any(|x| *x != 0.0);
                let mut v = v;
                l2_normalize(&mut v);
                if has_nonzero {
                    prop_assert!((l2_norm(&v) - 1.0).abs() < 1e-4);
                }
            }

            #[test]
            fn cosine_symmetry_and_bounds(
                a in proptest::collection::vec(-100.0f32..100.0, 4..16),
                b in proptest::collection::vec(-100.0f32..100.0, 4..16),
            ) {
                let len = a.len().min(b.len());
                let (a, b) = (&a[..len], &b[..len]);
                let ab = cosine_similarity(a, b).unwrap();
                let ba = cosine_similarity(b, a).unwrap();
                prop_assert!((ab - ba).abs() < 1e-12);
                prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&ab));
            }
        }
    }
}
