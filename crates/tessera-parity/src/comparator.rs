//! Numeric comparison of regenerated representations against fixtures.
//!
//! Every fixture is encoded and checked. A divergence or an encoding error
//! is recorded against its fixture and the run moves on.

use std::collections::BTreeSet;

use tessera_embeddings::{RepresentationSource, Representations, SparseWeights, cosine_similarity};
use tessera_settings::{ModelKind, ParitySettings};
use tracing::{debug, info, warn};

use crate::errors::{ParityError, Result};
use crate::fixtures::{ReferenceFixture, ReferenceSet};

/// Pass thresholds for each representation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    /// Dense cosine similarity must exceed this.
    pub dense_min_similarity: f64,
    /// Every per-token cosine similarity must exceed this.
    pub multi_vector_min_similarity: f64,
    /// Every per-key sparse difference must stay below this.
    pub sparse_max_abs_diff: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::from_settings(&ParitySettings::default())
    }
}

impl Tolerances {
    /// Create tolerances from settings.
    pub fn from_settings(s: &ParitySettings) -> Self {
        Self {
            dense_min_similarity: s.dense_min_similarity,
            multi_vector_min_similarity: s.multi_vector_min_similarity,
            sparse_max_abs_diff: s.sparse_max_abs_diff,
        }
    }
}

/// One failed check.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonFailure {
    /// Fixture that diverged.
    pub fixture_id: String,
    /// Which check failed and by how much.
    pub reason: String,
}

/// Outcome of a comparison run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComparisonReport {
    /// Every fixture identifier that was checked, in order.
    pub checked: Vec<String>,
    /// Every failed check.
    pub failures: Vec<ComparisonFailure>,
}

impl ComparisonReport {
    /// Whether every check passed.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Identifiers of fixtures with at least one failure, deduplicated.
    pub fn failed_fixtures(&self) -> BTreeSet<&str> {
        self.failures.iter().map(|f| f.fixture_id.as_str()).collect()
    }

    /// `Err(ComparisonFailed)` when any check failed.
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(ParityError::ComparisonFailed(self))
        }
    }
}

fn check_dense(candidate: &[f32], reference: &[f32], tol: &Tolerances) -> Option<String> {
    match cosine_similarity(candidate, reference) {
        Ok(sim) if sim > tol.dense_min_similarity => None,
        Ok(sim) => Some(format!(
            "dense cosine {sim:.6} not above {}",
            tol.dense_min_similarity
        )),
        Err(e) => Some(format!("dense {e}")),
    }
}

fn check_sparse(
    candidate: &SparseWeights,
    reference: &SparseWeights,
    tol: &Tolerances,
) -> Vec<String> {
    let mut reasons = Vec::new();

    let missing: Vec<i64> = reference
        .keys()
        .filter(|k| !candidate.contains_key(*k))
        .copied()
        .collect();
    let extra: Vec<i64> = candidate
        .keys()
        .filter(|k| !reference.contains_key(*k))
        .copied()
        .collect();
    if !missing.is_empty() {
        reasons.push(format!("sparse missing token ids {missing:?}"));
    }
    if !extra.is_empty() {
        reasons.push(format!("sparse unexpected token ids {extra:?}"));
    }

    for (id, &expected) in reference {
        if let Some(&actual) = candidate.get(id) {
            let diff = (f64::from(actual) - f64::from(expected)).abs();
            if diff >= tol.sparse_max_abs_diff {
                reasons.push(format!(
                    "sparse weight for token {id}: {actual} vs {expected} (|diff| {diff:e})"
                ));
            }
        }
    }
    reasons
}

fn check_multi_vector(
    candidate: &[Vec<f32>],
    reference: &[Vec<f32>],
    tol: &Tolerances,
) -> Vec<String> {
    if candidate.len() != reference.len() {
        return vec![format!(
            "multi-vector length {} vs {}",
            candidate.len(),
            reference.len()
        )];
    }
    candidate
        .iter()
        .zip(reference)
        .enumerate()
        .filter_map(|(i, (c, r))| match cosine_similarity(c, r) {
            Ok(sim) if sim > tol.multi_vector_min_similarity => None,
            Ok(sim) => Some(format!(
                "multi-vector position {i}: cosine {sim:.6} not above {}",
                tol.multi_vector_min_similarity
            )),
            Err(e) => Some(format!("multi-vector position {i}: {e}")),
        })
        .collect()
}

/// Check one candidate against its fixture; returns every failed check.
pub fn compare_record(
    fixture: &ReferenceFixture,
    candidate: &Representations,
    tol: &Tolerances,
) -> Vec<ComparisonFailure> {
    let expected = &fixture.expected;
    let mut reasons: Vec<String> = check_dense(&candidate.dense, &expected.dense, tol)
        .into_iter()
        .collect();

    if fixture.kind == ModelKind::MultiRepresentation {
        match (&candidate.sparse, &expected.sparse) {
            (Some(c), Some(r)) => reasons.extend(check_sparse(c, r, tol)),
            (None, Some(_)) => reasons.push("candidate produced no sparse weights".into()),
            _ => {}
        }
        match (&candidate.multi_vector, &expected.multi_vector) {
            (Some(c), Some(r)) => reasons.extend(check_multi_vector(c, r, tol)),
            (None, Some(_)) => reasons.push("candidate produced no multi-vector output".into()),
            _ => {}
        }
    }

    reasons
        .into_iter()
        .map(|reason| ComparisonFailure {
            fixture_id: fixture.id.clone(),
            reason,
        })
        .collect()
}

/// Regenerate every fixture through `source` and compare.
///
/// A fixture whose text fails to encode is reported as a failure with an
/// `encode:` reason; the remaining fixtures are still checked.
pub fn compare<S: RepresentationSource + ?Sized>(
    source: &mut S,
    set: &ReferenceSet,
    tol: &Tolerances,
) -> ComparisonReport {
    let mut report = ComparisonReport::default();
    for fixture in set.fixtures() {
        let failures = match source.encode(&fixture.text) {
            Ok(candidate) => compare_record(fixture, &candidate, tol),
            Err(e) => vec![ComparisonFailure {
                fixture_id: fixture.id.clone(),
                reason: format!("encode: {e}"),
            }],
        };
        if failures.is_empty() {
            debug!(fixture = %fixture.id, "fixture matches");
        } else {
            for f in &failures {
                warn!(fixture = %f.fixture_id, reason = %f.reason, "fixture diverged");
            }
        }
        report.checked.push(fixture.id.clone());
        report.failures.extend(failures);
    }
    info!(
        checked = report.checked.len(),
        failures = report.failures.len(),
        "comparison complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn multi_fixture(expected: Representations) -> ReferenceFixture {
        ReferenceFixture {
            id: "t".into(),
            text: "t".into(),
            kind: ModelKind::MultiRepresentation,
            expected,
        }
    }

    fn reps(dense: Vec<f32>, sparse: &[(i64, f32)], multi: Vec<Vec<f32>>) -> Representations {
        Representations {
            dense,
            sparse: Some(sparse.iter().copied().collect::<BTreeMap<_, _>>()),
            multi_vector: Some(multi),
        }
    }

    #[test]
    fn identical_passes() {
        let r = reps(vec![0.6, 0.8], &[(5, 0.25)], vec![vec![1.0, 0.0]]);
        assert!(compare_record(&multi_fixture(r.clone()), &r, &Tolerances::default()).is_empty());
    }

    #[test]
    fn dense_below_threshold_fails() {
        let fixture = multi_fixture(reps(vec![1.0, 0.0], &[], vec![]));
        let candidate = reps(vec![0.5, 0.866], &[], vec![]);
        let failures = compare_record(&fixture, &candidate, &Tolerances::default());
        assert_eq!(failures.len(), 1);
        assert!(failures[0].reason.starts_with("dense cosine 0.5"));
    }

    #[test]
    fn dense_threshold_is_strict() {
        let tol = Tolerances {
            dense_min_similarity: 1.0,
            ..Tolerances::default()
        };
        assert!(check_dense(&[1.0, 0.0], &[1.0, 0.0], &tol).is_some());
    }

    #[test]
    fn dense_dimension_mismatch_is_a_failure() {
        let reason = check_dense(&[1.0], &[1.0, 0.0], &Tolerances::default()).unwrap();
        assert!(reason.contains("dimension mismatch"));
    }

    #[test]
    fn sparse_key_sets_must_match() {
        let reference: SparseWeights = [(5, 0.5), (9, 0.1)].into_iter().collect();
        let candidate: SparseWeights = [(5, 0.5), (11, 0.1)].into_iter().collect();
        let reasons = check_sparse(&candidate, &reference, &Tolerances::default());
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("missing token ids [9]"));
        assert!(reasons[1].contains("unexpected token ids [11]"));
    }

    #[test]
    fn sparse_weight_tolerance() {
        let reference: SparseWeights = [(5, 0.5)].into_iter().collect();
        let close: SparseWeights = [(5, 0.500_000_1)].into_iter().collect();
        let far: SparseWeights = [(5, 0.501)].into_iter().collect();
        let tol = Tolerances::default();
        assert!(check_sparse(&close, &reference, &tol).is_empty());
        assert_eq!(check_sparse(&far, &reference, &tol).len(), 1);
    }

    #[test]
    fn multi_vector_length_mismatch() {
        let reasons = check_multi_vector(
            &[vec![1.0]],
            &[vec![1.0], vec![1.0]],
            &Tolerances::default(),
        );
        assert_eq!(reasons, vec!["multi-vector length 1 vs 2".to_string()]);
    }

    #[test]
    fn multi_vector_reports_each_bad_position() {
        let reference = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let candidate = vec![vec![0.0, 1.0], vec![0.0, 1.0], vec![-1.0, -1.0]];
        let reasons = check_multi_vector(&candidate, &reference, &Tolerances::default());
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].starts_with("multi-vector position 0"));
        assert!(reasons[1].starts_with("multi-vector position 2"));
    }

    #[test]
    fn dense_fixture_ignores_other_outputs() {
        let fixture = ReferenceFixture {
            id: "d".into(),
            text: "d".into(),
            kind: ModelKind::Dense,
            expected: Representations {
                dense: vec![1.0, 0.0],
                sparse: None,
                multi_vector: None,
            },
        };
        let candidate = reps(vec![1.0, 0.0], &[(7, 0.9)], vec![vec![0.3]]);
        assert!(compare_record(&fixture, &candidate, &Tolerances::default()).is_empty());
    }

    #[test]
    fn missing_candidate_outputs_fail() {
        let fixture = multi_fixture(reps(vec![1.0], &[(5, 0.5)], vec![vec![1.0]]));
        let candidate = Representations {
            dense: vec![1.0],
            sparse: None,
            multi_vector: None,
        };
        assert_eq!(
            compare_record(&fixture, &candidate, &Tolerances::default()).len(),
            2
        );
    }

    #[test]
    fn report_into_result() {
        assert!(ComparisonReport::default().into_result().is_ok());
        let report = ComparisonReport {
            checked: vec!["a".into()],
            failures: vec![ComparisonFailure {
                fixture_id: "a".into(),
                reason: "x".into(),
            }],
        };
        assert!(matches!(
            report.into_result(),
            Err(ParityError::ComparisonFailed(r)) if r.failed_fixtures().contains("a")
        ));
    }

    #[test]
    fn tolerances_from_settings() {
        let tol = Tolerances::default();
        assert!((tol.dense_min_similarity - 0.9999).abs() < f64::EPSILON);
        assert!((tol.sparse_max_abs_diff - 1e-6).abs() < f64::EPSILON);
    }

    mod proptests {
        use super::*;
        use proptest::collection::{btree_map, vec};
        use proptest::prelude::*;

        fn token_vectors() -> impl Strategy<Value = Vec<Vec<f32>>> {
            vec(vec(0.1f32..10.0, 4), 1..12)
        }

        proptest! {
            #[test]
            fn sparse_matches_itself(weights in btree_map(any::<i64>(), 0.0f32..10.0, 0..16)) {
                prop_assert!(check_sparse(&weights, &weights, &Tolerances::default()).is_empty());
            }

            #[test]
            fn dropped_sparse_key_is_reported(
                weights in btree_map(0i64..250_000, 0.0f32..10.0, 1..16),
                pick in any::<prop::sample::Index>(),
            ) {
                let dropped = *pick.get(&weights.keys().copied().collect::<Vec<_>>());
                let mut candidate = weights.clone();
                let _ = candidate.remove(&dropped);
                let reasons = check_sparse(&candidate, &weights, &Tolerances::default());
                prop_assert_eq!(reasons.len(), 1);
                prop_assert!(reasons[0].contains(&dropped.to_string()));
            }

            #[test]
            fn multi_vector_matches_itself(vectors in token_vectors()) {
                prop_assert!(check_multi_vector(&vectors, &vectors, &Tolerances::default()).is_empty());
            }

            #[test]
            fn multi_vector_length_mismatch_is_one_reason(
                vectors in token_vectors(),
                keep in any::<prop::sample::Index>(),
            ) {
                let keep = keep.index(vectors.len());
                let reasons = check_multi_vector(&vectors[..keep], &vectors, &Tolerances::default());
                prop_assert_eq!(reasons.len(), 1);
                prop_assert!(reasons[0].starts_with("multi-vector length"));
            }

            #[test]
            fn fixture_compared_with_itself_passes(
                dense in vec(0.1f32..10.0, 1..32),
                weights in btree_map(4i64..1000, 0.0f32..10.0, 0..16),
                vectors in token_vectors(),
            ) {
                let expected = Representations {
                    dense,
                    sparse: Some(weights),
                    multi_vector: Some(vectors),
                };
                let fixture = multi_fixture(expected.clone());
                prop_assert!(compare_record(&fixture, &expected, &Tolerances::default()).is_empty());
            }
        }
    }
}
