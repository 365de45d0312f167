//! Deterministic in-process sessions for tests and dry runs.
//!
//! [`MockTokenizer`] splits on whitespace and interns words into a growing
//! vocabulary, then returns its output with positions interleaved (evens,
//! then odds) so callers must reorder. [`MockModel`] produces a bag-of-words
//! dense vector plus SHA-256 derived sparse scores and token vectors.

use std::collections::HashMap;

use ndarray::{ArrayD, IxDyn};
use sha2::{Digest, Sha256};

use crate::errors::{EmbeddingError, Result};
use crate::normalize::l2_normalize;
use crate::session::{ModelSession, TokenizerSession};
use crate::types::{InputTensors, ModelOutputs, RaggedTokens};

/// Sequence-begin id emitted by [`MockTokenizer`].
pub const MOCK_BOS: i64 = 0;
/// Sequence-separator id emitted by [`MockTokenizer`].
pub const MOCK_EOS: i64 = 2;
/// First id assigned to a word.
pub const MOCK_FIRST_WORD_ID: i64 = 4;

/// Whitespace tokenizer with an interned vocabulary.
#[derive(Debug, Default)]
pub struct MockTokenizer {
    vocab: HashMap<String, i64>,
}

impl MockTokenizer {
    /// Create an empty tokenizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id assigned to `word`, if it has been seen.
    pub fn id_of(&self, word: &str) -> Option<i64> {
        self.vocab.get(&normalize_word(word)).copied()
    }

    fn intern(&mut self, word: String) -> i64 {
        #[allow(clippy::cast_possible_wrap)]
        let next = MOCK_FIRST_WORD_ID + self.vocab.len() as i64;
        *self.vocab.entry(word).or_insert(next)
    }
}

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

impl TokenizerSession for MockTokenizer {
    fn tokenize(&mut self, text: &str) -> Result<RaggedTokens> {
        let mut ids = vec![MOCK_BOS];
        for word in text.split_whitespace() {
            let word = normalize_word(word);
            if !word.is_empty() {
                ids.push(self.intern(word));
            }
        }
        ids.push(MOCK_EOS);

        let ordered = RaggedTokens::from_ordered(ids);
        let (mut tokens, mut token_indices) = (Vec::new(), Vec::new());
        for parity in [0, 1] {
            for (i, (&t, &p)) in ordered
                .tokens
                .iter()
                .zip(&ordered.token_indices)
                .enumerate()
            {
                if i % 2 == parity {
                    tokens.push(t);
                    token_indices.push(p);
                }
            }
        }
        Ok(RaggedTokens {
            instance_indices: ordered.instance_indices,
            tokens,
            token_indices,
        })
    }
}

/// Deterministic stand-in for an embedding model.
#[derive(Clone, Debug)]
pub struct MockModel {
    dense_dims: usize,
    sparse_hidden: usize,
    token_dims: usize,
    dense_only: bool,
}

impl MockModel {
    /// Multi-representation model with the given dimensions.
    ///
    /// Every dimension must be non-zero; [`ModelSession::run`] rejects a
    /// model built otherwise with [`EmbeddingError::ShapeMismatch`].
    pub fn new(dense_dims: usize, sparse_hidden: usize, token_dims: usize) -> Self {
        Self {
            dense_dims,
            sparse_hidden,
            token_dims,
            dense_only: false,
        }
    }

    /// Model that emits only the pooled dense output.
    pub fn dense_only(dense_dims: usize) -> Self {
        Self {
            dense_only: true,
            ..Self::new(dense_dims, 1, 1)
        }
    }

    fn dense(&self, ids: &[i64], mask: &[i64]) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dense_dims];
        for (&id, _) in ids.iter().zip(mask).filter(|(_, m)| **m == 1) {
            if id >= MOCK_FIRST_WORD_ID {
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let slot = (id as usize) % self.dense_dims;
                v[slot] += 1.0;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

/// Bytes derived from `(id, position)`, extended as needed.
fn hashed_bytes(id: i64, position: usize, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut round = 0u64;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(id.to_le_bytes());
        hasher.update(position.to_le_bytes());
        hasher.update(round.to_le_bytes());
        out.extend_from_slice(&hasher.finalize());
        round += 1;
    }
    out.truncate(len);
    out
}

fn to_tensor(shape: &[usize], data: Vec<f32>) -> Result<ArrayD<f32>> {
    ArrayD::from_shape_vec(IxDyn(shape), data)
        .map_err(|e| EmbeddingError::Inference(format!("mock tensor: {e}")))
}

impl ModelSession for MockModel {
    fn run(&mut self, inputs: &InputTensors) -> Result<ModelOutputs> {
        let ids = inputs.ids.row(0).to_vec();
        let mask = inputs.attention_mask.row(0).to_vec();
        let n = ids.len();

        let zero_dim = self.dense_dims == 0
            || (!self.dense_only && (self.sparse_hidden == 0 || self.token_dims == 0));
        if zero_dim {
            return Err(EmbeddingError::ShapeMismatch(format!(
                "mock model dimensions must be non-zero (dense {}, sparse {}, token {})",
                self.dense_dims, self.sparse_hidden, self.token_dims
            )));
        }

        let dense = to_tensor(&[1, self.dense_dims], self.dense(&ids, &mask))?;
        if self.dense_only {
            return Ok(ModelOutputs {
                dense,
                sparse: None,
                multi_vector: None,
            });
        }

        let mut sparse = Vec::with_capacity(n * self.sparse_hidden);
        let mut tokens = Vec::with_capacity(n * self.token_dims);
        for (i, &id) in ids.iter().enumerate() {
            // Scores in [-0.25, 0.75): some positions carry no lexical weight.
            sparse.extend(
                hashed_bytes(id, i, self.sparse_hidden)
                    .into_iter()
                    .map(|b| f32::from(b) / 256.0 - 0.25),
            );
            let mut v: Vec<f32> = hashed_bytes(id, i + n, self.token_dims)
                .into_iter()
                .map(|b| f32::from(b) / 127.5 - 1.0)
                .collect();
            l2_normalize(&mut v);
            tokens.extend(v);
        }

        Ok(ModelOutputs {
            dense,
            sparse: Some(to_tensor(&[1, n, self.sparse_hidden], sparse)?),
            multi_vector: Some(to_tensor(&[1, n, self.token_dims], tokens)?),
        })
    }
}
