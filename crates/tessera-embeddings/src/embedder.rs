//! Text → representations, owning both inference sessions.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::errors::Result;
use crate::extract::{ExtractionConfig, extract};
use crate::session::{ModelSession, RepresentationSource, TokenizerSession};
use crate::tensors::build_inputs;
use crate::tokens::TokenizerAdapter;
use crate::types::Representations;

/// Runs tokenize → build inputs → model → extract for one text at a time.
///
/// The tokenizer and model sessions are owned exclusively and released
/// when the embedder is dropped, whether or not the last call succeeded.
pub struct Embedder<T: TokenizerSession, M: ModelSession> {
    tokenizer: TokenizerAdapter<T>,
    model: M,
    config: ExtractionConfig,
}

impl<T: TokenizerSession, M: ModelSession> Embedder<T, M> {
    /// Take ownership of both sessions.
    pub fn new(tokenizer: T, model: M, config: ExtractionConfig) -> Self {
        Self {
            tokenizer: TokenizerAdapter::new(tokenizer),
            model,
            config,
        }
    }

    /// Encode a single text.
    pub fn encode(&mut self, text: &str) -> Result<Representations> {
        let ids = self.tokenizer.tokenize(text)?;
        let inputs = build_inputs(&ids)?;
        let outputs = self.model.run(&inputs)?;
        let reps = extract(&inputs, &outputs, &self.config)?;
        debug!(
            seq_len = inputs.seq_len(),
            dense_dims = reps.dense.len(),
            sparse_terms = reps.sparse.as_ref().map(BTreeMap::len),
            token_vectors = reps.multi_vector.as_ref().map(Vec::len),
            "encoded text"
        );
        Ok(reps)
    }

    /// Encode texts sequentially; `out[i]` belongs to `texts[i]`.
    ///
    /// Stops at the first failure.
    pub fn encode_batch<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<Vec<Representations>> {
        texts.iter().map(|t| self.encode(t.as_ref())).collect()
    }

    /// Release both sessions now.
    pub fn close(self) {
        drop(self);
    }
}

impl<T: TokenizerSession, M: ModelSession> RepresentationSource for Embedder<T, M> {
    fn encode(&mut self, text: &str) -> Result<Representations> {
        Embedder::encode(self, text)
    }
}

impl<T: TokenizerSession, M: ModelSession> Drop for Embedder<T, M> {
    fn drop(&mut self) {
        info!("releasing tokenizer and model sessions");
    }
}
