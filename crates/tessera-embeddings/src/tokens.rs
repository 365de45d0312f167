//! Tokenizer output ordering.
//!
//! The tokenizer graph returns `(tokens, instance_indices, token_indices)`
//! in an order unrelated to the sequence. Model inputs must be built from
//! the tokens sorted by `token_indices`. Entries sharing a position keep
//! their input order (stable sort).

use tracing::{debug, warn};

use crate::errors::{EmbeddingError, Result};
use crate::session::TokenizerSession;
use crate::types::{RaggedTokens, TokenRecord};

/// Pair each token with its position, rejecting ragged output.
pub fn token_records(raw: &RaggedTokens) -> Result<Vec<TokenRecord>> {
    let n = raw.tokens.len();
    if raw.token_indices.len() != n || raw.instance_indices.len() != n {
        return Err(EmbeddingError::MalformedTokenizerOutput(format!(
            "{} tokens, {} instance indices, {} token indices",
            n,
            raw.instance_indices.len(),
            raw.token_indices.len()
        )));
    }
    Ok(raw
        .tokens
        .iter()
        .zip(&raw.token_indices)
        .map(|(&token_id, &position)| TokenRecord { token_id, position })
        .collect())
}

/// Sort records by position and return the token ids in sequence order.
pub fn order_tokens(raw: &RaggedTokens) -> Result<Vec<i64>> {
    let mut records = token_records(raw)?;
    records.sort_by_key(|r| r.position);

    if !is_contiguous(&records) {
        warn!(
            len = records.len(),
            "token positions are not contiguous from 0; keeping stable order"
        );
    }

    Ok(records.into_iter().map(|r| r.token_id).collect())
}

/// Whether sorted positions are exactly `0..len`.
fn is_contiguous(sorted: &[TokenRecord]) -> bool {
    sorted
        .iter()
        .enumerate()
        .all(|(i, r)| usize::try_from(r.position).is_ok_and(|p| p == i))
}

/// Wraps a [`TokenizerSession`] and emits ordered token ids.
pub struct TokenizerAdapter<T> {
    session: T,
}

impl<T: TokenizerSession> TokenizerAdapter<T> {
    /// Wrap a tokenizer session.
    pub fn new(session: T) -> Self {
        Self { session }
    }

    /// Tokenize `text` and return ids in sequence order.
    pub fn tokenize(&mut self, text: &str) -> Result<Vec<i64>> {
        let raw = self.session.tokenize(text)?;
        let ids = order_tokens(&raw)?;
        debug!(tokens = ids.len(), "tokenized");
        Ok(ids)
    }
}
