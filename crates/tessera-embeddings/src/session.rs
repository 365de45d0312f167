//! Seams for the external collaborators.
//!
//! The tokenizer and the model are opaque operations described only by
//! their tensor contracts. Both require `&mut self`: a session is safe for
//! repeated sequential use, and the borrow checker rules out sharing one
//! across threads without a lock.

use crate::errors::Result;
use crate::types::{InputTensors, ModelOutputs, RaggedTokens, Representations};

/// Tokenizer inference: one string in, three parallel integer sequences out.
pub trait TokenizerSession {
    /// Tokenize a single text. Output order is not guaranteed.
    fn tokenize(&mut self, text: &str) -> Result<RaggedTokens>;
}

/// Model inference: `ids` and `attention_mask` in, raw output tensors out.
pub trait ModelSession {
    /// Run the model on one `[1, N]` input.
    fn run(&mut self, inputs: &InputTensors) -> Result<ModelOutputs>;
}

/// Anything that can turn text into [`Representations`].
pub trait RepresentationSource {
    /// Encode a single text.
    fn encode(&mut self, text: &str) -> Result<Representations>;
}

impl<T: TokenizerSession + ?Sized> TokenizerSession for Box<T> {
    fn tokenize(&mut self, text: &str) -> Result<RaggedTokens> {
        (**self).tokenize(text)
    }
}

impl<T: ModelSession + ?Sized> ModelSession for Box<T> {
    fn run(&mut self, inputs: &InputTensors) -> Result<ModelOutputs> {
        (**self).run(inputs)
    }
}

impl<T: RepresentationSource + ?Sized> RepresentationSource for Box<T> {
    fn encode(&mut self, text: &str) -> Result<Representations> {
        (**self).encode(text)
    }
}
