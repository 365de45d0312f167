//! ONNX Runtime sessions (feature-gated behind `ort`).
//!
//! - [`OrtTokenizerSession`]: ONNX tokenizer graph, one string in, `(tokens,
//!   instance_indices, token_indices)` out.
//! - [`HfTokenizerSession`]: `tokenizer.json` through the `tokenizers` crate,
//!   the independent implementation used for cross-checking.
//! - [`OrtModelSession`]: embedding model, `input_ids` + `attention_mask` in,
//!   dense / sparse / multi-vector tensors out.
//!
//! ONNX tensor shapes use `i64` dimensions while Rust indexing needs `usize`.
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]

use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use tessera_settings::{ModelKind, TesseraSettings, TokenizerBackend, expand_home};
use tracing::{debug, info};

use crate::embedder::Embedder;
use crate::errors::{EmbeddingError, Result, ResultExt, require_file};
use crate::extract::ExtractionConfig;
use crate::session::{ModelSession, TokenizerSession};
use crate::tensors::to_onnx_parts;
use crate::types::{InputTensors, ModelOutputs, RaggedTokens};

/// Embedder backed by ONNX Runtime, with either tokenizer backend.
pub type OrtEmbedder = Embedder<Box<dyn TokenizerSession>, OrtModelSession>;

fn build_session(
    path: &Path,
    operator_library: Option<&Path>,
    intra_threads: usize,
) -> Result<Session> {
    let mut builder = Session::builder()
        .model_init("session builder")?
        .with_intra_threads(intra_threads)
        .model_init("thread config")?
        .with_log_level(ort::logging::LogLevel::Warning)
        .model_init("log level")?;
    if let Some(lib) = operator_library {
        builder = builder
            .with_operator_library(lib)
            .model_init(&format!("register operators {}", lib.display()))?;
    }
    builder
        .commit_from_file(path)
        .model_init(&format!("load {}", path.display()))
}

/// ONNX tokenizer graph session.
pub struct OrtTokenizerSession {
    session: Session,
}

impl OrtTokenizerSession {
    /// Load the tokenizer graph from `path`.
    ///
    /// The graph uses onnxruntime-extensions custom operators, so
    /// `operator_library` normally points at that shared library. `None`
    /// opens a plain session for graphs built from standard operators.
    pub fn open(path: &Path, operator_library: Option<&Path>, intra_threads: usize) -> Result<Self> {
        let path = require_file(path)?;
        let operator_library = operator_library.map(require_file).transpose()?;
        let session = build_session(&path, operator_library.as_deref(), intra_threads)?;
        info!(
            tokenizer = %path.display(),
            operators = ?operator_library,
            "loaded ONNX tokenizer"
        );
        Ok(Self { session })
    }
}

/// Extract an integer output as `i64`, accepting int64 or int32 graphs.
fn extract_ints(value: &DynValue, name: &str) -> Result<Vec<i64>> {
    if let Ok((_, data)) = value.try_extract_tensor::<i64>() {
        return Ok(data.to_vec());
    }
    let (_, data) = value
        .try_extract_tensor::<i32>()
        .inference(&format!("extract {name}"))?;
    Ok(data.iter().map(|&v| i64::from(v)).collect())
}

impl TokenizerSession for OrtTokenizerSession {
    fn tokenize(&mut self, text: &str) -> Result<RaggedTokens> {
        let input = Tensor::<String>::from_string_array((vec![1i64], &[text.to_string()][..]))
            .inference("tokenizer input tensor")?;
        let outputs = self
            .session
            .run(ort::inputs!["inputs" => input])
            .inference("tokenizer run")?;
        if outputs.len() < 3 {
            return Err(EmbeddingError::MalformedTokenizerOutput(format!(
                "expected 3 outputs, got {}",
                outputs.len()
            )));
        }
        Ok(RaggedTokens {
            tokens: extract_ints(&outputs[0], "tokens")?,
            instance_indices: extract_ints(&outputs[1], "instance_indices")?,
            token_indices: extract_ints(&outputs[2], "token_indices")?,
        })
    }
}

/// `tokenizers`-crate session over a `tokenizer.json`.
pub struct HfTokenizerSession {
    tokenizer: tokenizers::Tokenizer,
}

impl HfTokenizerSession {
    /// Load `tokenizer.json` from `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let path = require_file(path)?;
        let tokenizer = tokenizers::Tokenizer::from_file(&path).model_init("tokenizer load")?;
        info!(tokenizer = %path.display(), "loaded tokenizer.json");
        Ok(Self { tokenizer })
    }
}

impl TokenizerSession for HfTokenizerSession {
    fn tokenize(&mut self, text: &str) -> Result<RaggedTokens> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .inference("tokenize")?;
        Ok(RaggedTokens::from_ordered(
            encoding.get_ids().iter().map(|&id| i64::from(id)),
        ))
    }
}

/// Embedding model session.
pub struct OrtModelSession {
    session: Session,
    kind: ModelKind,
}

impl OrtModelSession {
    /// Load the model graph from `path`.
    pub fn open(path: &Path, kind: ModelKind, intra_threads: usize) -> Result<Self> {
        let path = require_file(path)?;
        let session = build_session(&path, None, intra_threads)?;
        info!(model = %path.display(), %kind, "loaded ONNX model");
        Ok(Self { session, kind })
    }
}

/// Copy an `f32` output into an owned dynamic-rank array.
fn extract_f32(value: &DynValue, name: &str) -> Result<ArrayD<f32>> {
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .inference(&format!("extract {name}"))?;
    let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
        .map_err(|e| EmbeddingError::ShapeMismatch(format!("{name} {shape:?}: {e}")))
}

impl ModelSession for OrtModelSession {
    fn run(&mut self, inputs: &InputTensors) -> Result<ModelOutputs> {
        let ids = Tensor::from_array(to_onnx_parts(&inputs.ids)).inference("input_ids tensor")?;
        let mask = Tensor::from_array(to_onnx_parts(&inputs.attention_mask))
            .inference("attention_mask tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
            ])
            .inference("model run")?;

        let expected = match self.kind {
            ModelKind::Dense => 1,
            ModelKind::MultiRepresentation => 3,
        };
        if outputs.len() < expected {
            return Err(EmbeddingError::ShapeMismatch(format!(
                "{} model must emit {expected} outputs, got {}",
                self.kind,
                outputs.len()
            )));
        }

        let dense = extract_f32(&outputs[0], "dense")?;
        let (sparse, multi_vector) = match self.kind {
            ModelKind::Dense => (None, None),
            ModelKind::MultiRepresentation => (
                Some(extract_f32(&outputs[1], "sparse")?),
                Some(extract_f32(&outputs[2], "multi_vector")?),
            ),
        };
        debug!(seq_len = inputs.seq_len(), "model run complete");

        Ok(ModelOutputs {
            dense,
            sparse,
            multi_vector,
        })
    }
}

/// Open both sessions described by `settings`.
///
/// Every path is checked before any session is created, so a missing file
/// fails fast with [`EmbeddingError::MissingResource`].
pub fn open_embedder(settings: &TesseraSettings) -> Result<OrtEmbedder> {
    let model = &settings.model;
    let tokenizer_path = require_file(expand_home(&model.tokenizer_path))?;
    let model_path = require_file(expand_home(&model.model_path))?;
    let operator_library = match model.tokenizer_backend {
        TokenizerBackend::Onnx if !model.operator_library_path.is_empty() => {
            Some(require_file(expand_home(&model.operator_library_path))?)
        }
        _ => None,
    };

    let tokenizer: Box<dyn TokenizerSession> = match model.tokenizer_backend {
        TokenizerBackend::Onnx => Box::new(OrtTokenizerSession::open(
            &tokenizer_path,
            operator_library.as_deref(),
            model.intra_threads,
        )?),
        TokenizerBackend::HuggingFace => Box::new(HfTokenizerSession::open(&tokenizer_path)?),
    };
    let session = OrtModelSession::open(&model_path, model.kind, model.intra_threads)?;

    Ok(Embedder::new(
        tokenizer,
        session,
        ExtractionConfig::from_settings(&settings.extraction),
    ))
}
