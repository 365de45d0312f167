//! Settings types.
//!
//! Every struct uses `#[serde(rename_all = "camelCase", default)]` so a
//! partial user file only needs the keys it overrides.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TesseraSettings {
    /// Tokenizer and model session settings.
    pub model: ModelSettings,
    /// Representation extraction settings.
    pub extraction: ExtractionSettings,
    /// Reference comparison tolerances.
    pub parity: ParitySettings,
    /// Similarity engine settings.
    pub similarity: SimilaritySettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl TesseraSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        if self.model.intra_threads == 0 {
            return Err(SettingsError::InvalidValue(
                "model.intraThreads must be at least 1".into(),
            ));
        }
        if !(self.similarity.scale.is_finite() && self.similarity.scale > 0.0) {
            return Err(SettingsError::InvalidValue(format!(
                "similarity.scale must be a positive number, got {}",
                self.similarity.scale
            )));
        }
        for (name, value) in [
            ("parity.denseMinSimilarity", self.parity.dense_min_similarity),
            (
                "parity.multiVectorMinSimilarity",
                self.parity.multi_vector_min_similarity,
            ),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(SettingsError::InvalidValue(format!(
                    "{name} must be within [-1, 1], got {value}"
                )));
            }
        }
        if !(self.parity.sparse_max_abs_diff.is_finite() && self.parity.sparse_max_abs_diff >= 0.0)
        {
            return Err(SettingsError::InvalidValue(format!(
                "parity.sparseMaxAbsDiff must be non-negative, got {}",
                self.parity.sparse_max_abs_diff
            )));
        }
        Ok(())
    }
}

/// Which representations the model emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Dense, sparse and multi-vector outputs (BGE-M3 style).
    #[default]
    MultiRepresentation,
    /// A single pooled, normalized dense output (E5 style).
    Dense,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultiRepresentation => f.write_str("multi-representation"),
            Self::Dense => f.write_str("dense"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "multi-representation" | "multi" | "m3" => Ok(Self::MultiRepresentation),
            "dense" => Ok(Self::Dense),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown model kind: {other}"
            ))),
        }
    }
}

/// Which tokenizer implementation feeds the model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenizerBackend {
    /// ONNX tokenizer graph run through ONNX Runtime.
    #[default]
    Onnx,
    /// `tokenizer.json` loaded with the `tokenizers` crate.
    HuggingFace,
}

impl fmt::Display for TokenizerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Onnx => f.write_str("onnx"),
            Self::HuggingFace => f.write_str("hugging-face"),
        }
    }
}

impl FromStr for TokenizerBackend {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "hugging-face" | "huggingface" | "hf" => Ok(Self::HuggingFace),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown tokenizer backend: {other}"
            ))),
        }
    }
}

/// Tokenizer and model session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Path to the tokenizer (ONNX graph or `tokenizer.json`). May contain `~`.
    pub tokenizer_path: String,
    /// Path to the ONNX embedding model. May contain `~`.
    pub model_path: String,
    /// Which representations the model emits.
    pub kind: ModelKind,
    /// Tokenizer implementation.
    pub tokenizer_backend: TokenizerBackend,
    /// onnxruntime-extensions shared library registered on the ONNX tokenizer
    /// session. Empty disables registration. May contain `~`.
    pub operator_library_path: String,
    /// Intra-op thread count for ONNX Runtime sessions.
    pub intra_threads: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            tokenizer_path: "~/.tessera/models/bge_m3_tokenizer.onnx".to_string(),
            model_path: "~/.tessera/models/bge_m3_model.onnx".to_string(),
            kind: ModelKind::MultiRepresentation,
            tokenizer_backend: TokenizerBackend::Onnx,
            operator_library_path: format!(
                "~/.tessera/models/{}ortextensions{}",
                std::env::consts::DLL_PREFIX,
                std::env::consts::DLL_SUFFIX
            ),
            intra_threads: 1,
        }
    }
}

/// Representation extraction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionSettings {
    /// Vocabulary ids excluded from sparse weights (pad, unknown, begin, separator).
    pub special_token_ids: Vec<i64>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            special_token_ids: vec![0, 1, 2, 3],
        }
    }
}

/// Reference comparison tolerances.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParitySettings {
    /// Dense cosine similarity must be strictly greater than this.
    pub dense_min_similarity: f64,
    /// Per-token cosine similarity must be strictly greater than this.
    pub multi_vector_min_similarity: f64,
    /// Per-key absolute sparse weight difference must be strictly below this.
    pub sparse_max_abs_diff: f64,
}

impl Default for ParitySettings {
    fn default() -> Self {
        Self {
            dense_min_similarity: 0.9999,
            multi_vector_min_similarity: 0.9999,
            sparse_max_abs_diff: 1e-6,
        }
    }
}

/// Similarity engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimilaritySettings {
    /// Multiplier applied to each cell of a similarity matrix.
    pub scale: f64,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self { scale: 100.0 }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    path.to_string()
}
