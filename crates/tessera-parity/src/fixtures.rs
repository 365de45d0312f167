//! Reference fixture files.
//!
//! A fixture file is a JSON object keyed by fixture identifier. Two record
//! layouts exist:
//!
//! - dense-only: `{ "text": ..., "embedding": [...] }`, keyed by case name
//! - multi-representation: `{ "dense_vecs": [...], "lexical_weights":
//!   { "<id>": w, ... }, "colbert_vecs": [[...], ...] }`, keyed by the text
//!
//! Records are converted into typed [`ReferenceFixture`]s on load so a
//! malformed file fails before any comparison starts.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_embeddings::{
    RepresentationSource, Representations, SparseWeights, WEB_SEARCH_TASK, instruct_query,
};
use tessera_settings::ModelKind;
use tracing::{debug, info};

use crate::errors::{ParityError, Result};

/// On-disk dense-only record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenseRecord {
    /// Input text.
    pub text: String,
    /// Pooled embedding.
    pub embedding: Vec<f32>,
}

/// On-disk multi-representation record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiRecord {
    /// Pooled embedding.
    pub dense_vecs: Vec<f32>,
    /// Lexical weights keyed by decimal token id.
    pub lexical_weights: BTreeMap<String, f32>,
    /// One vector per attended position.
    pub colbert_vecs: Vec<Vec<f32>>,
}

/// Either record layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceRecord {
    /// Multi-representation layout.
    Multi(MultiRecord),
    /// Dense-only layout.
    Dense(DenseRecord),
}

/// A typed reference: the text to encode and what it must encode to.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceFixture {
    /// Identifier (case name or, for multi-representation files, the text).
    pub id: String,
    /// Text to encode.
    pub text: String,
    /// Record layout this fixture came from.
    pub kind: ModelKind,
    /// Expected representations.
    pub expected: Representations,
}

impl ReferenceFixture {
    fn from_record(id: String, record: ReferenceRecord) -> Result<Self> {
        match record {
            ReferenceRecord::Dense(r) => Ok(Self {
                id,
                text: r.text,
                kind: ModelKind::Dense,
                expected: Representations {
                    dense: r.embedding,
                    sparse: None,
                    multi_vector: None,
                },
            }),
            ReferenceRecord::Multi(r) => {
                let sparse = parse_lexical_weights(&id, r.lexical_weights)?;
                Ok(Self {
                    text: id.clone(),
                    id,
                    kind: ModelKind::MultiRepresentation,
                    expected: Representations {
                        dense: r.dense_vecs,
                        sparse: Some(sparse),
                        multi_vector: Some(r.colbert_vecs),
                    },
                })
            }
        }
    }

    fn to_record(&self) -> ReferenceRecord {
        match self.kind {
            ModelKind::Dense => ReferenceRecord::Dense(DenseRecord {
                text: self.text.clone(),
                embedding: self.expected.dense.clone(),
            }),
            ModelKind::MultiRepresentation => ReferenceRecord::Multi(MultiRecord {
                dense_vecs: self.expected.dense.clone(),
                lexical_weights: self
                    .expected
                    .sparse
                    .iter()
                    .flatten()
                    .map(|(id, w)| (id.to_string(), *w))
                    .collect(),
                colbert_vecs: self.expected.multi_vector.clone().unwrap_or_default(),
            }),
        }
    }
}

/// Keys must be canonical decimal integers, the exact form `i64::to_string`
/// writes. Anything else, or a second key for the same id, rejects the fixture.
fn parse_lexical_weights(id: &str, raw: BTreeMap<String, f32>) -> Result<SparseWeights> {
    let invalid = |reason: String| ParityError::InvalidFixture {
        id: id.to_string(),
        reason,
    };
    let mut weights = SparseWeights::new();
    for (key, w) in raw {
        let token_id = key
            .parse::<i64>()
            .map_err(|e| invalid(format!("lexical weight key {key:?}: {e}")))?;
        if token_id.to_string() != key {
            return Err(invalid(format!(
                "lexical weight key {key:?} is not in canonical form {token_id}"
            )));
        }
        if weights.insert(token_id, w).is_some() {
            return Err(invalid(format!("duplicate lexical weight for token {token_id}")));
        }
    }
    Ok(weights)
}

/// A loaded fixture file, ordered by identifier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceSet {
    fixtures: Vec<ReferenceFixture>,
}

impl ReferenceSet {
    /// Build a set from fixtures; identifiers are sorted, later duplicates win.
    pub fn new(fixtures: impl IntoIterator<Item = ReferenceFixture>) -> Self {
        let by_id: BTreeMap<String, ReferenceFixture> =
            fixtures.into_iter().map(|f| (f.id.clone(), f)).collect();
        Self {
            fixtures: by_id.into_values().collect(),
        }
    }

    /// Parse a fixture document.
    pub fn from_json(json: &str, path: &Path) -> Result<Self> {
        let records: BTreeMap<String, ReferenceRecord> =
            serde_json::from_str(json).map_err(|source| ParityError::Fixture {
                path: path.to_path_buf(),
                source,
            })?;
        let fixtures = records
            .into_iter()
            .map(|(id, record)| ReferenceFixture::from_record(id, record))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fixtures })
    }

    /// Load and validate a fixture file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ParityError::MissingResource {
                path: path.to_path_buf(),
            });
        }
        let json = std::fs::read_to_string(path)?;
        let set = Self::from_json(&json, path)?;
        info!(path = %path.display(), fixtures = set.len(), "loaded reference fixtures");
        Ok(set)
    }

    /// Serialize in the on-disk layout, pretty-printed.
    pub fn to_json(&self) -> Result<String> {
        let records: BTreeMap<&str, ReferenceRecord> = self
            .fixtures
            .iter()
            .map(|f| (f.id.as_str(), f.to_record()))
            .collect();
        serde_json::to_string_pretty(&records).map_err(ParityError::Serialize)
    }

    /// Write the set to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), fixtures = self.len(), "wrote reference fixtures");
        Ok(())
    }

    /// Fixtures in identifier order.
    pub fn fixtures(&self) -> &[ReferenceFixture] {
        &self.fixtures
    }

    /// Look up a fixture by identifier.
    pub fn get(&self, id: &str) -> Option<&ReferenceFixture> {
        self.fixtures
            .binary_search_by(|f| f.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.fixtures[i])
    }

    /// Number of fixtures.
    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    /// Whether the set holds no fixtures.
    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

/// A named input text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureCase {
    /// Case name; dense-only fixtures are keyed by it.
    pub name: String,
    /// Text to encode.
    pub text: String,
}

impl FixtureCase {
    /// Create a case.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Encode every case and collect the results as fixtures.
///
/// Multi-representation fixtures are keyed by their text, so cases with
/// identical texts collapse into one entry.
pub fn generate_fixtures<S: RepresentationSource + ?Sized>(
    source: &mut S,
    cases: &[FixtureCase],
    kind: ModelKind,
) -> Result<ReferenceSet> {
    let mut fixtures = Vec::with_capacity(cases.len());
    for case in cases {
        let id = match kind {
            ModelKind::Dense => case.name.clone(),
            ModelKind::MultiRepresentation => case.text.clone(),
        };
        let expected = source
            .encode(&case.text)
            .map_err(|e| ParityError::Embedding {
                fixture_id: id.clone(),
                source: e,
            })?;
        debug!(fixture = %id, dims = expected.dense.len(), "generated fixture");
        fixtures.push(ReferenceFixture {
            id,
            text: case.text.clone(),
            kind,
            expected,
        });
    }
    Ok(ReferenceSet::new(fixtures))
}

/// Cases for instruction-tuned dense models: instructed queries, plain
/// documents and assorted texts.
pub fn default_dense_cases() -> Vec<FixtureCase> {
    vec![
        FixtureCase::new(
            "instruct_protein_query",
            instruct_query(WEB_SEARCH_TASK, "how much protein should a female eat"),
        ),
        FixtureCase::new(
            "instruct_pumpkin_query",
            instruct_query(WEB_SEARCH_TASK, "南瓜的家常做法"),
        ),
        FixtureCase::new(
            "protein_document",
            "As a general guideline, the CDC's average requirement of protein for women ages 19 \
             to 70 is 46 grams per day. But, as you can see from this chart, you'll need to \
             increase that if you're expecting or training for a marathon. Check out the chart \
             below to see how much protein you should be eating each day.",
        ),
        FixtureCase::new(
            "pumpkin_document",
            "1.清炒南瓜丝 原料:嫩南瓜半个 调料:葱、盐、白糖、鸡精 做法: 1、南瓜用刀薄薄的削去表面一层皮,\
             用勺子刮去瓤 2、擦成细丝(没有擦菜板就用刀慢慢切成细丝) 3、锅烧热放油,入葱花煸出香味 \
             4、入南瓜丝快速翻炒一分钟左右,放盐、一点白糖和鸡精调味出锅 2.香葱炒南瓜 原料:南瓜1只 \
             调料:香葱、蒜末、橄榄油、盐 做法: 1、将南瓜去皮,切成片 2、油锅8成热后,将蒜末放入爆香 \
             3、爆香后,将南瓜片放入,翻炒 4、在翻炒的同时,可以不时地往锅里加水,但不要太多 5、放入盐,\
             炒匀 6、南瓜差不多软和绵了之后,就可以关火 7、撒入香葱,即可出锅",
        ),
        FixtureCase::new("simple_text", "This is a simple test text."),
        FixtureCase::new("empty_text", ""),
        FixtureCase::new(
            "multilingual_text",
            "English, Español, Русский, 中文, العربية, हिन्दी",
        ),
        FixtureCase::new(
            "long_text",
            "This is a longer text that should generate a meaningful embedding vector. The \
             embedding model should capture the semantic meaning of this text and provide \
             high-quality representations for various downstream tasks.",
        ),
        FixtureCase::new(
            "technical_text",
            "ONNX Runtime is a performance-focused engine for ONNX models, enabling \
             cross-platform inference with identical results.",
        ),
        FixtureCase::new(
            "classification_query",
            instruct_query("Classify the sentiment of this text", "I love this product!"),
        ),
        FixtureCase::new(
            "summarization_query",
            instruct_query(
                "Summarize the following passage",
                "The quick brown fox jumps over the lazy dog. This sentence contains every \
                 letter of the alphabet.",
            ),
        ),
    ]
}

/// Cases for multi-representation models; identifiers are the texts.
pub fn default_multi_cases() -> Vec<FixtureCase> {
    [
        ("simple", "This is a simple test text."),
        ("greeting", "Hello world!"),
        (
            "multilingual_phrase",
            "A test text! Texto de prueba! Текст для теста! 測試文字! Testtext! Testez le texte! \
             Сынақ мәтіні! Тестни текст! परीक्षण पाठ! Kiểm tra văn bản!",
        ),
        ("empty", ""),
        (
            "long",
            "This is a longer text that should generate a meaningful embedding vector. The \
             embedding model should capture the semantic meaning of this text.",
        ),
        (
            "technical",
            "ONNX Runtime is a performance-focused engine for ONNX models.",
        ),
        ("symbols", "Text with numbers: 12345 and symbols: !@#$%^&*()"),
        ("languages", "English, Español, Русский, 中文, العربية, हिन्दी"),
    ]
    .into_iter()
    .map(|(name, text)| FixtureCase::new(name, text))
    .collect()
}

/// Read a case list: a JSON array of `{ "name", "text" }`.
pub fn load_cases(path: &Path) -> Result<Vec<FixtureCase>> {
    if !path.exists() {
        return Err(ParityError::MissingResource {
            path: path.to_path_buf(),
        });
    }
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|source| ParityError::Fixture {
        path: path.to_path_buf(),
        source,
    })
}

/// Default cases for a model kind.
pub fn default_cases(kind: ModelKind) -> Vec<FixtureCase> {
    match kind {
        ModelKind::Dense => default_dense_cases(),
        ModelKind::MultiRepresentation => default_multi_cases(),
    }
}
