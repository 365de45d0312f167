//! # tessera
//!
//! Command-line entry point: encode texts, generate reference fixtures and
//! compare a model against them.

#![deny(unsafe_code)]

mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tessera_embeddings::{RepresentationSource, instruct_query, similarity_matrix};
use tessera_parity::{
    ReferenceSet, Tolerances, compare, default_cases, generate_fixtures, load_cases,
};
use tessera_settings::{ModelKind, TesseraSettings, TokenizerBackend};
use tracing::info;

/// Dense, sparse and multi-vector embeddings over ONNX models.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.tessera/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level filter; `RUST_LOG` wins when set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(flatten)]
    model: ModelArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the model section of the settings.
#[derive(Args, Debug, Default)]
struct ModelArgs {
    /// Tokenizer file (ONNX graph or `tokenizer.json`).
    #[arg(long, global = true)]
    tokenizer: Option<PathBuf>,

    /// Embedding model file.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Model kind: `multi` or `dense`.
    #[arg(long, global = true)]
    kind: Option<ModelKind>,

    /// Tokenizer backend: `onnx` or `hf`.
    #[arg(long, global = true)]
    tokenizer_backend: Option<TokenizerBackend>,

    /// onnxruntime-extensions library for the ONNX tokenizer.
    #[arg(long, global = true)]
    operator_library: Option<PathBuf>,

    /// Intra-op threads per session.
    #[arg(long, global = true)]
    intra_threads: Option<usize>,
}

impl ModelArgs {
    fn apply(&self, settings: &mut TesseraSettings) {
        let model = &mut settings.model;
        if let Some(p) = &self.tokenizer {
            model.tokenizer_path = p.display().to_string();
        }
        if let Some(p) = &self.model {
            model.model_path = p.display().to_string();
        }
        if let Some(kind) = self.kind {
            model.kind = kind;
        }
        if let Some(backend) = self.tokenizer_backend {
            model.tokenizer_backend = backend;
        }
        if let Some(p) = &self.operator_library {
            model.operator_library_path = p.display().to_string();
        }
        if let Some(n) = self.intra_threads {
            model.intra_threads = n;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode texts and print their representations as JSON.
    Encode {
        /// Text to encode (repeatable).
        #[arg(long = "text", required = true)]
        texts: Vec<String>,

        /// Wrap every text as a query for this task.
        #[arg(long)]
        instruct: Option<String>,

        /// Document to score the texts against (repeatable).
        #[arg(long = "document")]
        documents: Vec<String>,
    },

    /// Encode a case list and write a fixture file.
    Generate {
        /// Output fixture file.
        #[arg(long)]
        out: PathBuf,

        /// JSON array of `{ "name", "text" }`; defaults to the built-in cases.
        #[arg(long)]
        cases: Option<PathBuf>,
    },

    /// Regenerate every fixture and check it against the stored values.
    Compare {
        /// Fixture file to check.
        #[arg(long)]
        fixtures: PathBuf,
    },
}

fn load_settings(cli: &Cli) -> Result<TesseraSettings> {
    let mut settings = match &cli.settings {
        Some(path) => tessera_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => tessera_settings::load_settings().context("Failed to load settings")?,
    };
    cli.model.apply(&mut settings);
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

/// Encode `texts` (optionally instructed) and `documents`, returning one
/// JSON document with representations and, when documents are given, the
/// scaled query × document scores.
fn encode_output<S: RepresentationSource + ?Sized>(
    source: &mut S,
    texts: &[String],
    instruct: Option<&str>,
    documents: &[String],
    scale: f64,
) -> Result<Value> {
    let inputs: Vec<String> = texts
        .iter()
        .map(|t| instruct.map_or_else(|| t.clone(), |task| instruct_query(task, t)))
        .collect();

    let mut encoded = Vec::with_capacity(inputs.len());
    for text in &inputs {
        let reps = source
            .encode(text)
            .with_context(|| format!("Failed to encode {text:?}"))?;
        encoded.push((text, reps));
    }

    let mut out = json!({
        "texts": encoded
            .iter()
            .map(|(text, reps)| json!({ "text": text, "representations": reps }))
            .collect::<Vec<_>>(),
    });

    if !documents.is_empty() {
        let mut doc_vecs = Vec::with_capacity(documents.len());
        for doc in documents {
            let reps = source
                .encode(doc)
                .with_context(|| format!("Failed to encode document {doc:?}"))?;
            doc_vecs.push(reps.dense);
        }
        let query_vecs: Vec<&[f32]> = encoded.iter().map(|(_, r)| r.dense.as_slice()).collect();
        let scores = similarity_matrix(&query_vecs, &doc_vecs, scale)?;
        out["scores"] = json!(scores);
    }
    Ok(out)
}

fn generate_to<S: RepresentationSource + ?Sized>(
    source: &mut S,
    kind: ModelKind,
    cases: Option<&Path>,
    out: &Path,
) -> Result<usize> {
    let cases = match cases {
        Some(path) => load_cases(path)?,
        None => default_cases(kind),
    };
    let set = generate_fixtures(source, &cases, kind)?;
    set.write_to(out)?;
    Ok(set.len())
}

/// Run the comparison and print each failure; `false` when anything diverged.
fn compare_against<S: RepresentationSource + ?Sized>(
    source: &mut S,
    fixtures: &Path,
    tol: &Tolerances,
) -> Result<bool> {
    let set = ReferenceSet::load(fixtures)?;
    let report = compare(source, &set, tol);
    for failure in &report.failures {
        println!("FAIL {}: {}", failure.fixture_id, failure.reason);
    }
    println!(
        "{} fixtures checked, {} failed",
        report.checked.len(),
        report.failed_fixtures().len()
    );
    Ok(report.passed())
}

fn run(cli: &Cli, settings: &TesseraSettings) -> Result<ExitCode> {
    let mut embedder =
        tessera_embeddings::open_embedder(settings).context("Failed to open embedding sessions")?;

    let code = match &cli.command {
        Command::Encode {
            texts,
            instruct,
            documents,
        } => {
            let out = encode_output(
                &mut embedder,
                texts,
                instruct.as_deref(),
                documents,
                settings.similarity.scale,
            )?;
            println!("{}", serde_json::to_string_pretty(&out)?);
            ExitCode::SUCCESS
        }
        Command::Generate { out, cases } => {
            let n = generate_to(&mut embedder, settings.model.kind, cases.as_deref(), out)?;
            info!(fixtures = n, path = %out.display(), "fixtures written");
            ExitCode::SUCCESS
        }
        Command::Compare { fixtures } => {
            let tol = Tolerances::from_settings(&settings.parity);
            if compare_against(&mut embedder, fixtures, &tol)? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    };

    embedder.close();
    Ok(code)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    logging::init_subscriber(&settings.logging.level);
    run(&cli, &settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_embeddings::mock::{MockModel, MockTokenizer};
    use tessera_embeddings::{Embedder, ExtractionConfig, WEB_SEARCH_TASK};

    fn mock() -> Embedder<MockTokenizer, MockModel> {
        Embedder::new(
            MockTokenizer::new(),
            MockModel::new(64, 2, 4),
            ExtractionConfig::default(),
        )
    }

    #[test]
    fn cli_encode_repeated_texts() {
        let cli = Cli::parse_from(["tessera", "encode", "--text", "a", "--text", "b"]);
        let Command::Encode { texts, instruct, .. } = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(texts, vec!["a", "b"]);
        assert!(instruct.is_none());
    }

    #[test]
    fn cli_encode_requires_text() {
        assert!(Cli::try_parse_from(["tessera", "encode"]).is_err());
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "tessera",
            "compare",
            "--fixtures",
            "refs.json",
            "--kind",
            "dense",
            "--tokenizer-backend",
            "hf",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.model.kind, Some(ModelKind::Dense));
        assert_eq!(cli.model.tokenizer_backend, Some(TokenizerBackend::HuggingFace));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn cli_rejects_unknown_kind() {
        let args = ["tessera", "--kind", "sparse", "compare", "--fixtures", "x"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn model_args_override_settings() {
        let mut settings = TesseraSettings::default();
        ModelArgs {
            tokenizer: Some(PathBuf::from("/m/tokenizer.json")),
            model: Some(PathBuf::from("/m/model.onnx")),
            kind: Some(ModelKind::Dense),
            tokenizer_backend: Some(TokenizerBackend::HuggingFace),
            operator_library: Some(PathBuf::from("/m/libortextensions.so")),
            intra_threads: Some(4),
        }
        .apply(&mut settings);
        assert_eq!(settings.model.tokenizer_path, "/m/tokenizer.json");
        assert_eq!(settings.model.model_path, "/m/model.onnx");
        assert_eq!(settings.model.kind, ModelKind::Dense);
        assert_eq!(settings.model.tokenizer_backend, TokenizerBackend::HuggingFace);
        assert_eq!(settings.model.operator_library_path, "/m/libortextensions.so");
        assert_eq!(settings.model.intra_threads, 4);
    }

    #[test]
    fn empty_model_args_leave_settings() {
        let mut settings = TesseraSettings::default();
        ModelArgs::default().apply(&mut settings);
        let defaults = TesseraSettings::default().model;
        assert_eq!(settings.model.tokenizer_path, defaults.tokenizer_path);
        assert_eq!(settings.model.model_path, defaults.model_path);
        assert_eq!(settings.model.kind, defaults.kind);
        assert_eq!(
            settings.model.operator_library_path,
            defaults.operator_library_path
        );
        assert_eq!(settings.model.intra_threads, defaults.intra_threads);
    }

    #[test]
    fn operator_library_flag_is_global() {
        let cli = Cli::parse_from([
            "tessera",
            "compare",
            "--fixtures",
            "refs.json",
            "--operator-library",
            "/opt/ort/libortextensions.so",
        ]);
        assert_eq!(
            cli.model.operator_library,
            Some(PathBuf::from("/opt/ort/libortextensions.so"))
        );
    }

    #[test]
    fn load_settings_from_flag_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "model": { "intraThreads": 2 } }"#).unwrap();
        let cli = Cli::parse_from([
            "tessera",
            "--settings",
            path.to_str().unwrap(),
            "--log-level",
            "info",
            "compare",
            "--fixtures",
            "refs.json",
        ]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.model.intra_threads, 2);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn load_settings_rejects_zero_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{}").unwrap();
        let cli = Cli::parse_from([
            "tessera",
            "--settings",
            path.to_str().unwrap(),
            "--intra-threads",
            "0",
            "compare",
            "--fixtures",
            "refs.json",
        ]);
        assert!(load_settings(&cli).is_err());
    }

    #[test]
    fn encode_output_with_scores() {
        let mut e = mock();
        let out = encode_output(
            &mut e,
            &["pumpkin recipe".to_string()],
            Some(WEB_SEARCH_TASK),
            &["pumpkin recipe at home".to_string(), "protein intake".to_string()],
            100.0,
        )
        .unwrap();
        let text = out["texts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Instruct: "));
        assert!(out["texts"][0]["representations"]["dense"].is_array());
        let scores = out["scores"].as_array().unwrap();
        assert_eq!(scores.len(), 1);
        let row = scores[0].as_array().unwrap();
        assert!(row[0].as_f64().unwrap() > row[1].as_f64().unwrap());
    }

    #[test]
    fn encode_output_without_documents_has_no_scores() {
        let mut e = mock();
        let out = encode_output(&mut e, &["x".to_string()], None, &[], 100.0).unwrap();
        assert_eq!(out["texts"][0]["text"], "x");
        assert!(out.get("scores").is_none());
    }

    #[test]
    fn generate_then_compare_passes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("refs.json");
        let mut e = mock();
        let n = generate_to(&mut e, ModelKind::MultiRepresentation, None, &out).unwrap();
        assert_eq!(n, 8);
        assert!(compare_against(&mut e, &out, &Tolerances::default()).unwrap());
    }

    #[test]
    fn compare_reports_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("refs.json");
        let mut reference = mock();
        let _ = generate_to(&mut reference, ModelKind::MultiRepresentation, None, &out).unwrap();

        let mut other = Embedder::new(
            MockTokenizer::new(),
            MockModel::new(64, 2, 3),
            ExtractionConfig::default(),
        );
        assert!(!compare_against(&mut other, &out, &Tolerances::default()).unwrap());
    }

    #[test]
    fn compare_missing_fixture_file_is_error() {
        let mut e = mock();
        let missing = Path::new("/nonexistent/refs.json");
        assert!(compare_against(&mut e, missing, &Tolerances::default()).is_err());
    }
}
