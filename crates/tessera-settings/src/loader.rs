//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TesseraSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{ModelKind, TesseraSettings, TokenizerBackend};

/// Resolve the path to the settings file (`~/.tessera/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tessera").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TesseraSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TesseraSettings> {
    let defaults = serde_json::to_value(TesseraSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TesseraSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut TesseraSettings) {
    if let Some(v) = read_env_string("TESSERA_TOKENIZER_PATH") {
        settings.model.tokenizer_path = v;
    }
    if let Some(v) = read_env_string("TESSERA_MODEL_PATH") {
        settings.model.model_path = v;
    }
    if let Some(v) = read_env_parsed::<ModelKind>("TESSERA_MODEL_KIND") {
        settings.model.kind = v;
    }
    if let Some(v) = read_env_parsed::<TokenizerBackend>("TESSERA_TOKENIZER_BACKEND") {
        settings.model.tokenizer_backend = v;
    }
    if let Some(v) = read_env_string("TESSERA_OPERATOR_LIBRARY") {
        settings.model.operator_library_path = v;
    }
    if let Some(v) = read_env_usize("TESSERA_INTRA_THREADS", 1, 256) {
        settings.model.intra_threads = v;
    }
    if let Some(v) = read_env_f64("TESSERA_SIMILARITY_SCALE") {
        settings.similarity.scale = v;
    }
    if let Some(v) = read_env_string("TESSERA_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite, strictly positive `f64`.
pub fn parse_positive_f64(val: &str) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (n.is_finite() && n > 0.0).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let val = read_env_string(name)?;
    let result = val.parse().ok();
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_env_f64(name: &str) -> Option<f64> {
    let val = std::env::var(name).ok()?;
    let result = parse_positive_f64(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid f64 env var, ignoring");
    }
    result
}
