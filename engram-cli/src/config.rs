// engram-cli/src/config.rs
// ============================================================================
// Module: Configuration Discovery
// Description: Loads `.engram/config.toml`, layered over compiled-in
// defaults, overridable by the `ENGRAM_CONFIG` environment variable.
// Purpose: Give every verb a single, fail-closed configuration source.
// Dependencies: toml, serde
// ============================================================================

//! ## Overview
//! A fixed per-project path, an environment variable override, and a
//! hard failure on a present-but-malformed file. A missing file is not
//! an error — compiled-in defaults apply — since only malformed content
//! must fail closed, not absence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::CliError;

/// Default configuration path, relative to the current working directory.
const DEFAULT_CONFIG_PATH: &str = ".engram/config.toml";
/// Environment variable that overrides the configuration path.
const CONFIG_ENV_VAR: &str = "ENGRAM_CONFIG";

// ============================================================================
// SECTION: EngramConfig
// ============================================================================

/// Top-level configuration recognized by the CLI (spec §6).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngramConfig {
    /// LLM transport and model selection.
    pub llm: LlmConfig,
    /// Optional retrieval backend configuration; not core, never read.
    pub retrieval: Option<toml::Value>,
}

/// The `[llm]` table (spec §6: `llm.provider`, `llm.judgeModel`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    /// Which LLM transport to invoke: `"stub"` or `"http"`.
    pub provider: String,
    /// Model identifier passed to the judge, when the caller omits one.
    pub judge_model: Option<String>,
    /// Chat-completions endpoint, used when `provider = "http"`.
    pub endpoint: Option<String>,
    /// Bearer token sent with HTTP requests, if any.
    pub api_key: Option<String>,
    /// Request timeout in milliseconds, used when `provider = "http"`.
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { provider: "stub".to_owned(), judge_model: None, endpoint: None, api_key: None, timeout_ms: 30_000 }
    }
}

impl EngramConfig {
    /// Loads configuration from `override_path`, the `ENGRAM_CONFIG`
    /// environment variable, or the default per-project path, in that
    /// order of precedence. A missing file resolves to compiled-in
    /// defaults; a present file that fails to parse is a hard error.
    ///
    /// # Errors
    /// Returns [`CliError::Config`] if the resolved file exists but is not
    /// valid TOML or does not match the expected schema.
    pub fn load(override_path: Option<&Path>) -> Result<Self, CliError> {
        let resolved = resolve_path(override_path);
        match fs::read_to_string(&resolved) {
            Ok(text) => toml::from_str(&text).map_err(|err| CliError::Config(format!("{} is not valid TOML: {err}", resolved.display()))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(CliError::Config(format!("failed to read {}: {err}", resolved.display()))),
        }
    }
}

/// Resolves the configuration path: explicit override, then
/// `ENGRAM_CONFIG`, then the compiled-in default.
fn resolve_path(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn load_defaults_when_no_file_is_present() {
        let dir = tempdir().unwrap();
        let config = EngramConfig::load(Some(&dir.path().join("missing.toml"))).unwrap();
        assert_eq!(config.llm.provider, "stub");
        assert_eq!(config.llm.timeout_ms, 30_000);
    }

    #[test]
    fn load_parses_recognized_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm]\nprovider = \"http\"\njudgeModel = \"gpt-test\"\n").unwrap();
        let config = EngramConfig::load(Some(&path)).unwrap();
        assert_eq!(config.llm.provider, "http");
        assert_eq!(config.llm.judge_model.as_deref(), Some("gpt-test"));
    }

    #[test]
    fn load_fails_closed_on_malformed_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not [ valid toml").unwrap();
        assert!(matches!(EngramConfig::load(Some(&path)).unwrap_err(), CliError::Config(_)));
    }
}
