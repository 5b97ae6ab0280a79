// engram-cli/src/error.rs
// ============================================================================
// Module: CLI Error
// Description: The command-layer error wrapper, sitting at the CLI's
// human-facing boundary.
// Purpose: Carry a taxonomy tag and message for every failure the CLI's
// JSON envelope needs to report, whether it originated in `engram-core` or
// at the CLI's own config/IO boundary.
// Dependencies: thiserror, engram-core, engram-providers
// ============================================================================

//! ## Overview
//! Most command failures are already an [`EngramError`] surfaced by a
//! lower crate and are propagated unchanged via `#[from]`. [`CliError`]
//! adds the two failure classes that only exist at the CLI boundary:
//! configuration loading and LLM client construction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use engram_core::EngramError;
use engram_core::FieldError;
use engram_core::LlmError;
use thiserror::Error;

// ============================================================================
// SECTION: CliError
// ============================================================================

/// Command-layer error wrapper.
#[derive(Debug, Error)]
pub enum CliError {
    /// An error raised by `engram-core`, `engram-store`, `engram-learn`, or
    /// `engram-bbon`.
    #[error(transparent)]
    Engram(#[from] EngramError),
    /// Configuration discovery or parsing failed.
    #[error("configuration error: {0}")]
    Config(String),
    /// Constructing or invoking the LLM client failed.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
}

impl CliError {
    /// Returns the stable, machine-readable taxonomy tag for this error.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Engram(err) => err.tag(),
            Self::Config(_) => "ConfigError",
            Self::Llm(_) => "ExternalError",
        }
    }

    /// Returns the per-field violations carried by a validation failure, if
    /// this error is one.
    #[must_use]
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            Self::Engram(EngramError::Validation(fields)) => Some(fields),
            _ => None,
        }
    }
}

/// Command result alias used throughout the CLI.
#[allow(dead_code)]
pub type CliResult<T> = Result<T, CliError>;
