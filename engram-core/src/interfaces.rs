// engram-core/src/interfaces.rs
// ============================================================================
// Module: Engram Interfaces
// Description: Backend-agnostic interfaces for LLM access.
// Purpose: Define the contract surface the learning pipeline and the
// comparative judge use without embedding provider-specific details.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! `LlmClient` is the sole capability boundary the core exposes to the
//! outside world. Every call into a model provider, whether from the judge
//! or from a future learning-pipeline summarizer, goes through this trait
//! so that tests can substitute a deterministic stub without touching
//! network code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: LlmClient
// ============================================================================

/// A single request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Model identifier to invoke.
    pub model: String,
    /// Sampling temperature. The comparative judge always calls with `0.0`.
    pub temperature: f32,
}

/// LLM client errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider could not be reached or returned a transport failure.
    #[error("llm transport error: {0}")]
    Transport(String),
    /// The provider responded, but the response could not be parsed as the
    /// expected JSON shape.
    #[error("llm response parse error: {0}")]
    Parse(String),
}

/// Backend-agnostic LLM access.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends `request` and returns the provider's raw text completion.
    ///
    /// # Errors
    /// Returns [`LlmError::Transport`] when the provider cannot be reached.
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Extracts the first well-formed JSON value from an LLM completion,
/// preferring a fenced ```json code block and falling back to the first
/// balanced `{...}` span in the text.
///
/// # Errors
/// Returns [`LlmError::Parse`] if no JSON value can be extracted or parsed.
pub fn extract_json(completion: &str) -> Result<Value, LlmError> {
    if let Some(fenced) = extract_fenced_json(completion) {
        return serde_json::from_str(&fenced)
            .map_err(|err| LlmError::Parse(format!("fenced block was not valid JSON: {err}")));
    }
    let span = extract_brace_span(completion)
        .ok_or_else(|| LlmError::Parse("no JSON object found in completion".to_owned()))?;
    serde_json::from_str(&span).map_err(|err| LlmError::Parse(format!("brace span was not valid JSON: {err}")))
}

/// Finds the contents of the first ` ```json ... ``` ` fenced block, if any.
fn extract_fenced_json(text: &str) -> Option<String> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_owned())
}

/// Finds the first balanced `{...}` span in `text`, ignoring braces that
/// appear inside string literals.
fn extract_brace_span(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let open = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[open..=offset].to_owned());
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json_block() {
        let completion = "here you go:\n```json\n{\"winner\": \"A\"}\n```\nthanks";
        let value = extract_json(completion).unwrap();
        assert_eq!(value["winner"], "A");
    }

    #[test]
    fn extracts_bare_brace_span_when_unfenced() {
        let completion = "sure, {\"winner\": \"B\", \"confidence\": 0.9} is my answer";
        let value = extract_json(completion).unwrap();
        assert_eq!(value["winner"], "B");
    }

    #[test]
    fn ignores_braces_inside_string_values() {
        let completion = r#"{"winner": "A", "rationale": "uses a {set} literal"}"#;
        let value = extract_json(completion).unwrap();
        assert_eq!(value["winner"], "A");
    }

    #[test]
    fn fails_when_no_json_present() {
        assert!(extract_json("no json here at all").is_err());
    }
}
