// engram-providers/src/judge.rs
// ============================================================================
// Module: Judge Prompt & Verdict
// Description: The comparative judge's prompt template and response schema.
// Purpose: Turn a pair of attempts and their narrative diff into a
// versioned prompt, and turn the model's completion back into a typed
// verdict.
// Dependencies: engram-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The judge reasons in terms of `A`/`B`, not attempt ids: [`Winner`] is the
//! raw response shape, and the judge driver (in `engram-bbon`) resolves
//! `A`/`B` to the pair's concrete `left_attempt_id`/`right_attempt_id`
//! before persisting a `JudgeOutcome`. Only `promptVersion = "v1"` is
//! defined; any other version is an [`EngramError::InvalidInput`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use engram_core::EngramError;
use engram_core::extract_json;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Prompt Input
// ============================================================================

/// Everything the v1 judge prompt renders: the short ids of both attempts,
/// their status, their result payloads, and the narrative diff's
/// pros/cons and delta list.
#[derive(Debug, Clone)]
pub struct JudgePromptInput {
    /// Short id of the left attempt (`A`).
    pub left_id: String,
    /// Short id of the right attempt (`B`).
    pub right_id: String,
    /// Lifecycle status of the left attempt, e.g. `"completed"`.
    pub left_status: String,
    /// Lifecycle status of the right attempt, e.g. `"completed"`.
    pub right_status: String,
    /// The left attempt's final result payload, if any.
    pub left_result: Value,
    /// The right attempt's final result payload, if any.
    pub right_result: Value,
    /// Reasons the narrative diff counted in the left attempt's favor.
    pub pros: Vec<String>,
    /// Reasons the narrative diff counted against the left attempt.
    pub cons: Vec<String>,
    /// Step-by-step differences surfaced by the narrative diff.
    pub deltas: Vec<String>,
}

// ============================================================================
// SECTION: Prompt Builder
// ============================================================================

/// Builds the judge prompt for `version`.
///
/// # Errors
/// Returns [`EngramError::InvalidInput`] for any version other than `"v1"`.
pub fn build_prompt(version: &str, input: &JudgePromptInput) -> Result<String, EngramError> {
    match version {
        "v1" => Ok(build_prompt_v1(input)),
        other => Err(EngramError::InvalidInput(format!("unknown judge prompt version: {other}"))),
    }
}

/// Renders the `v1` judge prompt.
fn build_prompt_v1(input: &JudgePromptInput) -> String {
    let left_result = serde_json::to_string(&input.left_result).unwrap_or_else(|_| "null".to_owned());
    let right_result = serde_json::to_string(&input.right_result).unwrap_or_else(|_| "null".to_owned());
    let pros = bulleted(&input.pros);
    let cons = bulleted(&input.cons);
    let deltas = bulleted(&input.deltas);
    format!(
        "You are comparing two candidate solutions to the same task, labeled A and B.\n\n\
         Attempt A (id {left_a}, status {left_status}): {left_result}\n\
         Attempt B (id {right_b}, status {right_status}): {right_result}\n\n\
         Narrative diff pros (favoring A):\n{pros}\n\n\
         Narrative diff cons (against A):\n{cons}\n\n\
         Step-by-step deltas:\n{deltas}\n\n\
         Pick the stronger attempt. Respond with a single JSON object and \
         nothing else: {{\"winner\": \"A\" or \"B\", \"confidence\": a number \
         between 0 and 1, \"rationale\": a short explanation}}.",
        left_a = input.left_id,
        left_status = input.left_status,
        right_b = input.right_id,
        right_status = input.right_status,
    )
}

/// Renders a list as `"- item"` lines, or `"(none)"` when empty.
fn bulleted(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)".to_owned();
    }
    items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// The judge's raw preference, before resolution to a concrete attempt id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    /// The left attempt of the pair.
    A,
    /// The right attempt of the pair.
    B,
}

/// The judge's parsed response: `{winner, confidence, rationale}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Verdict {
    /// Which side of the pair the judge preferred.
    pub winner: Winner,
    /// The judge's confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Free-text rationale.
    pub rationale: String,
}

/// Extracts and validates a [`Verdict`] from a raw LLM completion.
///
/// # Errors
/// Returns [`EngramError::External`] when no JSON value can be extracted,
/// the JSON does not match the verdict schema, or `confidence` falls
/// outside `[0.0, 1.0]`.
pub fn parse_verdict(completion: &str) -> Result<Verdict, EngramError> {
    let value = extract_json(completion).map_err(|err| EngramError::External(err.to_string()))?;
    let verdict: Verdict = serde_json::from_value(value)
        .map_err(|err| EngramError::External(format!("judge response did not match the verdict schema: {err}")))?;
    if !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(EngramError::External("judge confidence must be within [0.0, 1.0]".to_owned()));
    }
    Ok(verdict)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use super::*;

    fn sample_input() -> JudgePromptInput {
        JudgePromptInput {
            left_id: "aaaaaaaa".to_owned(),
            right_id: "bbbbbbbb".to_owned(),
            left_status: "completed".to_owned(),
            right_status: "completed".to_owned(),
            left_result: Value::Null,
            right_result: Value::Null,
            pros: vec!["handles the edge case".to_owned()],
            cons: vec![],
            deltas: vec!["left adds a null check".to_owned()],
        }
    }

    #[test]
    fn build_prompt_rejects_unknown_versions() {
        let err = build_prompt("v2", &sample_input()).unwrap_err();
        assert!(matches!(err, EngramError::InvalidInput(_)));
    }

    #[test]
    fn build_prompt_v1_mentions_both_attempt_ids() {
        let prompt = build_prompt("v1", &sample_input()).unwrap();
        assert!(prompt.contains("aaaaaaaa"));
        assert!(prompt.contains("bbbbbbbb"));
        assert!(prompt.contains("(none)"));
    }

    #[test]
    fn parse_verdict_accepts_fenced_json() {
        let completion = "```json\n{\"winner\": \"A\", \"confidence\": 0.8, \"rationale\": \"clearer\"}\n```";
        let verdict = parse_verdict(completion).unwrap();
        assert_eq!(verdict.winner, Winner::A);
        assert!((verdict.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_verdict_rejects_out_of_range_confidence() {
        let completion = "{\"winner\": \"B\", \"confidence\": 1.5, \"rationale\": \"too sure\"}";
        let err = parse_verdict(completion).unwrap_err();
        assert!(matches!(err, EngramError::External(_)));
    }

    #[test]
    fn parse_verdict_rejects_unparseable_completion() {
        let err = parse_verdict("no json at all").unwrap_err();
        assert!(matches!(err, EngramError::External(_)));
    }
}
