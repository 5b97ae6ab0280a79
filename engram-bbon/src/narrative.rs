// engram-bbon/src/narrative.rs
// ============================================================================
// Module: Narrative Diff
// Description: Pure, deterministic comparison of two attempts' step
// timelines.
// Purpose: Produce the structured input the comparative judge reasons
// over, and a human-readable summary for display.
// Dependencies: engram-core
// ============================================================================

//! ## Overview
//! [`diff`] never touches the store: it takes two already-loaded attempts
//! and their already-loaded, index-ordered steps, and returns the same
//! [`NarrativeDiff`] for the same inputs every time. A fact each pro/con
//! observation records favors exactly one side, so the side's score is
//! simply the count of facts favoring it minus the count favoring the
//! other — "pros minus cons".

// ============================================================================
// SECTION: Imports
// ============================================================================

use engram_core::Attempt;
use engram_core::AttemptStep;
use engram_core::AttemptStepKind;

/// One position-indexed pairing of the two attempts' steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedStep {
    /// Position within the longer of the two timelines.
    pub index: usize,
    /// The left attempt's step at this position, if it has one.
    pub left: Option<AttemptStep>,
    /// The right attempt's step at this position, if it has one.
    pub right: Option<AttemptStep>,
    /// Set when the kinds differ, the outputs/observations differ, or one
    /// side is absent.
    pub delta: Option<String>,
}

/// The structural comparison the judge is shown (§4.N).
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeDiff {
    /// Position-indexed step pairings.
    pub aligned_steps: Vec<AlignedStep>,
    /// Bullet facts about the two attempts as a whole.
    pub deltas: Vec<String>,
    /// Facts favoring the left attempt.
    pub pros: Vec<String>,
    /// Facts favoring the right attempt.
    pub cons: Vec<String>,
    /// Human-readable paragraph summarizing the comparison.
    pub summary: String,
}

/// Computes the narrative diff between `left` and `right`, whose step
/// slices must already be ordered by `step_index`.
#[must_use]
pub fn diff(left: &Attempt, left_steps: &[AttemptStep], right: &Attempt, right_steps: &[AttemptStep]) -> NarrativeDiff {
    let aligned_steps = align(left_steps, right_steps);
    let deltas = build_deltas(left, left_steps, right, right_steps);
    let (pros, cons) = build_pros_cons(left, left_steps, right, right_steps);
    let summary = build_summary(left, right, &deltas, pros.len(), cons.len());
    NarrativeDiff { aligned_steps, deltas, pros, cons, summary }
}

/// Pairs the two step slices position by position.
fn align(left_steps: &[AttemptStep], right_steps: &[AttemptStep]) -> Vec<AlignedStep> {
    let len = left_steps.len().max(right_steps.len());
    (0..len)
        .map(|index| {
            let left = left_steps.get(index).cloned();
            let right = right_steps.get(index).cloned();
            let delta = step_delta(left.as_ref(), right.as_ref());
            AlignedStep { index, left, right, delta }
        })
        .collect()
}

/// Describes why a single aligned position differs, if it does.
fn step_delta(left: Option<&AttemptStep>, right: Option<&AttemptStep>) -> Option<String> {
    match (left, right) {
        (Some(_), None) => Some("right attempt has no step at this position".to_owned()),
        (None, Some(_)) => Some("left attempt has no step at this position".to_owned()),
        (None, None) => None,
        (Some(left), Some(right)) => {
            if left.kind != right.kind {
                return Some(format!("step kinds differ: left is {:?}, right is {:?}", left.kind, right.kind));
            }
            if left.output != right.output || left.observation != right.observation {
                return Some("step outputs or observations differ".to_owned());
            }
            None
        }
    }
}

/// Count of `error`-kind steps in a timeline.
fn error_step_count(steps: &[AttemptStep]) -> usize {
    steps.iter().filter(|step| step.kind == AttemptStepKind::Error).count()
}

/// The first `learn_complete` step's output, if any.
fn learn_complete_output(steps: &[AttemptStep]) -> Option<&serde_json::Value> {
    steps.iter().find(|step| step.kind == AttemptStepKind::LearnComplete).map(|step| &step.output)
}

/// Builds the bullet facts over status, step count, error count, and
/// `learn_complete` output.
fn build_deltas(left: &Attempt, left_steps: &[AttemptStep], right: &Attempt, right_steps: &[AttemptStep]) -> Vec<String> {
    let mut deltas = Vec::new();
    if left.status != right.status {
        deltas.push(format!("left attempt status is {:?}; right attempt status is {:?}", left.status, right.status));
    }
    if left_steps.len() != right_steps.len() {
        deltas.push(format!("left has {} steps; right has {} steps", left_steps.len(), right_steps.len()));
    }
    let (left_errors, right_errors) = (error_step_count(left_steps), error_step_count(right_steps));
    if left_errors != right_errors {
        deltas.push(format!("left has {left_errors} error steps; right has {right_errors} error steps"));
    }
    if learn_complete_output(left_steps) != learn_complete_output(right_steps) {
        deltas.push("learn_complete outputs differ".to_owned());
    }
    deltas
}

/// Derives pros (favoring left) and cons (favoring right) from status and
/// the counted deltas: fewer errors and fewer steps yield a pro on the
/// smaller side.
fn build_pros_cons(left: &Attempt, left_steps: &[AttemptStep], right: &Attempt, right_steps: &[AttemptStep]) -> (Vec<String>, Vec<String>) {
    let mut pros = Vec::new();
    let mut cons = Vec::new();

    if left.status == engram_core::AttemptStatus::Completed && right.status != engram_core::AttemptStatus::Completed {
        pros.push("left attempt completed; right attempt did not".to_owned());
    } else if right.status == engram_core::AttemptStatus::Completed && left.status != engram_core::AttemptStatus::Completed {
        cons.push("right attempt completed; left attempt did not".to_owned());
    }

    let (left_errors, right_errors) = (error_step_count(left_steps), error_step_count(right_steps));
    if left_errors < right_errors {
        pros.push(format!("left has fewer error steps ({left_errors} vs {right_errors})"));
    } else if right_errors < left_errors {
        cons.push(format!("right has fewer error steps ({right_errors} vs {left_errors})"));
    }

    if left_steps.len() < right_steps.len() {
        pros.push(format!("left has fewer steps ({} vs {})", left_steps.len(), right_steps.len()));
    } else if right_steps.len() < left_steps.len() {
        cons.push(format!("right has fewer steps ({} vs {})", right_steps.len(), left_steps.len()));
    }

    (pros, cons)
}

/// Composes the human-readable summary paragraph, naming both attempts,
/// up to three deltas, and the side with the higher pros-minus-cons score.
fn build_summary(left: &Attempt, right: &Attempt, deltas: &[String], pros: usize, cons: usize) -> String {
    let mut summary = format!("Comparing attempt {} (left) against attempt {} (right).", left.id.short(), right.id.short());
    if deltas.is_empty() {
        summary.push_str(" No differences were found.");
    } else {
        summary.push_str(" Differences: ");
        summary.push_str(&deltas.iter().take(3).cloned().collect::<Vec<_>>().join("; "));
        summary.push('.');
    }
    #[allow(clippy::cast_possible_wrap, reason = "pro/con counts are bounded by step counts, far below i64 range")]
    let score = pros as i64 - cons as i64;
    match score.cmp(&0) {
        std::cmp::Ordering::Greater => summary.push_str(" Left attempt scores higher."),
        std::cmp::Ordering::Less => summary.push_str(" Right attempt scores higher."),
        std::cmp::Ordering::Equal => summary.push_str(" The two attempts are tied."),
    }
    summary
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use engram_core::AttemptStatus;
    use engram_core::ContentId;
    use engram_core::Timestamp;
    use serde_json::Value;
    use serde_json::json;

    use super::*;

    fn attempt(id: &str, status: AttemptStatus) -> Attempt {
        Attempt {
            id: ContentId::parse(&id.repeat(64)).unwrap(),
            run_id: ContentId::parse(&"9".repeat(64)).unwrap(),
            ordinal: 0,
            status,
            result: None,
            created_at: Timestamp::now(),
            completed_at: None,
        }
    }

    fn step(attempt_id: &Attempt, index: u32, kind: AttemptStepKind, output: Value) -> AttemptStep {
        AttemptStep {
            id: ContentId::parse(&format!("{index}").repeat(64)).unwrap(),
            attempt_id: attempt_id.id.clone(),
            step_index: index,
            kind,
            input: Value::Null,
            output,
            observation: String::new(),
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn identical_attempts_produce_no_deltas_and_a_tie() {
        let left = attempt("1", AttemptStatus::Completed);
        let right = attempt("2", AttemptStatus::Completed);
        let left_steps = vec![step(&left, 0, AttemptStepKind::Reflect, json!({}))];
        let right_steps = vec![step(&right, 0, AttemptStepKind::Reflect, json!({}))];

        let result = diff(&left, &left_steps, &right, &right_steps);
        assert!(result.deltas.is_empty());
        assert!(result.summary.ends_with("tied."));
    }

    #[test]
    fn fewer_errors_yields_a_pro_for_that_side() {
        let left = attempt("1", AttemptStatus::Completed);
        let right = attempt("2", AttemptStatus::Completed);
        let left_steps = vec![step(&left, 0, AttemptStepKind::Reflect, json!({}))];
        let right_steps = vec![step(&right, 0, AttemptStepKind::Error, json!({}))];

        let result = diff(&left, &left_steps, &right, &right_steps);
        assert_eq!(result.pros.len(), 1);
        assert!(result.summary.ends_with("Left attempt scores higher."));
    }

    #[test]
    fn a_missing_step_on_one_side_is_flagged() {
        let left = attempt("1", AttemptStatus::Completed);
        let right = attempt("2", AttemptStatus::Completed);
        let left_steps = vec![step(&left, 0, AttemptStepKind::Reflect, json!({})), step(&left, 1, AttemptStepKind::LearnComplete, json!({}))];
        let right_steps = vec![step(&right, 0, AttemptStepKind::Reflect, json!({}))];

        let result = diff(&left, &left_steps, &right, &right_steps);
        assert_eq!(result.aligned_steps.len(), 2);
        assert!(result.aligned_steps[1].delta.is_some());
        assert!(result.deltas.iter().any(|delta| delta.contains("steps")));
    }

    #[test]
    fn diff_is_deterministic_for_identical_inputs() {
        let left = attempt("1", AttemptStatus::Failed);
        let right = attempt("2", AttemptStatus::Completed);
        let left_steps = vec![step(&left, 0, AttemptStepKind::Error, json!({"message": "boom"}))];
        let right_steps = vec![step(&right, 0, AttemptStepKind::LearnComplete, json!({"knowledgeItems": []}))];

        let first = diff(&left, &left_steps, &right, &right_steps);
        let second = diff(&left, &left_steps, &right, &right_steps);
        assert_eq!(first, second);
    }
}
