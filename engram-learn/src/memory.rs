// engram-learn/src/memory.rs
// ============================================================================
// Module: Memory Promotion
// Description: Classifies high-confidence insights and upserts them into
// project-scoped working memory.
// Purpose: Turn curated, recurring observations into standing guidance
// the renderer can surface as decisions, invariants, and summaries.
// Dependencies: engram-core, engram-store, regex
// ============================================================================

//! ## Overview
//! Every insight with `confidence >= tau` is classified by the words its
//! pattern and description contain: `should`/`must`/`prefer`/`avoid`/
//! `never`/`always` marks a [`engram_core::WorkingMemoryType::Decision`];
//! failing that, `require(s)`/`constraint`/`rule`/`law`/`guarantee` marks
//! an [`engram_core::WorkingMemoryType::Invariant`]; anything else is a
//! [`engram_core::WorkingMemoryType::Summary`]. The provenance event this
//! module records is keyed on the insight that drove the promotion, with
//! the resulting working memory row's id carried in the event's `data`
//! payload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::LazyLock;

use engram_core::EngramError;
use engram_core::Insight;
use engram_core::MemoryEventInputs;
use engram_core::MemorySubjectKind;
use engram_core::WorkingMemory;
use engram_core::WorkingMemoryInputs;
use engram_core::WorkingMemoryType;
use engram_store::Repository;
use regex::Regex;
use serde_json::json;

/// Falls back to a pattern that matches nothing if `pattern` fails to
/// compile, so a malformed static regex degrades to "never classifies as
/// this kind" rather than panicking. `"a^"` is a fixed literal that is
/// always valid regex syntax, so the fallback itself cannot fail.
fn compile_or_never_match(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| Regex::new("a^").unwrap_or_else(|_| unreachable!("the literal fallback pattern always compiles")))
}

static DECISION_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile_or_never_match(r"(?i)\b(should|must|prefer|avoid|never|always)\b"));

static INVARIANT_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile_or_never_match(r"(?i)\b(requires?|constraint|rule|law|guarantee)\b"));

/// Classifies free text into a [`WorkingMemoryType`] by keyword.
#[must_use]
pub fn classify(text: &str) -> WorkingMemoryType {
    if DECISION_PATTERN.is_match(text) {
        WorkingMemoryType::Decision
    } else if INVARIANT_PATTERN.is_match(text) {
        WorkingMemoryType::Invariant
    } else {
        WorkingMemoryType::Summary
    }
}

/// Outcome of one Memory promotion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionResult {
    /// Working memory notes created or refreshed.
    pub promoted: Vec<WorkingMemory>,
}

/// Promotes every insight with `confidence >= tau` into `project_id`'s
/// working memory, recording a provenance event for each promotion.
///
/// # Errors
/// Returns [`EngramError::InvalidInput`] if `tau` is non-finite or outside
/// `[0.0, 1.0]`, or [`EngramError::External`] on a store error.
pub fn promote(repository: &Repository, project_id: &str, tau: f64) -> Result<PromotionResult, EngramError> {
    if !tau.is_finite() || !(0.0..=1.0).contains(&tau) {
        return Err(EngramError::InvalidInput("tau must be a finite number within [0.0, 1.0]".to_owned()));
    }

    let mut result = PromotionResult::default();
    for insight in repository.list_insights()?.into_iter().filter(|insight| insight.confidence >= tau) {
        let promoted = promote_one(repository, project_id, &insight)?;
        result.promoted.push(promoted);
    }
    Ok(result)
}

/// Promotes a single insight, upserting its working memory note and
/// recording the provenance event against the insight itself.
fn promote_one(repository: &Repository, project_id: &str, insight: &Insight) -> Result<WorkingMemory, EngramError> {
    let memory_type = classify(&format!("{} {}", insight.pattern, insight.description));
    let inputs = WorkingMemoryInputs { project_id: project_id.to_owned(), memory_type, content_text: insight.description.clone() };
    let provenance = json!({"insightId": insight.id.as_str(), "confidence": insight.confidence, "frequency": insight.frequency});
    let working_memory = repository.upsert_working_memory(inputs, provenance)?;

    repository.add_memory_event(MemoryEventInputs {
        subject_id: insight.id.clone(),
        subject_kind: MemorySubjectKind::Insight,
        event: "promoted_to_working_memory".to_owned(),
        data: json!({
            "workingMemoryId": working_memory.id.as_str(),
            "type": working_memory_type_label(memory_type),
            "confidence": insight.confidence,
            "frequency": insight.frequency,
        }),
    })?;
    Ok(working_memory)
}

/// Matches the store's own label strings, kept local so this module does
/// not reach into `engram-store`'s private repository internals.
fn working_memory_type_label(kind: WorkingMemoryType) -> &'static str {
    match kind {
        WorkingMemoryType::Decision => "decision",
        WorkingMemoryType::Invariant => "invariant",
        WorkingMemoryType::Summary => "summary",
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use engram_core::InsightInputs;
    use tempfile::tempdir;

    use super::*;

    fn open_repository() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).unwrap();
        (dir, repository)
    }

    #[test]
    fn classify_recognizes_decisions() {
        assert_eq!(classify("you should always run migrations before merging"), WorkingMemoryType::Decision);
    }

    #[test]
    fn classify_recognizes_invariants() {
        assert_eq!(classify("the store requires append-only migrations"), WorkingMemoryType::Invariant);
    }

    #[test]
    fn classify_falls_back_to_summary() {
        assert_eq!(classify("the build finished in ninety seconds"), WorkingMemoryType::Summary);
    }

    #[test]
    fn promote_rejects_tau_out_of_range() {
        let (_dir, repository) = open_repository();
        assert!(matches!(promote(&repository, "engram", -0.1).unwrap_err(), EngramError::InvalidInput(_)));
    }

    #[test]
    fn promote_upserts_working_memory_and_records_an_event() {
        let (_dir, repository) = open_repository();
        let insight = repository
            .add_insight(
                InsightInputs { pattern: "tsc error in src/test.ts".to_owned(), description: "you must avoid implicit any types".to_owned() },
                0.9,
                2,
                vec!["tsc".to_owned(), "error-pattern".to_owned()],
                vec![],
            )
            .unwrap();

        let result = promote(&repository, "engram", 0.8).unwrap();
        assert_eq!(result.promoted.len(), 1);
        assert_eq!(result.promoted[0].memory_type, WorkingMemoryType::Decision);
        assert_eq!(result.promoted[0].content_text, insight.description);

        let events = repository.list_memory_events(&insight.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "promoted_to_working_memory");
        assert_eq!(events[0].subject_kind, MemorySubjectKind::Insight);
    }

    #[test]
    fn classify_checks_both_pattern_and_description() {
        assert_eq!(classify("must fix tsc error"), WorkingMemoryType::Decision);
    }

    #[test]
    fn promote_is_idempotent_for_an_unchanged_insight() {
        let (_dir, repository) = open_repository();
        repository
            .add_insight(
                InsightInputs { pattern: "tsc error in src/test.ts".to_owned(), description: "you must avoid implicit any types".to_owned() },
                0.9,
                2,
                vec![],
                vec![],
            )
            .unwrap();

        let first = promote(&repository, "engram", 0.8).unwrap();
        let second = promote(&repository, "engram", 0.8).unwrap();
        assert_eq!(first.promoted[0].id, second.promoted[0].id);
    }
}
