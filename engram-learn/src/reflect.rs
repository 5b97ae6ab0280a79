// engram-learn/src/reflect.rs
// ============================================================================
// Module: Reflect
// Description: Groups failed-trace errors into candidate insights.
// Purpose: Turn recurring failures across many traces into a small number
// of scored, deduplicated observations pending curation.
// Dependencies: engram-core, engram-store
// ============================================================================

//! ## Overview
//! Reflect is a pure grouping step ([`build_candidates`]) wrapped by a thin
//! persistence shell ([`reflect`]). Grouping never touches the store, which
//! keeps the scoring algorithm (confidence, sort order, emission threshold)
//! testable without a database.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use engram_core::ContentId;
use engram_core::EngramError;
use engram_core::Insight;
use engram_core::InsightInputs;
use engram_core::Trace;
use engram_store::Repository;
use engram_store::TraceFilters;

/// One grouped, scored observation pending curation.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightCandidate {
    /// `"<tool> error in <file>"`.
    pub pattern: String,
    /// The grouped error message.
    pub description: String,
    /// Count of occurrences across all failed traces.
    pub frequency: u32,
    /// `min(1.0, distinct_traces / total_failed_traces)`.
    pub confidence: f64,
    /// Non-empty, distinct subject ids from the containing traces.
    pub related_subjects: Vec<String>,
    /// Trace ids that contributed to this group.
    pub contributing_traces: Vec<ContentId>,
    /// `[tool, "error-pattern"]`, with empty entries dropped.
    pub meta_tags: Vec<String>,
}

/// Groups every failed trace's errors by `(tool, file, message)`, scores
/// each group, and returns the candidates that clear the emission
/// threshold, sorted by `confidence desc, pattern asc`.
#[must_use]
pub fn build_candidates(failed_traces: &[Trace]) -> Vec<InsightCandidate> {
    let total = failed_traces.len();
    if total == 0 {
        return Vec::new();
    }

    let mut groups: BTreeMap<(String, String, String), GroupAccumulator> = BTreeMap::new();
    for trace in failed_traces {
        for error in trace.failed_errors() {
            if error.message.trim().is_empty() {
                continue;
            }
            let key = (error.tool.clone(), error.file.clone(), error.message.clone());
            let entry = groups.entry(key).or_insert_with(GroupAccumulator::default);
            entry.occurrences += 1;
            entry.trace_ids.insert(trace.id.clone());
            if !trace.subject_id.trim().is_empty() {
                entry.subjects.insert(trace.subject_id.clone());
            }
        }
    }

    let mut candidates: Vec<InsightCandidate> = groups
        .into_iter()
        .filter_map(|((tool, file, message), group)| {
            let confidence = (group.trace_ids.len() as f64 / total as f64).min(1.0);
            if confidence < Insight::emission_threshold() {
                return None;
            }
            let meta_tags = [tool.clone(), "error-pattern".to_owned()].into_iter().filter(|tag| !tag.trim().is_empty()).collect();
            Some(InsightCandidate {
                pattern: format!("{tool} error in {file}"),
                description: message,
                frequency: group.occurrences,
                confidence,
                related_subjects: group.subjects.into_iter().collect(),
                contributing_traces: group.trace_ids.into_iter().collect(),
                meta_tags,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.pattern.cmp(&b.pattern)));
    candidates
}

#[derive(Debug, Default)]
struct GroupAccumulator {
    occurrences: u32,
    trace_ids: BTreeSet<ContentId>,
    subjects: BTreeSet<String>,
}

/// Runs Reflect: loads every failed trace, builds candidates, skips any
/// whose `(pattern, description)` already exists among stored insights, and
/// persists the rest.
///
/// # Errors
/// Returns [`EngramError::External`] on a store error.
pub fn reflect(repository: &Repository) -> Result<Vec<Insight>, EngramError> {
    let failed_traces = repository.list_traces(&TraceFilters { outcome: Some(engram_core::TraceOutcome::Failure) })?;
    let candidates = build_candidates(&failed_traces);
    let existing = repository.list_insights()?;

    let mut created = Vec::new();
    for candidate in candidates {
        let already_known = existing
            .iter()
            .any(|insight| insight.pattern == candidate.pattern && insight.description == candidate.description);
        if already_known {
            continue;
        }
        let inputs = InsightInputs { pattern: candidate.pattern, description: candidate.description };
        let insight = repository.add_insight(
            inputs,
            candidate.confidence,
            candidate.frequency,
            candidate.meta_tags,
            candidate.contributing_traces,
        )?;
        created.push(insight);
    }
    Ok(created)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use engram_core::ErrorSeverity;
    use engram_core::ExecutionError;
    use engram_core::ExecutionStatus;
    use engram_core::ToolExecution;
    use engram_core::TraceOutcome;
    use engram_store::Repository;
    use tempfile::tempdir;

    use super::*;

    fn open_repository() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).unwrap();
        (dir, repository)
    }

    fn failing_trace(subject_id: &str) -> Trace {
        Trace {
            id: ContentId::parse(&"1".repeat(64)).unwrap(),
            subject_id: subject_id.to_owned(),
            task_description: None,
            session_id: None,
            executions: vec![ToolExecution {
                runner: "cargo".to_owned(),
                command: "cargo build".to_owned(),
                status: ExecutionStatus::Fail,
                errors: vec![ExecutionError {
                    tool: "tsc".to_owned(),
                    severity: ErrorSeverity::Error,
                    message: "Property does not exist on type".to_owned(),
                    file: "src/test.ts".to_owned(),
                    line: 10,
                    column: None,
                }],
            }],
            outcome: TraceOutcome::Failure,
            discovered_issues: vec![],
            created_at: engram_core::Timestamp::now(),
        }
    }

    #[test]
    fn empty_input_produces_empty_output() {
        assert!(build_candidates(&[]).is_empty());
    }

    #[test]
    fn a_single_failing_trace_meets_the_emission_threshold() {
        let trace = failing_trace("agent-1");
        let candidates = build_candidates(&[trace]);
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(candidates[0].pattern, "tsc error in src/test.ts");
        assert_eq!(candidates[0].meta_tags, vec!["tsc".to_owned(), "error-pattern".to_owned()]);
    }

    #[test]
    fn empty_messages_are_skipped() {
        let mut trace = failing_trace("agent-1");
        trace.executions[0].errors[0].message = "  ".to_owned();
        assert!(build_candidates(&[trace]).is_empty());
    }

    #[test]
    fn reflect_skips_candidates_matching_an_existing_insight() {
        let (_dir, repository) = open_repository();
        repository
            .add_insight(
                InsightInputs {
                    pattern: "tsc error in src/test.ts".to_owned(),
                    description: "Property does not exist on type".to_owned(),
                },
                1.0,
                1,
                vec!["tsc".to_owned(), "error-pattern".to_owned()],
                vec![],
            )
            .unwrap();
        repository.add_trace(engram_core::TraceInputs {
            subject_id: "agent-1".to_owned(),
            task_description: None,
            session_id: None,
            executions: failing_trace("agent-1").executions,
            outcome: TraceOutcome::Failure,
            discovered_issues: vec![],
        })
        .unwrap();

        let created = reflect(&repository).unwrap();
        assert!(created.is_empty());
        assert_eq!(repository.list_insights().unwrap().len(), 1);
    }
}
