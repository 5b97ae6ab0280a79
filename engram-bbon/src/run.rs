// engram-bbon/src/run.rs
// ============================================================================
// Module: bBoN Orchestrator
// Description: Creates a Task and Run, then sequentially drives the Learn
// orchestrator across `n` Attempts.
// Purpose: Implement the end-to-end Best-of-N attempt fan-out (§4.M).
// Dependencies: engram-core, engram-store, engram-learn
// ============================================================================

//! ## Overview
//! [`run`] validates the caller's [`engram_core::TaskSpec`], creates the
//! owning [`engram_core::Task`] and [`engram_core::Run`], then for each
//! ordinal in `[0, n)` walks an [`engram_core::Attempt`] through
//! `pending -> running -> {completed, failed}`, logging a `reflect` step
//! before invoking Learn and a `learn_complete` or `error` step after.
//! Attempts run sequentially: parallelism is only safe when each attempt
//! is sandboxed to a disjoint guidance document, which this orchestrator
//! does not attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use engram_core::Attempt;
use engram_core::AttemptInputs;
use engram_core::AttemptStatus;
use engram_core::AttemptStepInputs;
use engram_core::AttemptStepKind;
use engram_core::ContentId;
use engram_core::EngramError;
use engram_core::Run;
use engram_core::RunInputs;
use engram_core::TaskInputs;
use engram_core::TaskSpec;
use engram_learn::orchestrator::LearnResult;
use engram_store::AttemptPatch;
use engram_store::Repository;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tracing::info;
use tracing::warn;

/// Caller-facing request to start a bBoN run (§6).
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The task specification to attempt.
    pub spec: TaskSpec,
    /// Number of attempts to generate; defaults to [`Run::DEFAULT_N`].
    pub n: Option<u32>,
    /// Seed for attempt generation; defaults to the current wall clock.
    pub seed: Option<i64>,
    /// Provider-specific generation configuration.
    pub config: Value,
}

/// The outcome of a single attempt within a run.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    /// The attempt's final row.
    pub attempt: Attempt,
    /// The learn cycle's result, if the attempt completed.
    pub learn_result: Option<LearnResult>,
}

/// Summary of a finished bBoN run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The task this run executed.
    pub task_id: ContentId,
    /// The run itself.
    pub run_id: ContentId,
    /// One outcome per attempt, in ordinal order.
    pub attempts: Vec<AttemptOutcome>,
}

/// Runs the bBoN fan-out: creates the Task and Run, then sequentially
/// drives every attempt through Learn (§4.M).
///
/// # Errors
/// Returns [`EngramError::Validation`] if `request.spec` is invalid, or
/// any repository error encountered while creating the Task or Run.
/// Individual attempt failures do not abort the run; they are recorded
/// as `failed` attempts and the run still returns `Ok`.
pub fn run(repository: &Repository, document_path: &Path, project_id: &str, learn_tau: f64, request: RunRequest) -> Result<RunSummary, EngramError> {
    request.spec.validate()?;

    let spec_json = serde_json::to_value(&request.spec).map_err(|err| EngramError::InvalidInput(format!("failed to encode task spec: {err}")))?;
    let task = repository.add_task(TaskInputs { subject_id: request.spec.subject_id.clone(), spec: spec_json.clone() })?;

    let n = request.n.unwrap_or(Run::DEFAULT_N);
    let seed = request.seed.unwrap_or_else(default_seed);
    let run = repository.add_run(RunInputs { task_id: task.id.clone(), n, seed, config: request.config })?;

    let mut attempts = Vec::with_capacity(n as usize);
    for ordinal in 0..n {
        attempts.push(run_one_attempt(repository, document_path, project_id, learn_tau, &run, ordinal, &spec_json)?);
    }

    Ok(RunSummary { task_id: task.id, run_id: run.id, attempts })
}

/// Derives a default seed from the wall clock, for callers who do not
/// need reproducible attempt generation.
fn default_seed() -> i64 {
    #[allow(clippy::cast_possible_wrap, reason = "wall-clock seconds since epoch stay well within i64 range")]
    let seconds = SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_secs() as i64).unwrap_or(0);
    seconds
}

/// Walks one attempt through its full lifecycle: pending, running, the
/// reflect step, the Learn cycle, and a terminal completed/failed status.
fn run_one_attempt(
    repository: &Repository,
    document_path: &Path,
    project_id: &str,
    learn_tau: f64,
    run: &Run,
    ordinal: u32,
    spec_json: &Value,
) -> Result<AttemptOutcome, EngramError> {
    let attempt = repository.add_attempt(AttemptInputs { run_id: run.id.clone(), ordinal })?;
    let attempt = repository.update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Running), result: None })?;

    repository.add_attempt_step(AttemptStepInputs {
        attempt_id: attempt.id.clone(),
        step_index: 0,
        kind: AttemptStepKind::Reflect,
        input: spec_json.clone(),
        output: Value::Null,
        observation: format!("attempt {ordinal} started"),
    })?;

    match engram_learn::orchestrator::learn(repository, document_path, project_id, learn_tau) {
        Ok(learn_result) => {
            let output = json!({
                "insightsCreated": learn_result.insights_created,
                "knowledgeItemsPromoted": learn_result.curate.promoted,
                "rendered": learn_result.apply.rendered,
                "knowledgeItems": learn_result.curate.promoted,
            });
            repository.add_attempt_step(AttemptStepInputs {
                attempt_id: attempt.id.clone(),
                step_index: 1,
                kind: AttemptStepKind::LearnComplete,
                input: Value::Null,
                output,
                observation: format!("attempt {ordinal} learned"),
            })?;
            let result = serde_json::to_value(&LearnResultSummary::from(&learn_result)).unwrap_or(Value::Null);
            let attempt = repository.update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Completed), result: Some(result) })?;
            info!(ordinal, attempt = %attempt.id.short(), "attempt completed");
            Ok(AttemptOutcome { attempt, learn_result: Some(learn_result) })
        }
        Err(err) => {
            repository.add_attempt_step(AttemptStepInputs {
                attempt_id: attempt.id.clone(),
                step_index: 1,
                kind: AttemptStepKind::Error,
                input: Value::Null,
                output: Value::Null,
                observation: json!({"error": err.to_string()}).to_string(),
            })?;
            let attempt = repository.update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Failed), result: Some(json!({"error": err.to_string()})) })?;
            warn!(ordinal, attempt = %attempt.id.short(), error = %err, "attempt failed");
            Ok(AttemptOutcome { attempt, learn_result: None })
        }
    }
}

/// JSON-friendly projection of [`LearnResult`] stored on a completed
/// attempt's `result` column.
#[derive(Debug, Serialize)]
struct LearnResultSummary {
    /// Count of insights created by Reflect.
    insights_created: usize,
    /// Count of knowledge items Curate promoted.
    knowledge_promoted: usize,
    /// Count of duplicate insights Curate collapsed.
    deduplicated: u32,
    /// Whether Apply rewrote the guidance document.
    rendered: bool,
}

impl From<&LearnResult> for LearnResultSummary {
    fn from(result: &LearnResult) -> Self {
        Self {
            insights_created: result.insights_created,
            knowledge_promoted: result.curate.promoted.len(),
            deduplicated: result.curate.deduplicated,
            rendered: result.apply.rendered,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use std::fs;

    use engram_core::ErrorSeverity;
    use engram_core::ExecutionError;
    use engram_core::ExecutionStatus;
    use engram_core::ToolExecution;
    use engram_core::TraceInputs;
    use engram_core::TraceOutcome;
    use tempfile::tempdir;

    use engram_learn::apply;

    use super::*;

    fn open_repository() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).unwrap();
        (dir, repository)
    }

    #[test]
    fn run_rejects_an_empty_goal() {
        let (_dir, repository) = open_repository();
        let document_path = Path::new("unused.md");
        let request = RunRequest { spec: TaskSpec { goal: String::new(), subject_id: None, constraints: vec![], context: None }, n: Some(1), seed: Some(1), config: Value::Null };
        let err = run(&repository, document_path, "engram", 0.8, request).unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }

    #[test]
    fn run_produces_n_attempts_and_records_failures_without_aborting() {
        let (dir, repository) = open_repository();
        let document_path = dir.path().join("AGENTS.md");
        fs::write(&document_path, format!("{}\n{}\n", apply::BEGIN_MARKER, apply::END_MARKER)).unwrap();

        repository
            .add_trace(TraceInputs {
                subject_id: "agent-1".to_owned(),
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
            })
            .unwrap();

        let request = RunRequest {
            spec: TaskSpec { goal: "fix the build".to_owned(), subject_id: None, constraints: vec![], context: None },
            n: Some(2),
            seed: Some(7),
            config: Value::Null,
        };
        let summary = run(&repository, &document_path, "engram", 0.5, request).unwrap();
        assert_eq!(summary.attempts.len(), 2);
        assert!(summary.attempts.iter().all(|outcome| outcome.attempt.status == AttemptStatus::Completed));
    }

    #[test]
    fn run_marks_an_attempt_failed_when_the_guidance_document_is_missing() {
        let (_dir, repository) = open_repository();
        let missing = Path::new("/nonexistent/AGENTS.md");
        let request =
            RunRequest { spec: TaskSpec { goal: "fix the build".to_owned(), subject_id: None, constraints: vec![], context: None }, n: Some(1), seed: Some(1), config: Value::Null };
        let summary = run(&repository, missing, "engram", 0.5, request).unwrap();
        assert_eq!(summary.attempts.len(), 1);
        assert_eq!(summary.attempts[0].attempt.status, AttemptStatus::Failed);
    }
}
