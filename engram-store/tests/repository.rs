// engram-store/tests/repository.rs
// ============================================================================
// Integration tests exercising Repository against a real, temporary SQLite
// database rather than mocks, matching the universal invariants (idempotent
// add, incremental counters, attempt state machine, pair uniqueness).
// ============================================================================

//! Integration tests for `Repository`.

use engram_core::AttemptInputs;
use engram_core::AttemptStatus;
use engram_core::InsightInputs;
use engram_core::JudgeOutcomeInputs;
use engram_core::JudgePair;
use engram_core::JudgePairInputs;
use engram_core::KnowledgeItemInputs;
use engram_core::KnowledgeKind;
use engram_core::Run;
use engram_core::RunInputs;
use engram_core::ShortTermMemoryInputs;
use engram_core::TaskInputs;
use engram_core::TraceInputs;
use engram_core::TraceOutcome;
use engram_core::WorkingMemoryInputs;
use engram_core::WorkingMemoryType;
use engram_store::AttemptPatch;
use engram_store::Repository;
use serde_json::Value;
use serde_json::json;

fn open_repository() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).expect("open repository");
    (dir, repository)
}

#[test]
fn add_knowledge_item_is_idempotent() {
    let (_dir, repository) = open_repository();
    let inputs = KnowledgeItemInputs {
        kind: KnowledgeKind::Pattern,
        text: "Property does not exist on type".to_owned(),
        scope: "repo".to_owned(),
        module: None,
    };
    let first = repository.add_knowledge_item(inputs.clone(), 0.9, vec!["tsc".to_owned()]).unwrap();
    let second = repository.add_knowledge_item(inputs, 0.9, vec!["tsc".to_owned()]).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(repository.list_knowledge_items(&Default::default()).unwrap().len(), 1);
}

#[test]
fn knowledge_item_feedback_only_increments() {
    let (_dir, repository) = open_repository();
    let item = repository
        .add_knowledge_item(
            KnowledgeItemInputs {
                kind: KnowledgeKind::Fact,
                text: "tests must use a real database".to_owned(),
                scope: "repo".to_owned(),
                module: None,
            },
            0.8,
            vec![],
        )
        .unwrap();
    let updated = repository.update_knowledge_item_feedback(&item.id, 1, 0).unwrap();
    assert_eq!(updated.helpful, 1);
    assert_eq!(updated.harmful, 0);
    let updated_again = repository.update_knowledge_item_feedback(&item.id, 0, 1).unwrap();
    assert_eq!(updated_again.helpful, 1);
    assert_eq!(updated_again.harmful, 1);
}

#[test]
fn insight_lifecycle_add_list_delete() {
    let (_dir, repository) = open_repository();
    let insight = repository
        .add_insight(
            InsightInputs {
                pattern: "cargo:build.rs:missing feature".to_owned(),
                description: "build.rs assumed a feature that was not enabled".to_owned(),
            },
            0.75,
            1,
            vec!["cargo".to_owned(), "error-pattern".to_owned()],
            vec![],
        )
        .unwrap();
    assert_eq!(repository.list_insights().unwrap().len(), 1);
    repository.delete_insight(&insight.id).unwrap();
    assert!(repository.list_insights().unwrap().is_empty());
}

#[test]
fn trace_round_trips_executions_and_outcome() {
    let (_dir, repository) = open_repository();
    let trace = repository
        .add_trace(TraceInputs {
            subject_id: "agent-1".to_owned(),
            task_description: Some("fix the build".to_owned()),
            session_id: Some("sess-1".to_owned()),
            executions: vec![],
            outcome: TraceOutcome::Failure,
            discovered_issues: vec!["missing lockfile entry".to_owned()],
        })
        .unwrap();
    let fetched = repository.get_trace(&trace.id).unwrap().expect("trace exists");
    assert_eq!(fetched.discovered_issues, vec!["missing lockfile entry".to_owned()]);
    assert_eq!(fetched.outcome, TraceOutcome::Failure);
}

#[test]
fn attempt_state_machine_rejects_illegal_transitions() {
    let (_dir, repository) = open_repository();
    let task = repository.add_task(TaskInputs { subject_id: None, spec: json!({"goal": "ship it"}) }).unwrap();
    let run = repository.add_run(RunInputs { task_id: task.id, n: Run::DEFAULT_N, seed: 7, config: Value::Null }).unwrap();
    let attempt = repository.add_attempt(AttemptInputs { run_id: run.id, ordinal: 0 }).unwrap();
    assert_eq!(attempt.status, AttemptStatus::Pending);

    let err = repository
        .update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Completed), result: None })
        .unwrap_err();
    assert!(matches!(err, engram_core::EngramError::State(_)));

    let running = repository
        .update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Running), result: None })
        .unwrap();
    assert_eq!(running.status, AttemptStatus::Running);

    let completed = repository
        .update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Completed), result: Some(json!({"ok": true})) })
        .unwrap();
    assert_eq!(completed.status, AttemptStatus::Completed);
    assert!(completed.completed_at.is_some());

    let err = repository
        .update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Running), result: None })
        .unwrap_err();
    assert!(matches!(err, engram_core::EngramError::State(_)));
}

#[test]
fn judge_pair_id_is_stable_across_enumeration_order() {
    let (_dir, repository) = open_repository();
    let task = repository.add_task(TaskInputs { subject_id: None, spec: json!({"goal": "ship it"}) }).unwrap();
    let run = repository.add_run(RunInputs { task_id: task.id.clone(), n: 2, seed: 1, config: Value::Null }).unwrap();
    let left = repository.add_attempt(AttemptInputs { run_id: run.id.clone(), ordinal: 0 }).unwrap();
    let right = repository.add_attempt(AttemptInputs { run_id: run.id.clone(), ordinal: 1 }).unwrap();

    let (a, b) = JudgePair::normalize(left.id.clone(), right.id.clone());
    let (c, d) = JudgePair::normalize(right.id, left.id);
    assert_eq!((a.clone(), b.clone()), (c, d));

    let pair = repository
        .add_judge_pair(JudgePairInputs {
            run_id: run.id,
            left_attempt_id: a,
            right_attempt_id: b,
            prompt_version: "v1".to_owned(),
        })
        .unwrap();
    assert_eq!(repository.list_judge_pairs(&pair.run_id).unwrap().len(), 1);
}

#[test]
fn judge_outcome_is_unique_per_pair() {
    let (_dir, repository) = open_repository();
    let task = repository.add_task(TaskInputs { subject_id: None, spec: json!({"goal": "ship it"}) }).unwrap();
    let run = repository.add_run(RunInputs { task_id: task.id, n: 2, seed: 1, config: Value::Null }).unwrap();
    let left = repository.add_attempt(AttemptInputs { run_id: run.id.clone(), ordinal: 0 }).unwrap();
    let right = repository.add_attempt(AttemptInputs { run_id: run.id.clone(), ordinal: 1 }).unwrap();
    let (a, b) = JudgePair::normalize(left.id.clone(), right.id.clone());
    let pair = repository
        .add_judge_pair(JudgePairInputs { run_id: run.id, left_attempt_id: a, right_attempt_id: b, prompt_version: "v1".to_owned() })
        .unwrap();

    let outcome = repository
        .add_judge_outcome(JudgeOutcomeInputs {
            pair_id: pair.id.clone(),
            winner_attempt_id: left.id.clone(),
            confidence: 0.9,
            rationale: "left handles the edge case".to_owned(),
            narrative_diff: json!({"summary": "left wins"}),
            model: "stub-judge".to_owned(),
        })
        .unwrap();
    assert_eq!(outcome.winner_attempt_id, left.id);

    // A second call against the same pair resolves to the existing outcome
    // rather than recording a conflicting verdict.
    let repeat = repository
        .add_judge_outcome(JudgeOutcomeInputs {
            pair_id: pair.id.clone(),
            winner_attempt_id: right.id,
            confidence: 0.5,
            rationale: "retry with a different winner".to_owned(),
            narrative_diff: json!({"summary": "right wins"}),
            model: "stub-judge".to_owned(),
        })
        .unwrap();
    assert_eq!(repeat.id, outcome.id);
    assert_eq!(repeat.winner_attempt_id, outcome.winner_attempt_id);
    assert!(repository.get_judge_outcome_by_pair(&pair.id).unwrap().is_some());
}

#[test]
fn short_term_memory_upsert_overwrites_and_clear_removes_all() {
    let (_dir, repository) = open_repository();
    let task = repository.add_task(TaskInputs { subject_id: None, spec: json!({"goal": "ship it"}) }).unwrap();
    let run = repository.add_run(RunInputs { task_id: task.id, n: 1, seed: 1, config: Value::Null }).unwrap();
    let inputs = ShortTermMemoryInputs { run_id: run.id.clone(), key: "scratchpad".to_owned() };
    repository.upsert_short_term_memory(inputs.clone(), json!({"step": 1})).unwrap();
    let updated = repository.upsert_short_term_memory(inputs, json!({"step": 2})).unwrap();
    assert_eq!(updated.value, json!({"step": 2}));
    assert_eq!(repository.list_short_term_memory(&run.id).unwrap().len(), 1);
    let deleted = repository.clear_short_term_memory(&run.id).unwrap();
    assert_eq!(deleted, 1);
    assert!(repository.list_short_term_memory(&run.id).unwrap().is_empty());
}

#[test]
fn working_memory_upsert_refreshes_provenance_without_changing_id() {
    let (_dir, repository) = open_repository();
    let inputs = WorkingMemoryInputs {
        project_id: "engram".to_owned(),
        memory_type: WorkingMemoryType::Invariant,
        content_text: "migrations are additive-only".to_owned(),
    };
    let first = repository.upsert_working_memory(inputs.clone(), json!({"source": "curate"})).unwrap();
    let second = repository.upsert_working_memory(inputs, json!({"source": "recurate"})).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.provenance, json!({"source": "recurate"}));
}

#[test]
fn reopening_the_same_database_does_not_rerun_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("engram.db");
    let audit_path = dir.path().join("audit.ndjson");
    let repository = Repository::open(&db_path, &audit_path).unwrap();
    repository
        .add_task(TaskInputs { subject_id: None, spec: json!({"goal": "first open"}) })
        .unwrap();
    drop(repository);

    let reopened = Repository::open(&db_path, &audit_path).unwrap();
    assert_eq!(reopened.list_tasks().unwrap().len(), 1);
}
