// engram-bbon/src/adopt.rs
// ============================================================================
// Module: Adoption
// Description: Ranks a run's attempts by judge outcomes and renders the
// winner's learned knowledge into the guidance document.
// Purpose: Turn a finished bBoN run into durable, applied knowledge.
// Dependencies: engram-core, engram-store, engram-learn
// ============================================================================

//! ## Overview
//! Adoption (§4.P steps 4-5) loads every [`engram_core::JudgeOutcome`] for
//! a run, ranks completed attempts by win count (ties broken by
//! confidence sum, then by ordinal ascending), pulls the knowledge item
//! ids carried on the winner's `learn_complete` steps, confirms each is
//! present in the repository, and finally invokes Apply so the guidance
//! document reflects the winning attempt's contribution.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use engram_core::Attempt;
use engram_core::AttemptStatus;
use engram_core::ContentId;
use engram_core::EngramError;
use engram_learn::apply;
use engram_store::AttemptFilters;
use engram_store::JudgeOutcomeFilters;
use engram_store::Repository;

/// Outcome of adopting a run's winning attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AdoptionResult {
    /// The run that was adopted.
    pub run_id: ContentId,
    /// The attempt selected as the winner.
    pub winner_attempt_id: ContentId,
    /// The winner's ranking score (sum of confidences across its wins).
    pub winner_score: f64,
    /// Knowledge item ids confirmed present from the winner's steps.
    pub knowledge_applied: Vec<ContentId>,
    /// Apply's rendering outcome for the guidance document.
    pub rendered: apply::ApplyResult,
}

/// A completed attempt's tally of judge wins.
struct Tally {
    /// The attempt this tally belongs to.
    attempt: Attempt,
    /// Count of judge outcomes naming this attempt as the winner.
    wins: u32,
    /// Sum of confidences across this attempt's wins.
    score: f64,
}

/// Ranks a run's completed attempts by judge outcomes, applies the
/// winner's learned knowledge, and renders the guidance document.
///
/// # Errors
/// Returns [`EngramError::State`] if no judge outcomes exist for the run,
/// or any repository/Apply error encountered along the way.
pub fn adopt(repository: &Repository, document_path: &Path, project_id: &str, run_id: &ContentId) -> Result<AdoptionResult, EngramError> {
    let outcomes = repository.list_judge_outcomes_for_run(&JudgeOutcomeFilters { run_id: Some(run_id.clone()) })?;
    if outcomes.is_empty() {
        return Err(EngramError::State(format!("run {} has no judge outcomes to adopt from", run_id.as_str())));
    }

    let completed: Vec<Attempt> =
        repository.list_attempts(&AttemptFilters { run_id: Some(run_id.clone()) })?.into_iter().filter(|attempt| attempt.status == AttemptStatus::Completed).collect();

    let mut tallies: Vec<Tally> = completed.into_iter().map(|attempt| Tally { attempt, wins: 0, score: 0.0 }).collect();
    for outcome in &outcomes {
        if let Some(tally) = tallies.iter_mut().find(|tally| tally.attempt.id == outcome.winner_attempt_id) {
            tally.wins += 1;
            tally.score += outcome.confidence;
        }
    }

    tallies.sort_by(|left, right| {
        right.wins.cmp(&left.wins).then_with(|| right.score.partial_cmp(&left.score).unwrap_or(std::cmp::Ordering::Equal)).then_with(|| left.attempt.ordinal.cmp(&right.attempt.ordinal))
    });

    let winner = tallies.into_iter().next().ok_or_else(|| EngramError::State(format!("run {} has no completed attempts to rank", run_id.as_str())))?;

    let steps = repository.list_attempt_steps(&winner.attempt.id)?;
    let mut knowledge_applied = Vec::new();
    for step in &steps {
        for item_id in step.knowledge_item_ids() {
            if repository.get_knowledge_item(&item_id)?.is_some() && !knowledge_applied.contains(&item_id) {
                knowledge_applied.push(item_id);
            }
        }
    }

    let rendered = apply::apply(repository, document_path, project_id)?;

    Ok(AdoptionResult { run_id: run_id.clone(), winner_attempt_id: winner.attempt.id, winner_score: winner.score, knowledge_applied, rendered })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use std::fs;

    use engram_core::AttemptInputs;
    use engram_core::AttemptStepInputs;
    use engram_core::AttemptStepKind;
    use engram_core::JudgeOutcomeInputs;
    use engram_core::JudgePair;
    use engram_core::JudgePairInputs;
    use engram_core::RunInputs;
    use engram_core::TaskInputs;
    use engram_store::AttemptPatch;
    use serde_json::Value;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn open_repository() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).unwrap();
        (dir, repository)
    }

    fn completed_attempt(repository: &Repository, run_id: &ContentId, ordinal: u32, output: Value) -> Attempt {
        let attempt = repository.add_attempt(AttemptInputs { run_id: run_id.clone(), ordinal }).unwrap();
        repository.update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Running), result: None }).unwrap();
        repository
            .add_attempt_step(AttemptStepInputs {
                attempt_id: attempt.id.clone(),
                step_index: 0,
                kind: AttemptStepKind::LearnComplete,
                input: Value::Null,
                output,
                observation: String::new(),
            })
            .unwrap();
        repository.update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Completed), result: Some(json!({"ok": true})) }).unwrap()
    }

    #[test]
    fn adopt_fails_when_no_judge_outcomes_exist() {
        let (dir, repository) = open_repository();
        let document_path = dir.path().join("AGENTS.md");
        fs::write(&document_path, format!("{}\n{}\n", apply::BEGIN_MARKER, apply::END_MARKER)).unwrap();
        let task = repository.add_task(TaskInputs { subject_id: None, spec: json!({"goal": "fix it"}) }).unwrap();
        let run = repository.add_run(RunInputs { task_id: task.id, n: 3, seed: 1, config: Value::Null }).unwrap();

        let err = adopt(&repository, &document_path, "engram", &run.id).unwrap_err();
        assert!(matches!(err, EngramError::State(_)));
    }

    #[test]
    fn adopt_picks_the_attempt_with_the_most_wins() {
        let (dir, repository) = open_repository();
        let document_path = dir.path().join("AGENTS.md");
        fs::write(&document_path, format!("{}\n{}\n", apply::BEGIN_MARKER, apply::END_MARKER)).unwrap();
        let task = repository.add_task(TaskInputs { subject_id: None, spec: json!({"goal": "fix it"}) }).unwrap();
        let run = repository.add_run(RunInputs { task_id: task.id, n: 3, seed: 1, config: Value::Null }).unwrap();

        let winner = completed_attempt(&repository, &run.id, 0, json!({"knowledgeItems": []}));
        let loser = completed_attempt(&repository, &run.id, 1, json!({"knowledgeItems": []}));

        let (left_id, right_id) = JudgePair::normalize(winner.id.clone(), loser.id.clone());
        let pair = repository
            .add_judge_pair(JudgePairInputs { run_id: run.id.clone(), left_attempt_id: left_id, right_attempt_id: right_id, prompt_version: "v1".to_owned() })
            .unwrap();
        repository
            .add_judge_outcome(JudgeOutcomeInputs {
                pair_id: pair.id,
                winner_attempt_id: winner.id.clone(),
                confidence: 0.9,
                rationale: "left is cleaner".to_owned(),
                narrative_diff: Value::Null,
                model: "test-model".to_owned(),
            })
            .unwrap();

        let result = adopt(&repository, &document_path, "engram", &run.id).unwrap();
        assert_eq!(result.winner_attempt_id, winner.id);
        assert!((result.winner_score - 0.9).abs() < f64::EPSILON);
    }
}
