// engram-bbon/src/judge.rs
// ============================================================================
// Module: Comparative Judge & Driver
// Description: Invokes the LLM judge on a single pair, and drives it
// across every unordered pair of completed attempts in a run.
// Purpose: Turn narrative diffs into persisted, cached JudgeOutcomes.
// Dependencies: engram-core, engram-store, engram-providers
// ============================================================================

//! ## Overview
//! [`judge_pair`] is the single-pair comparative judge (§4.O): it hashes
//! the pair's identity, builds the prompt, calls the LLM, and parses the
//! verdict. [`run_driver`] is the per-run orchestration (§4.P steps 1-3):
//! it enumerates every unordered pair of completed attempts, finds or
//! creates the normalized [`engram_core::JudgePair`] row, and reuses an
//! existing [`engram_core::JudgeOutcome`] rather than re-invoking the LLM.

// ============================================================================
// SECTION: Imports
// ============================================================================

use engram_core::Attempt;
use engram_core::AttemptStatus;
use engram_core::ContentId;
use engram_core::EngramError;
use engram_core::JudgeOutcome;
use engram_core::JudgeOutcomeInputs;
use engram_core::JudgePair;
use engram_core::JudgePairInputs;
use engram_core::LlmClient;
use engram_core::LlmRequest;
use engram_providers::JudgePromptInput;
use engram_providers::Winner;
use engram_providers::judge::build_prompt;
use engram_providers::judge::parse_verdict;
use engram_store::Repository;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::narrative::NarrativeDiff;
use crate::narrative::diff;

/// Model/version configuration for a judge invocation.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// The LLM model identifier to record and request.
    pub model: String,
    /// The judge prompt template version (only `"v1"` is defined).
    pub prompt_version: String,
}

/// Invokes the comparative judge on a single pair (§4.O).
///
/// # Errors
/// Returns [`EngramError::InvalidInput`] for an unknown `prompt_version`,
/// or [`EngramError::External`] on an LLM transport or parse failure.
pub async fn judge_pair(
    client: &dyn LlmClient,
    left: &Attempt,
    left_steps: &[engram_core::AttemptStep],
    right: &Attempt,
    right_steps: &[engram_core::AttemptStep],
    config: &JudgeConfig,
) -> Result<JudgeVerdict, EngramError> {
    let narrative = diff(left, left_steps, right, right_steps);

    let content_hash = ContentId::derive(&json!({
        "leftAttemptId": left.id.as_str(),
        "rightAttemptId": right.id.as_str(),
        "promptVersion": config.prompt_version,
        "model": config.model,
    }))?;

    let prompt_input = JudgePromptInput {
        left_id: left.id.short().to_owned(),
        right_id: right.id.short().to_owned(),
        left_status: format!("{:?}", left.status),
        right_status: format!("{:?}", right.status),
        left_result: left.result.clone().unwrap_or(serde_json::Value::Null),
        right_result: right.result.clone().unwrap_or(serde_json::Value::Null),
        pros: narrative.pros.clone(),
        cons: narrative.cons.clone(),
        deltas: narrative.deltas.clone(),
    };
    let prompt = build_prompt(&config.prompt_version, &prompt_input)?;

    let completion = client
        .complete(&LlmRequest { prompt, model: config.model.clone(), temperature: 0.0 })
        .await
        .map_err(|err| EngramError::External(format!("judge LLM call failed: {err}")))?;
    let verdict = parse_verdict(&completion)?;

    let winner_attempt_id = match verdict.winner {
        Winner::A => left.id.clone(),
        Winner::B => right.id.clone(),
    };

    Ok(JudgeVerdict { winner_attempt_id, confidence: verdict.confidence, rationale: verdict.rationale, content_hash, narrative })
}

/// The outcome of a single pairwise judge invocation, before persistence.
#[derive(Debug, Clone)]
pub struct JudgeVerdict {
    /// The attempt the judge picked as the winner.
    pub winner_attempt_id: ContentId,
    /// The judge's stated confidence in `[0, 1]`.
    pub confidence: f64,
    /// The judge's rationale text.
    pub rationale: String,
    /// Content hash of the pair identity, model, and prompt version.
    pub content_hash: ContentId,
    /// The narrative diff the judge was shown.
    pub narrative: NarrativeDiff,
}

/// Runs the judge driver for a run (§4.P steps 1-3): enumerates every
/// unordered pair of completed attempts, finds or creates the pair row,
/// and reuses a cached outcome or invokes the judge.
///
/// # Errors
/// Returns [`EngramError::State`] if fewer than two attempts are
/// completed, or any error `judge_pair` or the repository raises.
pub async fn run_driver(repository: &Repository, client: &dyn LlmClient, run_id: &ContentId, config: &JudgeConfig) -> Result<Vec<JudgeOutcome>, EngramError> {
    let completed: Vec<Attempt> =
        repository.list_attempts(&engram_store::AttemptFilters { run_id: Some(run_id.clone()) })?.into_iter().filter(|attempt| attempt.status == AttemptStatus::Completed).collect();
    if completed.len() < 2 {
        return Err(EngramError::State(format!("run {} has fewer than two completed attempts", run_id.as_str())));
    }

    let mut outcomes = Vec::new();
    for i in 0..completed.len() {
        for j in (i + 1)..completed.len() {
            let (left_id, right_id) = JudgePair::normalize(completed[i].id.clone(), completed[j].id.clone());
            let pair = repository.add_judge_pair(JudgePairInputs {
                run_id: run_id.clone(),
                left_attempt_id: left_id.clone(),
                right_attempt_id: right_id.clone(),
                prompt_version: config.prompt_version.clone(),
            })?;

            if let Some(existing) = repository.get_judge_outcome_by_pair(&pair.id)? {
                outcomes.push(existing);
                continue;
            }

            let left = attempt_by_id(&completed, &left_id)?;
            let right = attempt_by_id(&completed, &right_id)?;
            let left_steps = repository.list_attempt_steps(&left.id)?;
            let right_steps = repository.list_attempt_steps(&right.id)?;

            let verdict = judge_pair(client, left, &left_steps, right, &right_steps, config).await?;
            let narrative_json = serde_json::to_value(NarrativeSummary::from(&verdict.narrative))
                .map_err(|err| EngramError::External(format!("failed to encode narrative diff: {err}")))?;

            let outcome = repository.add_judge_outcome(JudgeOutcomeInputs {
                pair_id: pair.id,
                winner_attempt_id: verdict.winner_attempt_id,
                confidence: verdict.confidence,
                rationale: verdict.rationale,
                narrative_diff: narrative_json,
                model: config.model.clone(),
            })?;
            info!(pair = %left_id.short(), "judge outcome recorded");
            outcomes.push(outcome);
        }
    }
    Ok(outcomes)
}

/// Finds an attempt by id within an already-loaded slice.
fn attempt_by_id<'a>(attempts: &'a [Attempt], id: &ContentId) -> Result<&'a Attempt, EngramError> {
    attempts.iter().find(|attempt| &attempt.id == id).ok_or_else(|| EngramError::NotFound(format!("attempt {} not found among completed attempts", id.as_str())))
}

/// A JSON-friendly projection of [`NarrativeDiff`] stored on the outcome.
#[derive(Debug, Serialize)]
struct NarrativeSummary {
    /// Bullet facts about the two attempts as a whole.
    deltas: Vec<String>,
    /// Facts favoring the left attempt.
    pros: Vec<String>,
    /// Facts favoring the right attempt.
    cons: Vec<String>,
    /// Human-readable paragraph summarizing the comparison.
    summary: String,
}

impl From<&NarrativeDiff> for NarrativeSummary {
    fn from(diff: &NarrativeDiff) -> Self {
        Self { deltas: diff.deltas.clone(), pros: diff.pros.clone(), cons: diff.cons.clone(), summary: diff.summary.clone() }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use engram_core::AttemptInputs;
    use engram_core::AttemptStepInputs;
    use engram_core::AttemptStepKind;
    use engram_core::RunInputs;
    use engram_core::TaskInputs;
    use engram_providers::StubLlmClient;
    use engram_store::AttemptPatch;
    use serde_json::Value;
    use tempfile::tempdir;

    use super::*;

    fn open_repository() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).unwrap();
        (dir, repository)
    }

    fn completed_attempt(repository: &Repository, run_id: &ContentId, ordinal: u32) -> Attempt {
        let attempt = repository.add_attempt(AttemptInputs { run_id: run_id.clone(), ordinal }).unwrap();
        repository.update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Running), result: None }).unwrap();
        repository
            .add_attempt_step(AttemptStepInputs {
                attempt_id: attempt.id.clone(),
                step_index: 0,
                kind: AttemptStepKind::LearnComplete,
                input: Value::Null,
                output: json!({"knowledgeItems": []}),
                observation: String::new(),
            })
            .unwrap();
        repository.update_attempt(&attempt.id, AttemptPatch { status: Some(AttemptStatus::Completed), result: Some(json!({"ok": true})) }).unwrap()
    }

    #[tokio::test]
    async fn run_driver_requires_at_least_two_completed_attempts() {
        let (_dir, repository) = open_repository();
        let task = repository.add_task(TaskInputs { subject_id: None, spec: json!({"goal": "fix it"}) }).unwrap();
        let run = repository.add_run(RunInputs { task_id: task.id, n: 3, seed: 1, config: Value::Null }).unwrap();
        completed_attempt(&repository, &run.id, 0);

        let client = StubLlmClient::prefer_left();
        let config = JudgeConfig { model: "test-model".to_owned(), prompt_version: "v1".to_owned() };
        let err = run_driver(&repository, &client, &run.id, &config).await.unwrap_err();
        assert!(matches!(err, EngramError::State(_)));
    }

    #[tokio::test]
    async fn run_driver_caches_outcomes_across_repeated_calls() {
        let (_dir, repository) = open_repository();
        let task = repository.add_task(TaskInputs { subject_id: None, spec: json!({"goal": "fix it"}) }).unwrap();
        let run = repository.add_run(RunInputs { task_id: task.id, n: 3, seed: 1, config: Value::Null }).unwrap();
        completed_attempt(&repository, &run.id, 0);
        completed_attempt(&repository, &run.id, 1);

        let client = StubLlmClient::prefer_left();
        let config = JudgeConfig { model: "test-model".to_owned(), prompt_version: "v1".to_owned() };
        let first = run_driver(&repository, &client, &run.id, &config).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = run_driver(&repository, &client, &run.id, &config).await.unwrap();
        assert_eq!(first[0].id, second[0].id);
    }
}
