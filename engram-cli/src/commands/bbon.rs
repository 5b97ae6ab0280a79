// engram-cli/src/commands/bbon.rs
// ============================================================================
// Module: bBoN Verb Commands
// Description: run, judge, adopt.
// Purpose: Wire the CLI's `bbon` argument surface onto `engram-bbon`.
// Dependencies: engram-core, engram-store, engram-bbon
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use engram_bbon::adopt as adopt_mod;
use engram_bbon::judge;
use engram_bbon::run as run_mod;
use engram_core::ContentId;
use engram_core::LlmClient;
use engram_core::TaskSpec;
use engram_store::Repository;
use serde_json::Value;
use serde_json::json;

use crate::BbonAdoptArgs;
use crate::BbonJudgeArgs;
use crate::BbonRunArgs;
use crate::config::EngramConfig;
use crate::error::CliError;

// ============================================================================
// SECTION: Run
// ============================================================================

/// Builds a [`TaskSpec`] from `args` and drives the bBoN fan-out.
pub fn run(repository: &Repository, document_path: &Path, project_id: &str, args: BbonRunArgs) -> Result<Value, CliError> {
    let context = match args.context_file {
        Some(path) => {
            let text = fs::read_to_string(&path).map_err(|err| CliError::Config(format!("failed to read {}: {err}", path.display())))?;
            let value: Value = serde_json::from_str(&text).map_err(|err| CliError::Config(format!("{} is not valid JSON: {err}", path.display())))?;
            Some(value)
        }
        None => None,
    };
    let spec = TaskSpec { goal: args.goal, subject_id: args.subject_id, constraints: args.constraints, context };

    let request = run_mod::RunRequest { spec, n: args.n, seed: args.seed, config: Value::Null };
    let summary = run_mod::run(repository, document_path, project_id, args.tau, request)?;

    let attempts: Vec<Value> = summary
        .attempts
        .into_iter()
        .map(|outcome| {
            json!({
                "attempt": outcome.attempt,
                "learned": outcome.learn_result.is_some(),
            })
        })
        .collect();

    Ok(json!({
        "taskId": summary.task_id,
        "runId": summary.run_id,
        "attempts": attempts,
    }))
}

// ============================================================================
// SECTION: Judge
// ============================================================================

/// Invokes the comparative judge across every pair of completed attempts
/// in a run. Resolves `args.model` from `config.llm.judgeModel` when the
/// caller omits `--model`.
pub async fn judge(repository: &Repository, client: &dyn LlmClient, config: &EngramConfig, args: BbonJudgeArgs) -> Result<Value, CliError> {
    let run_id = ContentId::parse(&args.run_id)?;
    let model = args
        .model
        .or_else(|| config.llm.judge_model.clone())
        .ok_or_else(|| CliError::Config("no judge model given: pass --model or set llm.judgeModel in the config file".to_owned()))?;

    let judge_config = judge::JudgeConfig { model, prompt_version: args.prompt_version };
    let outcomes = judge::run_driver(repository, client, &run_id, &judge_config).await?;

    Ok(json!({"runId": run_id, "outcomes": outcomes}))
}

// ============================================================================
// SECTION: Adopt
// ============================================================================

/// Ranks a run's attempts by judge outcomes and applies the winner.
pub fn adopt(repository: &Repository, document_path: &Path, project_id: &str, args: BbonAdoptArgs) -> Result<Value, CliError> {
    let run_id = ContentId::parse(&args.run_id)?;
    let result = adopt_mod::adopt(repository, document_path, project_id, &run_id)?;

    Ok(json!({
        "runId": result.run_id,
        "winnerAttemptId": result.winner_attempt_id,
        "winnerScore": result.winner_score,
        "knowledgeApplied": result.knowledge_applied,
        "rendered": {
            "knowledgeItemCount": result.rendered.knowledge_item_count,
            "workingMemoryCount": result.rendered.working_memory_count,
            "rendered": result.rendered.rendered,
        },
    }))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use engram_providers::StubLlmClient;
    use tempfile::tempdir;

    use super::*;

    fn open_repository() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).unwrap();
        (dir, repository)
    }

    fn seed_document(dir: &std::path::Path) -> std::path::PathBuf {
        let document_path = dir.join("AGENTS.md");
        fs::write(&document_path, format!("{}\n{}\n", engram_learn::apply::BEGIN_MARKER, engram_learn::apply::END_MARKER)).unwrap();
        document_path
    }

    #[test]
    fn run_rejects_an_empty_goal() {
        let (dir, repository) = open_repository();
        let document_path = seed_document(dir.path());
        let args = BbonRunArgs { goal: String::new(), subject_id: None, constraints: vec![], context_file: None, n: Some(1), seed: Some(1), tau: 0.8 };
        let err = run(&repository, &document_path, "engram", args).unwrap_err();
        assert_eq!(err.tag(), "ValidationError");
    }

    #[tokio::test]
    async fn judge_requires_a_model_when_none_is_configured() {
        let (dir, repository) = open_repository();
        let document_path = seed_document(dir.path());
        let run_args = BbonRunArgs { goal: "fix the bug".to_owned(), subject_id: None, constraints: vec![], context_file: None, n: Some(2), seed: Some(1), tau: 0.8 };
        let data = run(&repository, &document_path, "engram", run_args).unwrap();
        let run_id = data["runId"].as_str().unwrap().to_owned();

        let client = StubLlmClient::prefer_left();
        let config = EngramConfig::default();
        let judge_args = BbonJudgeArgs { run_id, model: None, prompt_version: "v1".to_owned() };
        let err = judge(&repository, &client, &config, judge_args).await.unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[tokio::test]
    async fn run_judge_adopt_cycle_picks_a_winner() {
        let (dir, repository) = open_repository();
        let document_path = seed_document(dir.path());
        let run_args = BbonRunArgs { goal: "fix the bug".to_owned(), subject_id: None, constraints: vec![], context_file: None, n: Some(2), seed: Some(1), tau: 0.8 };
        let data = run(&repository, &document_path, "engram", run_args).unwrap();
        let run_id = data["runId"].as_str().unwrap().to_owned();

        let client = StubLlmClient::prefer_left();
        let mut config = EngramConfig::default();
        config.llm.judge_model = Some("test-model".to_owned());
        let judge_args = BbonJudgeArgs { run_id: run_id.clone(), model: None, prompt_version: "v1".to_owned() };
        let judged = judge(&repository, &client, &config, judge_args).await.unwrap();
        assert!(judged["outcomes"].as_array().unwrap().len() >= 1);

        let adopt_args = BbonAdoptArgs { run_id };
        let adopted = adopt(&repository, &document_path, "engram", adopt_args).unwrap();
        assert!(adopted["winnerAttemptId"].is_string());
    }
}
