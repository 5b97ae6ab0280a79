// engram-store/src/repository/judge.rs
// ============================================================================
// Module: Judge Repository
// Description: add/get/list for JudgePair, add/get for JudgeOutcome.
// Purpose: Back the comparative judge driver's cache-or-invoke loop (§4.O,
// §4.P).
// Dependencies: rusqlite, engram-core, super
// ============================================================================

use engram_core::ContentId;
use engram_core::EngramError;
use engram_core::JudgeOutcome;
use engram_core::JudgeOutcomeInputs;
use engram_core::JudgePair;
use engram_core::JudgePairInputs;
use engram_core::Timestamp;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use super::Repository;
use super::encode_json;
use super::lock;

type JudgePairRow = (String, String, String, String, String, String);

fn row_to_judge_pair(row: &Row<'_>) -> rusqlite::Result<JudgePairRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn build_judge_pair(raw: JudgePairRow) -> Result<JudgePair, EngramError> {
    let (id, run_id, left_attempt_id, right_attempt_id, prompt_version, created_at) = raw;
    Ok(JudgePair {
        id: id.try_into()?,
        run_id: run_id.try_into()?,
        left_attempt_id: left_attempt_id.try_into()?,
        right_attempt_id: right_attempt_id.try_into()?,
        prompt_version,
        created_at: Timestamp::parse(&created_at)?,
    })
}

const JUDGE_PAIR_COLUMNS: &str = "id, run_id, left_attempt_id, right_attempt_id, prompt_version, created_at";

type JudgeOutcomeRow = (String, String, String, f64, String, String, String, String);

fn row_to_judge_outcome(row: &Row<'_>) -> rusqlite::Result<JudgeOutcomeRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?))
}

fn build_judge_outcome(raw: JudgeOutcomeRow) -> Result<JudgeOutcome, EngramError> {
    let (id, pair_id, winner_attempt_id, confidence, rationale, narrative_diff_json, model, created_at) = raw;
    Ok(JudgeOutcome {
        id: id.try_into()?,
        pair_id: pair_id.try_into()?,
        winner_attempt_id: winner_attempt_id.try_into()?,
        confidence,
        rationale,
        narrative_diff: serde_json::from_str(&narrative_diff_json)
            .map_err(|err| EngramError::External(format!("failed to decode narrative diff: {err}")))?,
        model,
        created_at: Timestamp::parse(&created_at)?,
    })
}

const JUDGE_OUTCOME_COLUMNS: &str = "id, pair_id, winner_attempt_id, confidence, rationale, narrative_diff_json, model, created_at";

/// Optional narrowing applied by [`Repository::list_judge_outcomes_for_run`].
#[derive(Debug, Clone, Default)]
pub struct JudgeOutcomeFilters {
    /// Restrict to outcomes whose pair belongs to this run.
    pub run_id: Option<ContentId>,
}

impl Repository {
    /// Inserts a judge pair if it does not already exist, returning the
    /// stored row either way. Callers must have already normalized
    /// `left`/`right` via [`JudgePair::normalize`].
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn add_judge_pair(&self, inputs: JudgePairInputs) -> Result<JudgePair, EngramError> {
        let id = JudgePair::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        tx.execute(
            &format!("INSERT OR IGNORE INTO judge_pairs ({JUDGE_PAIR_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                id.as_str(),
                inputs.run_id.as_str(),
                inputs.left_attempt_id.as_str(),
                inputs.right_attempt_id.as_str(),
                inputs.prompt_version,
                Timestamp::now().to_rfc3339(),
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to insert judge pair: {err}")))?;
        let raw = tx
            .query_row(&format!("SELECT {JUDGE_PAIR_COLUMNS} FROM judge_pairs WHERE id = ?1"), params![id.as_str()], row_to_judge_pair)
            .map_err(|err| EngramError::External(format!("failed to read back judge pair: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let pair = build_judge_pair(raw)?;
        self.record_audit("judge_pair.add", serde_json::to_value(&pair).unwrap_or_default())?;
        Ok(pair)
    }

    /// Fetches a judge pair by id.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_judge_pair(&self, id: &ContentId) -> Result<Option<JudgePair>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .query_row(&format!("SELECT {JUDGE_PAIR_COLUMNS} FROM judge_pairs WHERE id = ?1"), params![id.as_str()], row_to_judge_pair)
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read judge pair: {err}")))?
            .map(build_judge_pair)
            .transpose()
    }

    /// Lists every judge pair belonging to a run.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_judge_pairs(&self, run_id: &ContentId) -> Result<Vec<JudgePair>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(&format!("SELECT {JUDGE_PAIR_COLUMNS} FROM judge_pairs WHERE run_id = ?1 ORDER BY created_at ASC"))
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![run_id.as_str()], row_to_judge_pair)
            .map_err(|err| EngramError::External(format!("failed to list judge pairs: {err}")))?;
        rows.map(|row| build_judge_pair(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?)).collect()
    }

    /// Inserts a judge outcome if one does not already exist for its pair,
    /// returning the stored row either way. At most one outcome exists per
    /// pair; the `pair_id UNIQUE` constraint enforces this even under
    /// concurrent writers.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error, or
    /// [`EngramError::Validation`] if the derived outcome fails validation.
    pub fn add_judge_outcome(&self, inputs: JudgeOutcomeInputs) -> Result<JudgeOutcome, EngramError> {
        let id = JudgeOutcome::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        tx.execute(
            "INSERT OR IGNORE INTO judge_outcomes (id, pair_id, winner_attempt_id, confidence, rationale, narrative_diff_json, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.as_str(),
                inputs.pair_id.as_str(),
                inputs.winner_attempt_id.as_str(),
                inputs.confidence,
                inputs.rationale,
                encode_json(&inputs.narrative_diff)?,
                inputs.model,
                Timestamp::now().to_rfc3339(),
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to insert judge outcome: {err}")))?;
        let raw = tx
            .query_row(
                &format!("SELECT {JUDGE_OUTCOME_COLUMNS} FROM judge_outcomes WHERE pair_id = ?1"),
                params![inputs.pair_id.as_str()],
                row_to_judge_outcome,
            )
            .map_err(|err| EngramError::External(format!("failed to read back judge outcome: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let outcome = build_judge_outcome(raw)?;
        outcome.validate()?;
        self.record_audit("judge_outcome.add", serde_json::to_value(&outcome).unwrap_or_default())?;
        Ok(outcome)
    }

    /// Fetches the outcome for a pair, if the judge has already run on it.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_judge_outcome_by_pair(&self, pair_id: &ContentId) -> Result<Option<JudgeOutcome>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .query_row(
                &format!("SELECT {JUDGE_OUTCOME_COLUMNS} FROM judge_outcomes WHERE pair_id = ?1"),
                params![pair_id.as_str()],
                row_to_judge_outcome,
            )
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read judge outcome: {err}")))?
            .map(build_judge_outcome)
            .transpose()
    }

    /// Lists every judge outcome whose pair belongs to a run.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_judge_outcomes_for_run(&self, filters: &JudgeOutcomeFilters) -> Result<Vec<JudgeOutcome>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT o.id, o.pair_id, o.winner_attempt_id, o.confidence, o.rationale, o.narrative_diff_json, o.model, o.created_at
                 FROM judge_outcomes o
                 JOIN judge_pairs p ON p.id = o.pair_id
                 WHERE (?1 IS NULL OR p.run_id = ?1)
                 ORDER BY o.created_at ASC"
            ))
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![filters.run_id.as_ref().map(ContentId::as_str)], row_to_judge_outcome)
            .map_err(|err| EngramError::External(format!("failed to list judge outcomes: {err}")))?;
        rows.map(|row| build_judge_outcome(row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?))
            .collect()
    }
}
