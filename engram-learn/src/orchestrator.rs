// engram-learn/src/orchestrator.rs
// ============================================================================
// Module: Learn Orchestrator
// Description: Composes preflight, Reflect, Curate, and Apply into the
// single `learn` verb.
// Purpose: Give callers one entry point for the full learning cycle.
// Dependencies: engram-core, engram-store
// ============================================================================

//! ## Overview
//! Preflight checks the database and guidance document exist and the
//! document carries both markers in the correct order, then runs Reflect,
//! Curate, and Apply in sequence. Any step's failure is wrapped with that
//! step's name (`EngramError::wrap_step`) and re-raised; earlier steps'
//! side effects are not rolled back, since every step is independently
//! idempotent and safe to rerun.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use engram_core::EngramError;
use engram_store::Repository;

use crate::apply;
use crate::apply::ApplyResult;
use crate::curate;
use crate::curate::CurateResult;
use crate::reflect;

/// Outcome of one full learning cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnResult {
    /// Count of insights created by Reflect.
    pub insights_created: usize,
    /// Curate's outcome.
    pub curate: CurateResult,
    /// Apply's outcome.
    pub apply: ApplyResult,
}

/// Runs the full learning cycle: preflight, Reflect, Curate, Apply.
///
/// # Errors
/// Returns [`EngramError::State`] (wrapped as `"preflight step failed"`)
/// if the guidance document is missing or lacks correctly-ordered
/// markers. Returns any other step's error wrapped with that step's name.
pub fn learn(repository: &Repository, document_path: &Path, project_id: &str, tau: f64) -> Result<LearnResult, EngramError> {
    preflight(document_path).map_err(|err| err.wrap_step("preflight"))?;

    let insights = reflect::reflect(repository).map_err(|err| err.wrap_step("reflect"))?;
    let curate_result = curate::curate(repository, tau).map_err(|err| err.wrap_step("curate"))?;
    let apply_result = apply::apply(repository, document_path, project_id).map_err(|err| err.wrap_step("apply"))?;

    Ok(LearnResult { insights_created: insights.len(), curate: curate_result, apply: apply_result })
}

/// Verifies the guidance document exists and contains both markers in the
/// correct order, without rendering anything.
fn preflight(document_path: &Path) -> Result<(), EngramError> {
    let document = std::fs::read_to_string(document_path)
        .map_err(|err| EngramError::State(format!("guidance document {} is unreadable: {err}", document_path.display())))?;
    let begin = document.find(apply::BEGIN_MARKER).ok_or_else(|| EngramError::State("guidance document is missing the begin marker".to_owned()))?;
    let end = document.find(apply::END_MARKER).ok_or_else(|| EngramError::State("guidance document is missing the end marker".to_owned()))?;
    if end < begin {
        return Err(EngramError::State("guidance document's markers are out of order".to_owned()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
