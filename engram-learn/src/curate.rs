// engram-learn/src/curate.rs
// ============================================================================
// Module: Curate
// Description: Promotes high-confidence insights into durable knowledge
// items.
// Purpose: Consume Reflect's output, collapsing duplicates and promoting
// the representative of each `(pattern, description)` group.
// Dependencies: engram-core, engram-store
// ============================================================================

//! ## Overview
//! Curate operates on every insight with `confidence >= tau` (default
//! 0.8). Because an [`Insight`](engram_core::Insight)'s id already covers
//! `(pattern, description)` alone, the store can never hold two distinct
//! rows for the same group — the dedup step below is the general
//! algorithm, applied faithfully, even though in this content-addressed
//! store a group larger than one insight cannot occur today.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use engram_core::EngramError;
use engram_core::KnowledgeItemInputs;
use engram_core::KnowledgeKind;
use engram_store::KnowledgeItemFilters;
use engram_store::Repository;

/// Outcome of one Curate run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurateResult {
    /// Ids of newly promoted [`engram_core::KnowledgeItem`]s.
    pub promoted: Vec<String>,
    /// Count of duplicate insights collapsed (`group_size - 1` per group).
    pub deduplicated: u32,
}

/// Promotes every insight with `confidence >= tau` into a `pattern`-kind
/// [`engram_core::KnowledgeItem`], deduplicating within `(pattern,
/// description)` groups first.
///
/// # Errors
/// Returns [`EngramError::InvalidInput`] if `tau` is non-finite or outside
/// `[0.0, 1.0]`, or [`EngramError::External`] on a store error.
pub fn curate(repository: &Repository, tau: f64) -> Result<CurateResult, EngramError> {
    if !tau.is_finite() || !(0.0..=1.0).contains(&tau) {
        return Err(EngramError::InvalidInput("tau must be a finite number within [0.0, 1.0]".to_owned()));
    }

    let eligible = repository.list_insights()?.into_iter().filter(|insight| insight.confidence >= tau);

    let mut groups: BTreeMap<(String, String), Vec<engram_core::Insight>> = BTreeMap::new();
    for insight in eligible {
        groups.entry((insight.pattern.clone(), insight.description.clone())).or_default().push(insight);
    }

    let mut result = CurateResult::default();
    for ((_, description), mut members) in groups {
        members.sort_by(|a, b| a.created_at.to_rfc3339().cmp(&b.created_at.to_rfc3339()));
        result.deduplicated += (members.len() as u32).saturating_sub(1);
        let representative = members.remove(0);
        for duplicate in &members {
            repository.delete_insight(&duplicate.id)?;
        }

        let already_known = repository
            .list_knowledge_items(&KnowledgeItemFilters::default())?
            .iter()
            .any(|item| item.kind == KnowledgeKind::Pattern && item.text == description);
        if !already_known {
            let item = repository.add_knowledge_item(
                KnowledgeItemInputs { kind: KnowledgeKind::Pattern, text: description, scope: "repo".to_owned(), module: None },
                representative.confidence,
                representative.meta_tags.clone(),
            )?;
            result.promoted.push(item.id.as_str().to_owned());
        }

        repository.delete_insight(&representative.id)?;
    }
    Ok(result)
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
    fn curate_rejects_tau_out_of_range() {
        let (_dir, repository) = open_repository();
        assert!(matches!(curate(&repository, 1.5).unwrap_err(), EngramError::InvalidInput(_)));
        assert!(matches!(curate(&repository, f64::NAN).unwrap_err(), EngramError::InvalidInput(_)));
    }

    #[test]
    fn curate_promotes_a_high_confidence_insight_and_deletes_it() {
        let (_dir, repository) = open_repository();
        repository
            .add_insight(
                InsightInputs {
                    pattern: "tsc error in src/test.ts".to_owned(),
                    description: "Property does not exist on type".to_owned(),
                },
                0.9,
                3,
                vec!["tsc".to_owned(), "error-pattern".to_owned()],
                vec![],
            )
            .unwrap();

        let result = curate(&repository, 0.8).unwrap();
        assert_eq!(result.promoted.len(), 1);
        assert_eq!(result.deduplicated, 0);
        assert!(repository.list_insights().unwrap().is_empty());
        assert_eq!(repository.list_knowledge_items(&KnowledgeItemFilters::default()).unwrap().len(), 1);
    }

    #[test]
    fn curate_leaves_low_confidence_insights_alone() {
        let (_dir, repository) = open_repository();
        repository
            .add_insight(
                InsightInputs { pattern: "p".to_owned(), description: "d".to_owned() },
                0.5,
                1,
                vec![],
                vec![],
            )
            .unwrap();

        let result = curate(&repository, 0.8).unwrap();
        assert!(result.promoted.is_empty());
        assert_eq!(repository.list_insights().unwrap().len(), 1);
    }

    #[test]
    fn curate_does_not_duplicate_an_already_known_fact() {
        let (_dir, repository) = open_repository();
        repository
            .add_knowledge_item(
                KnowledgeItemInputs {
                    kind: KnowledgeKind::Pattern,
                    text: "Property does not exist on type".to_owned(),
                    scope: "repo".to_owned(),
                    module: None,
                },
                0.9,
                vec![],
            )
            .unwrap();
        repository
            .add_insight(
                InsightInputs {
                    pattern: "tsc error in src/test.ts".to_owned(),
                    description: "Property does not exist on type".to_owned(),
                },
                0.9,
                1,
                vec![],
                vec![],
            )
            .unwrap();

        let result = curate(&repository, 0.8).unwrap();
        assert!(result.promoted.is_empty());
        assert_eq!(repository.list_knowledge_items(&KnowledgeItemFilters::default()).unwrap().len(), 1);
    }
}
