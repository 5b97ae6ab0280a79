// engram-learn/src/apply.rs
// ============================================================================
// Module: Apply / Renderer
// Description: Renders the current KnowledgeItem and WorkingMemory sets
// into a delimited region of a project's guidance document.
// Purpose: Keep the document's LEARNED_PATTERNS region in sync with the
// store without disturbing anything outside it.
// Dependencies: engram-core, engram-store, std::fmt::Write
// ============================================================================

//! ## Overview
//! The guidance document is exclusively owned, between its markers, by
//! this renderer. Everything outside the marker pair is preserved
//! byte-for-byte; the file is only rewritten if the composed region
//! actually differs from what is already there.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use engram_core::EngramError;
use engram_core::KnowledgeItem;
use engram_core::KnowledgeKind;
use engram_core::WorkingMemory;
use engram_core::WorkingMemoryType;
use engram_store::KnowledgeItemFilters;
use engram_store::Repository;
use engram_store::WorkingMemoryFilters;

/// Opening marker of the rendered region.
pub const BEGIN_MARKER: &str = "<!-- BEGIN: LEARNED_PATTERNS -->";
/// Closing marker of the rendered region.
pub const END_MARKER: &str = "<!-- END: LEARNED_PATTERNS -->";

/// Outcome of one Apply run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyResult {
    /// Count of knowledge items rendered.
    pub knowledge_item_count: usize,
    /// Count of working memory notes rendered.
    pub working_memory_count: usize,
    /// Whether the document's bytes actually changed.
    pub rendered: bool,
}

/// Renders the current knowledge and working-memory sets into
/// `document_path`'s `LEARNED_PATTERNS` region, for `project_id`.
///
/// # Errors
/// Returns [`EngramError::State`] if the document is missing either
/// marker or the markers are out of order, or [`EngramError::External`]
/// on an I/O or store error.
pub fn apply(repository: &Repository, document_path: &Path, project_id: &str) -> Result<ApplyResult, EngramError> {
    let mut knowledge_items: Vec<KnowledgeItem> = repository
        .list_knowledge_items(&KnowledgeItemFilters::default())?
        .into_iter()
        .filter(|item| item.confidence >= KnowledgeItem::apply_threshold())
        .collect();
    knowledge_items.sort_by(|a, b| {
        b.helpful.cmp(&a.helpful).then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)).then_with(|| a.text.cmp(&b.text))
    });

    let working_memory = repository.list_working_memory(&WorkingMemoryFilters { project_id: Some(project_id.to_owned()) })?;

    let document = fs::read_to_string(document_path)
        .map_err(|err| EngramError::External(format!("failed to read guidance document {}: {err}", document_path.display())))?;
    let (begin, end) = locate_markers(&document)?;

    let region = render_region(&knowledge_items, &working_memory);
    let mut rewritten = String::with_capacity(document.len() + region.len());
    rewritten.push_str(&document[..begin]);
    rewritten.push_str(BEGIN_MARKER);
    rewritten.push('\n');
    rewritten.push_str(&region);
    rewritten.push_str(END_MARKER);
    rewritten.push_str(&document[end + END_MARKER.len()..]);

    let rendered = rewritten != document;
    if rendered {
        fs::write(document_path, &rewritten)
            .map_err(|err| EngramError::External(format!("failed to write guidance document {}: {err}", document_path.display())))?;
    }

    Ok(ApplyResult { knowledge_item_count: knowledge_items.len(), working_memory_count: working_memory.len(), rendered })
}

/// Finds the byte offsets of `BEGIN_MARKER` and `END_MARKER` in `document`.
///
/// # Errors
/// Returns [`EngramError::State`] if either marker is missing or the
/// end marker precedes the begin marker.
fn locate_markers(document: &str) -> Result<(usize, usize), EngramError> {
    let begin = document
        .find(BEGIN_MARKER)
        .ok_or_else(|| EngramError::State("guidance document is missing the LEARNED_PATTERNS begin marker".to_owned()))?;
    let end = document
        .find(END_MARKER)
        .ok_or_else(|| EngramError::State("guidance document is missing the LEARNED_PATTERNS end marker".to_owned()))?;
    if end < begin {
        return Err(EngramError::State("guidance document's LEARNED_PATTERNS end marker precedes its begin marker".to_owned()));
    }
    Ok((begin, end))
}

/// Composes the region between (but not including) the markers.
fn render_region(knowledge_items: &[KnowledgeItem], working_memory: &[WorkingMemory]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Learned Patterns\n");

    render_knowledge_subsection(&mut out, "Patterns", knowledge_items, KnowledgeKind::Pattern);
    render_knowledge_subsection(&mut out, "Facts", knowledge_items, KnowledgeKind::Fact);
    render_knowledge_subsection(&mut out, "Procedures", knowledge_items, KnowledgeKind::Procedure);
    render_knowledge_subsection(&mut out, "Decisions", knowledge_items, KnowledgeKind::Decision);

    let has_working_memory = !working_memory.is_empty();
    if has_working_memory {
        let _ = writeln!(out, "### Working Memory\n");
        render_working_subsection(&mut out, "Summaries", working_memory, WorkingMemoryType::Summary);
        render_working_subsection(&mut out, "Invariants", working_memory, WorkingMemoryType::Invariant);
        render_working_subsection(&mut out, "Decisions", working_memory, WorkingMemoryType::Decision);
    }
    out
}

fn render_knowledge_subsection(out: &mut String, heading: &str, items: &[KnowledgeItem], kind: KnowledgeKind) {
    let matching: Vec<&KnowledgeItem> = items.iter().filter(|item| item.kind == kind).collect();
    if matching.is_empty() {
        return;
    }
    let _ = writeln!(out, "#### {heading}\n");
    for item in matching {
        let _ = writeln!(out, "[#{}][{}] {}\n", item.id.short(), feedback_badge(item.helpful, item.harmful), item.text);
    }
}

fn render_working_subsection(out: &mut String, heading: &str, notes: &[WorkingMemory], kind: WorkingMemoryType) {
    let matching: Vec<&WorkingMemory> = notes.iter().filter(|note| note.memory_type == kind).collect();
    if matching.is_empty() {
        return;
    }
    let _ = writeln!(out, "##### {heading}\n");
    for note in matching {
        let _ = writeln!(out, "[#{}] {}\n", note.id.short(), note.content_text);
    }
}

/// `+h` and/or `-a` shown only when the respective counter is positive.
fn feedback_badge(helpful: u32, harmful: u32) -> String {
    let mut badge = String::new();
    if helpful > 0 {
        let _ = write!(badge, "+{helpful}");
    }
    if harmful > 0 {
        let _ = write!(badge, "-{harmful}");
    }
    badge
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use engram_core::KnowledgeItemInputs;
    use engram_core::WorkingMemoryInputs;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn open_repository() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repository = Repository::open(dir.path().join("engram.db"), dir.path().join("audit.ndjson")).unwrap();
        (dir, repository)
    }

    fn write_document(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("AGENTS.md");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn apply_fails_with_state_error_when_markers_are_missing() {
        let (dir, repository) = open_repository();
        let path = write_document(dir.path(), "# Guidance\n\nno markers here\n");
        let err = apply(&repository, &path, "engram").unwrap_err();
        assert!(matches!(err, EngramError::State(_)));
    }

    #[test]
    fn apply_fails_with_state_error_when_markers_are_out_of_order() {
        let (dir, repository) = open_repository();
        let body = format!("{END_MARKER}\n{BEGIN_MARKER}\n");
        let path = write_document(dir.path(), &body);
        let err = apply(&repository, &path, "engram").unwrap_err();
        assert!(matches!(err, EngramError::State(_)));
    }

    #[test]
    fn apply_renders_knowledge_items_and_preserves_surrounding_bytes() {
        let (dir, repository) = open_repository();
        repository
            .add_knowledge_item(
                KnowledgeItemInputs { kind: KnowledgeKind::Pattern, text: "avoid implicit any".to_owned(), scope: "repo".to_owned(), module: None },
                0.9,
                vec!["tsc".to_owned()],
            )
            .unwrap();
        let body = format!("# Guidance\n\nBefore.\n\n{BEGIN_MARKER}\nstale\n{END_MARKER}\n\nAfter.\n");
        let path = write_document(dir.path(), &body);

        let result = apply(&repository, &path, "engram").unwrap();
        assert_eq!(result.knowledge_item_count, 1);
        assert!(result.rendered);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.starts_with("# Guidance\n\nBefore.\n\n"));
        assert!(rewritten.ends_with("\nAfter.\n"));
        assert!(rewritten.contains("avoid implicit any"));
        assert!(!rewritten.contains("stale"));
    }

    #[test]
    fn apply_excludes_low_confidence_items() {
        let (dir, repository) = open_repository();
        repository
            .add_knowledge_item(
                KnowledgeItemInputs { kind: KnowledgeKind::Fact, text: "low confidence fact".to_owned(), scope: "repo".to_owned(), module: None },
                0.1,
                vec![],
            )
            .unwrap();
        let body = format!("{BEGIN_MARKER}\n{END_MARKER}\n");
        let path = write_document(dir.path(), &body);

        let result = apply(&repository, &path, "engram").unwrap();
        assert_eq!(result.knowledge_item_count, 0);
    }

    #[test]
    fn apply_is_idempotent_once_rendered() {
        let (dir, repository) = open_repository();
        repository
            .upsert_working_memory(
                WorkingMemoryInputs {
                    project_id: "engram".to_owned(),
                    memory_type: WorkingMemoryType::Invariant,
                    content_text: "migrations are additive-only".to_owned(),
                },
                json!({}),
            )
            .unwrap();
        let body = format!("{BEGIN_MARKER}\n{END_MARKER}\n");
        let path = write_document(dir.path(), &body);

        let first = apply(&repository, &path, "engram").unwrap();
        assert!(first.rendered);
        let second = apply(&repository, &path, "engram").unwrap();
        assert!(!second.rendered);
    }

    #[test]
    fn feedback_badge_only_shows_positive_counters() {
        assert_eq!(feedback_badge(0, 0), "");
        assert_eq!(feedback_badge(3, 0), "+3");
        assert_eq!(feedback_badge(0, 2), "-2");
        assert_eq!(feedback_badge(3, 2), "+3-2");
    }
}
