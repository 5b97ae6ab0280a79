// engram-store/src/repository/knowledge.rs
// ============================================================================
// Module: Knowledge Repository
// Description: add/get/list for KnowledgeItem and Insight, plus the
// incremental feedback mutator.
// Purpose: Back curation and the feedback loop described in §4.E and §4.I.
// Dependencies: rusqlite, engram-core, super
// ============================================================================

use engram_core::EngramError;
use engram_core::Insight;
use engram_core::InsightInputs;
use engram_core::KnowledgeItem;
use engram_core::KnowledgeItemInputs;
use engram_core::KnowledgeKind;
use engram_core::Timestamp;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde_json::json;

use super::Repository;
use super::encode_json;
use super::lock;

/// Optional narrowing applied by [`Repository::list_knowledge_items`].
#[derive(Debug, Clone, Default)]
pub struct KnowledgeItemFilters {
    /// Restrict to items with this scope.
    pub scope: Option<String>,
    /// Restrict to items with this module.
    pub module: Option<String>,
}

fn knowledge_kind_label(kind: KnowledgeKind) -> &'static str {
    match kind {
        KnowledgeKind::Fact => "fact",
        KnowledgeKind::Pattern => "pattern",
        KnowledgeKind::Procedure => "procedure",
        KnowledgeKind::Decision => "decision",
    }
}

fn parse_knowledge_kind(label: &str) -> Result<KnowledgeKind, EngramError> {
    match label {
        "fact" => Ok(KnowledgeKind::Fact),
        "pattern" => Ok(KnowledgeKind::Pattern),
        "procedure" => Ok(KnowledgeKind::Procedure),
        "decision" => Ok(KnowledgeKind::Decision),
        other => Err(EngramError::External(format!("unknown knowledge_items.kind: {other}"))),
    }
}

fn row_to_knowledge_item(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, Option<String>, String, f64, u32, u32, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn build_knowledge_item(
    raw: (String, String, String, String, Option<String>, String, f64, u32, u32, String, String),
) -> Result<KnowledgeItem, EngramError> {
    let (id, kind, text, scope, module, meta_tags_json, confidence, helpful, harmful, created_at, updated_at) = raw;
    Ok(KnowledgeItem {
        id: id.try_into()?,
        kind: parse_knowledge_kind(&kind)?,
        text,
        scope,
        module,
        meta_tags: serde_json::from_str(&meta_tags_json)
            .map_err(|err| EngramError::External(format!("failed to decode meta_tags: {err}")))?,
        confidence,
        helpful,
        harmful,
        created_at: Timestamp::parse(&created_at)?,
        updated_at: Timestamp::parse(&updated_at)?,
    })
}

impl Repository {
    /// Inserts a knowledge item if it does not already exist, returning the
    /// stored row either way. Since a knowledge item's id covers `(kind,
    /// text, scope, module)` only, a second call against the same fact is
    /// a no-op that returns the original `confidence`/`meta_tags` rather
    /// than the newly supplied ones.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error, or
    /// [`EngramError::Validation`] if the derived item fails validation.
    pub fn add_knowledge_item(
        &self,
        inputs: KnowledgeItemInputs,
        confidence: f64,
        meta_tags: Vec<String>,
    ) -> Result<KnowledgeItem, EngramError> {
        let id = KnowledgeItem::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        let now = Timestamp::now();
        tx.execute(
            "INSERT OR IGNORE INTO knowledge_items
                (id, kind, text, scope, module, meta_tags_json, confidence, helpful, harmful, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8, ?8)",
            params![
                id.as_str(),
                knowledge_kind_label(inputs.kind),
                inputs.text,
                inputs.scope,
                inputs.module,
                encode_json(&json!(meta_tags))?,
                confidence,
                now.to_rfc3339(),
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to insert knowledge item: {err}")))?;
        let raw = tx
            .query_row(
                "SELECT id, kind, text, scope, module, meta_tags_json, confidence, helpful, harmful, created_at, updated_at
                 FROM knowledge_items WHERE id = ?1",
                params![id.as_str()],
                row_to_knowledge_item,
            )
            .map_err(|err| EngramError::External(format!("failed to read back knowledge item: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let item = build_knowledge_item(raw)?;
        item.validate()?;
        self.record_audit("knowledge_item.add", serde_json::to_value(&item).unwrap_or_default())?;
        Ok(item)
    }

    /// Fetches a knowledge item by id.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_knowledge_item(&self, id: &engram_core::ContentId) -> Result<Option<KnowledgeItem>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let raw = connection
            .query_row(
                "SELECT id, kind, text, scope, module, meta_tags_json, confidence, helpful, harmful, created_at, updated_at
                 FROM knowledge_items WHERE id = ?1",
                params![id.as_str()],
                row_to_knowledge_item,
            )
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read knowledge item: {err}")))?;
        raw.map(build_knowledge_item).transpose()
    }

    /// Lists knowledge items, optionally narrowed by scope and/or module.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_knowledge_items(&self, filters: &KnowledgeItemFilters) -> Result<Vec<KnowledgeItem>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare(
                "SELECT id, kind, text, scope, module, meta_tags_json, confidence, helpful, harmful, created_at, updated_at
                 FROM knowledge_items
                 WHERE (?1 IS NULL OR scope = ?1) AND (?2 IS NULL OR module = ?2)
                 ORDER BY created_at ASC",
            )
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let rows = statement
            .query_map(params![filters.scope, filters.module], row_to_knowledge_item)
            .map_err(|err| EngramError::External(format!("failed to list knowledge items: {err}")))?;
        rows.map(|row| {
            let raw = row.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?;
            build_knowledge_item(raw)
        })
        .collect()
    }

    /// Applies an incremental feedback delta to a knowledge item's
    /// `helpful`/`harmful` counters.
    ///
    /// # Errors
    /// Returns [`EngramError::NotFound`] if no such item exists, or
    /// [`EngramError::External`] on a database error.
    pub fn update_knowledge_item_feedback(
        &self,
        id: &engram_core::ContentId,
        delta_helpful: u32,
        delta_harmful: u32,
    ) -> Result<KnowledgeItem, EngramError> {
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        let now = Timestamp::now().to_rfc3339();
        let affected = tx
            .execute(
                "UPDATE knowledge_items
                 SET helpful = helpful + ?2, harmful = harmful + ?3, updated_at = ?4
                 WHERE id = ?1",
                params![id.as_str(), delta_helpful, delta_harmful, now],
            )
            .map_err(|err| EngramError::External(format!("failed to update feedback: {err}")))?;
        if affected == 0 {
            return Err(EngramError::NotFound(format!("knowledge item {} not found", id.as_str())));
        }
        let raw = tx
            .query_row(
                "SELECT id, kind, text, scope, module, meta_tags_json, confidence, helpful, harmful, created_at, updated_at
                 FROM knowledge_items WHERE id = ?1",
                params![id.as_str()],
                row_to_knowledge_item,
            )
            .map_err(|err| EngramError::External(format!("failed to read back knowledge item: {err}")))?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        let item = build_knowledge_item(raw)?;
        self.record_audit(
            "knowledge_item.feedback",
            json!({"id": item.id.as_str(), "deltaHelpful": delta_helpful, "deltaHarmful": delta_harmful}),
        )?;
        Ok(item)
    }

    /// Inserts an insight if it does not already exist, returning the
    /// stored row either way. Since an insight's id covers `(pattern,
    /// description)` only, a second call against the same pair is a no-op
    /// that returns the original `frequency`/`meta_tags`/`confidence`
    /// rather than the newly supplied ones.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn add_insight(
        &self,
        inputs: InsightInputs,
        confidence: f64,
        frequency: u32,
        meta_tags: Vec<String>,
        related_subjects: Vec<engram_core::ContentId>,
    ) -> Result<Insight, EngramError> {
        let id = Insight::derive_id(&inputs)?;
        let handle = self.connection()?;
        let mut connection = lock(&handle)?;
        let tx = connection
            .transaction()
            .map_err(|err| EngramError::External(format!("failed to start transaction: {err}")))?;
        let now = Timestamp::now().to_rfc3339();
        let related_json = encode_json(&json!(related_subjects.iter().map(engram_core::ContentId::as_str).collect::<Vec<_>>()))?;
        tx.execute(
            "INSERT OR IGNORE INTO insights
                (id, pattern, description, confidence, frequency, related_subjects_json, meta_tags_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.as_str(),
                inputs.pattern,
                inputs.description,
                confidence,
                frequency,
                related_json,
                encode_json(&json!(meta_tags))?,
                now,
            ],
        )
        .map_err(|err| EngramError::External(format!("failed to insert insight: {err}")))?;
        let insight = read_insight(&tx, id.as_str())?;
        tx.commit().map_err(|err| EngramError::External(format!("failed to commit transaction: {err}")))?;
        drop(connection);
        self.record_audit("insight.add", serde_json::to_value(&insight).unwrap_or_default())?;
        Ok(insight)
    }

    /// Fetches an insight by id.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn get_insight(&self, id: &engram_core::ContentId) -> Result<Option<Insight>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let exists = connection
            .query_row("SELECT 1 FROM insights WHERE id = ?1", params![id.as_str()], |_| Ok(()))
            .optional()
            .map_err(|err| EngramError::External(format!("failed to read insight: {err}")))?
            .is_some();
        if exists { Ok(Some(read_insight(&connection, id.as_str())?)) } else { Ok(None) }
    }

    /// Lists every insight currently pending curation.
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn list_insights(&self) -> Result<Vec<Insight>, EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        let mut statement = connection
            .prepare("SELECT id FROM insights ORDER BY created_at ASC")
            .map_err(|err| EngramError::External(format!("failed to prepare query: {err}")))?;
        let ids = statement
            .query_map(params![], |row| row.get::<_, String>(0))
            .map_err(|err| EngramError::External(format!("failed to list insights: {err}")))?;
        ids.map(|id| {
            let id = id.map_err(|err| EngramError::External(format!("failed to read row: {err}")))?;
            read_insight(&connection, &id)
        })
        .collect()
    }

    /// Deletes an insight, typically once curation has consumed it into a
    /// [`KnowledgeItem`].
    ///
    /// # Errors
    /// Returns [`EngramError::External`] on a database error.
    pub fn delete_insight(&self, id: &engram_core::ContentId) -> Result<(), EngramError> {
        let handle = self.connection()?;
        let connection = lock(&handle)?;
        connection
            .execute("DELETE FROM insights WHERE id = ?1", params![id.as_str()])
            .map_err(|err| EngramError::External(format!("failed to delete insight: {err}")))?;
        drop(connection);
        self.record_audit("insight.delete", json!({"id": id.as_str()}))
    }
}

fn read_insight(connection: &rusqlite::Connection, id: &str) -> Result<Insight, EngramError> {
    connection
        .query_row(
            "SELECT id, pattern, description, confidence, frequency, related_subjects_json, meta_tags_json, created_at
             FROM insights WHERE id = ?1",
            params![id],
            |row| {
                let id: String = row.get(0)?;
                let pattern: String = row.get(1)?;
                let description: String = row.get(2)?;
                let confidence: f64 = row.get(3)?;
                let frequency: u32 = row.get(4)?;
                let related_subjects_json: String = row.get(5)?;
                let meta_tags_json: String = row.get(6)?;
                let created_at: String = row.get(7)?;
                Ok((id, pattern, description, confidence, frequency, related_subjects_json, meta_tags_json, created_at))
            },
        )
        .map_err(|err| EngramError::External(format!("failed to read insight: {err}")))
        .and_then(|(id, pattern, description, confidence, frequency, related_subjects_json, meta_tags_json, created_at)| {
            let related_subjects: Vec<String> = serde_json::from_str(&related_subjects_json)
                .map_err(|err| EngramError::External(format!("failed to decode related subjects: {err}")))?;
            Ok(Insight {
                id: id.try_into()?,
                pattern,
                description,
                related_subjects: related_subjects
                    .into_iter()
                    .map(TryInto::try_into)
                    .collect::<Result<Vec<_>, EngramError>>()?,
                frequency,
                confidence,
                meta_tags: serde_json::from_str(&meta_tags_json)
                    .map_err(|err| EngramError::External(format!("failed to decode meta_tags: {err}")))?,
                created_at: Timestamp::parse(&created_at)?,
            })
        })
}
