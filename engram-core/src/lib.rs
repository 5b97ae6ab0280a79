// engram-core/src/lib.rs
// ============================================================================
// Module: Engram Core
// Description: Canonical content-addressed types shared by every Engram
// crate.
// Purpose: Own deterministic JSON canonicalization, SHA-256 id derivation,
// the domain entity schema, the error taxonomy, and the LLM capability
// boundary.
// Dependencies: chrono, serde, serde_jcs, serde_json, sha2, thiserror,
// async-trait
// ============================================================================

//! # engram-core
//!
//! The foundation every other Engram crate builds on. Nothing in this
//! crate touches a filesystem, a database, or a network socket: it defines
//! what an id is, what an entity looks like, and what can go wrong, so
//! that `engram-store`, `engram-providers`, `engram-learn`, `engram-bbon`,
//! and `engram-cli` share one vocabulary.

#![doc(html_no_source)]

pub mod canonical;
pub mod entities;
pub mod error;
pub mod id;
pub mod interfaces;
pub mod time;

pub use canonical::canonical_bytes;
pub use canonical::canonical_string;
pub use entities::Attempt;
pub use entities::AttemptInputs;
pub use entities::AttemptStatus;
pub use entities::AttemptStep;
pub use entities::AttemptStepInputs;
pub use entities::AttemptStepKind;
pub use entities::ErrorSeverity;
pub use entities::ExecutionError;
pub use entities::ExecutionStatus;
pub use entities::Insight;
pub use entities::InsightInputs;
pub use entities::JudgeOutcome;
pub use entities::JudgeOutcomeInputs;
pub use entities::JudgePair;
pub use entities::JudgePairInputs;
pub use entities::KnowledgeItem;
pub use entities::KnowledgeItemInputs;
pub use entities::KnowledgeKind;
pub use entities::MemoryEvent;
pub use entities::MemoryEventInputs;
pub use entities::MemorySubjectKind;
pub use entities::Run;
pub use entities::RunInputs;
pub use entities::ShortTermMemory;
pub use entities::ShortTermMemoryInputs;
pub use entities::Task;
pub use entities::TaskInputs;
pub use entities::TaskSpec;
pub use entities::ToolExecution;
pub use entities::Trace;
pub use entities::TraceInputs;
pub use entities::TraceOutcome;
pub use entities::WorkingMemory;
pub use entities::WorkingMemoryInputs;
pub use entities::WorkingMemoryType;
pub use error::EngramError;
pub use error::EngramResult;
pub use error::FieldError;
pub use id::ContentId;
pub use interfaces::LlmClient;
pub use interfaces::LlmError;
pub use interfaces::LlmRequest;
pub use interfaces::extract_json;
pub use time::Timestamp;
