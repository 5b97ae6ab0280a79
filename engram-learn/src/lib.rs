// engram-learn/src/lib.rs
// ============================================================================
// Module: Engram Learn
// Description: The learning pipeline: Capture, Reflect, Curate, Memory
// promotion, Apply/Renderer, and the orchestrator that composes them.
// Purpose: Turn captured execution traces into durable, rendered guidance.
// Dependencies: engram-core, engram-store, regex
// ============================================================================

//! # engram-learn
//!
//! One module per pipeline stage. [`orchestrator::learn`] composes all
//! of them into the single `learn` verb: preflight, then Reflect, then
//! Curate, then Apply, wrapping
//! any step's failure with that step's name rather than inventing a new
//! error variant.

#![doc(html_no_source)]

pub mod apply;
pub mod capture;
pub mod curate;
pub mod memory;
pub mod orchestrator;
pub mod reflect;

pub use apply::ApplyResult;
pub use capture::resolve_capture_payload;
pub use curate::CurateResult;
pub use memory::PromotionResult;
pub use orchestrator::LearnResult;
pub use orchestrator::learn;
pub use reflect::InsightCandidate;
pub use reflect::reflect;
