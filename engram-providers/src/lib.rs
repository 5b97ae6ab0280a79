// engram-providers/src/lib.rs
// ============================================================================
// Module: Engram Providers
// Description: LlmClient implementations and the comparative judge's
// prompt builder and response parser.
// Purpose: Give the judge driver a network-backed and a deterministic
// stub backend behind the same `engram_core::LlmClient` trait.
// Dependencies: engram-core, reqwest, async-trait, serde_json
// ============================================================================

//! ## Overview
//! This crate ships the two `LlmClient` backends named in the
//! specification: [`http::HttpLlmClient`], which speaks a chat-completions
//! style HTTP API over `reqwest`, and [`stub::StubLlmClient`], a
//! deterministic, scriptable backend used by tests and by callers who want
//! to exercise the judge driver without a network. The [`judge`] module
//! builds the versioned judge prompt and parses the model's JSON verdict.

#![doc(html_no_source)]

pub mod http;
pub mod judge;
pub mod stub;

pub use http::HttpLlmClient;
pub use http::HttpLlmConfig;
pub use judge::JudgePromptInput;
pub use judge::Verdict;
pub use judge::Winner;
pub use stub::StubLlmClient;
