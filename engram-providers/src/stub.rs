// engram-providers/src/stub.rs
// ============================================================================
// Module: Stub LLM Client
// Description: Deterministic, scriptable LlmClient backend.
// Purpose: Let the judge driver and its callers be exercised end-to-end
// without a network, behind a deterministic stand-in judge.
// Dependencies: engram-core, async-trait
// ============================================================================

//! ## Overview
//! `StubLlmClient` replays a queue of scripted completions, one per call,
//! falling back to a fixed default once the queue is exhausted. This makes
//! judge-driver tests deterministic: the same sequence of attempts always
//! produces the same sequence of verdicts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use engram_core::LlmClient;
use engram_core::LlmError;
use engram_core::LlmRequest;

// ============================================================================
// SECTION: Client
// ============================================================================

/// `LlmClient` backed by a fixed, scripted sequence of completions.
pub struct StubLlmClient {
    /// Remaining scripted responses, consumed front-to-back.
    responses: Mutex<VecDeque<String>>,
    /// Response returned once `responses` is exhausted.
    default_response: String,
}

impl StubLlmClient {
    /// Creates a stub that always returns `default_response`.
    #[must_use]
    pub fn new(default_response: impl Into<String>) -> Self {
        Self { responses: Mutex::new(VecDeque::new()), default_response: default_response.into() }
    }

    /// Creates a stub that replays `responses` in order, then falls back to
    /// `default_response`.
    #[must_use]
    pub fn with_scripted(responses: Vec<String>, default_response: impl Into<String>) -> Self {
        Self { responses: Mutex::new(responses.into()), default_response: default_response.into() }
    }

    /// A stub that always prefers the left attempt (`A`), matching the
    /// "prefers the lower ordinal" scenario used to demonstrate judge
    /// determinism.
    #[must_use]
    pub fn prefer_left() -> Self {
        Self::new(r#"{"winner":"A","confidence":1.0,"rationale":"stub: prefers the lower ordinal attempt"}"#)
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn complete(&self, _request: &LlmRequest) -> Result<String, LlmError> {
        let mut responses = self.responses.lock().map_err(|_| LlmError::Transport("stub response queue poisoned".to_owned()))?;
        Ok(responses.pop_front().unwrap_or_else(|| self.default_response.clone()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest { prompt: "compare A and B".to_owned(), model: "stub-judge".to_owned(), temperature: 0.0 }
    }

    #[tokio::test]
    async fn prefer_left_always_returns_the_same_verdict() {
        let client = StubLlmClient::prefer_left();
        let first = client.complete(&request()).await.unwrap();
        let second = client.complete(&request()).await.unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"winner\":\"A\""));
    }

    #[tokio::test]
    async fn scripted_responses_are_consumed_in_order_then_fall_back() {
        let client = StubLlmClient::with_scripted(
            vec!["first".to_owned(), "second".to_owned()],
            "default".to_owned(),
        );
        assert_eq!(client.complete(&request()).await.unwrap(), "first");
        assert_eq!(client.complete(&request()).await.unwrap(), "second");
        assert_eq!(client.complete(&request()).await.unwrap(), "default");
        assert_eq!(client.complete(&request()).await.unwrap(), "default");
    }
}
