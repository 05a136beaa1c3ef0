//! Shared application state
//!
//! Holds the coordinator plus per-session turn guards. Turns within a
//! session are strictly serialized: a second inbound message while the
//! previous turn is mid-graph is rejected with 409 rather than risking
//! interleaved dialog-state writes.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use converge_agent::{Coordinator, ReviewService};
use converge_config::Settings;
use converge_llm::{GenerateRequest, GenerationResult, LlmBackend, LlmError};
use converge_persistence::ConversationTurnStore;

/// Backend used when no LLM credentials are configured; every call
/// fails fast so the deterministic fallbacks carry the conversation.
pub struct UnconfiguredLlm;

#[async_trait]
impl LlmBackend for UnconfiguredLlm {
    async fn generate(&self, _request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
        Err(LlmError::Configuration(
            "no LLM credentials configured".to_string(),
        ))
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn model_name(&self) -> &str {
        "unconfigured"
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub review: Arc<ReviewService>,
    pub turns: Arc<dyn ConversationTurnStore>,
    pub settings: Arc<Settings>,
    /// One guard per session; holding it serializes the session's turns
    turn_guards: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<Coordinator>,
        review: Arc<ReviewService>,
        turns: Arc<dyn ConversationTurnStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            coordinator,
            review,
            turns,
            settings,
            turn_guards: Arc::new(DashMap::new()),
        }
    }

    /// Guard for a session's turn; callers `try_lock` it and reject
    /// concurrent messages for the same session.
    pub fn turn_guard(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.turn_guards
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_llm_fails_fast() {
        let llm = UnconfiguredLlm;
        let request = GenerateRequest::new(vec![], 0.3);
        assert!(matches!(
            llm.generate(&request).await,
            Err(LlmError::Configuration(_))
        ));
        assert!(!llm.is_available().await);
    }
}
