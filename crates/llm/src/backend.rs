//! LLM backend abstraction
//!
//! One trait, one request shape. Temperature bands are decided by the
//! caller (classification 0.3, extraction 0.2, generation 0.7); the
//! backend only executes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::LlmError;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prompt message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// When set, the backend requests JSON output conforming to this
    /// schema; the caller still validates the result.
    pub response_schema: Option<serde_json::Value>,
    /// Per-call deadline; `LlmError::Timeout` past it.
    pub timeout: Duration,
}

impl GenerateRequest {
    pub fn new(messages: Vec<Message>, temperature: f32) -> Self {
        Self {
            messages,
            temperature,
            max_tokens: 8192,
            response_schema: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Generation result with latency accounting.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub total_time_ms: u64,
}

/// Backend trait implemented by the Gemini client and by test doubles.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, LlmError>;

    /// Health probe; used by readiness checks only.
    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerateRequest::new(vec![Message::user("hi")], 0.3)
            .with_max_tokens(512)
            .with_timeout(Duration::from_secs(5))
            .with_schema(serde_json::json!({"type": "object"}));

        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.max_tokens, 512);
        assert!(request.response_schema.is_some());
        assert_eq!(request.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
    }
}
