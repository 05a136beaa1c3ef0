//! Hosted LLM integration
//!
//! Features:
//! - `LlmBackend` trait: one generate call carrying the temperature
//!   band, token budget and optional response schema
//! - Gemini backend over the generateContent REST API
//! - Prompt builders for classification, extraction, conversational
//!   generation and policy answering
//! - JSON-schema validation of structured output with the documented
//!   empty-string-entities coercion
//!
//! Failures and timeouts are distinct error kinds so every caller can
//! fall back deterministically; nothing that affects state transitions
//! depends on LLM phrasing.

pub mod backend;
pub mod gemini;
pub mod prompt;
pub mod schema;

pub use backend::{GenerateRequest, GenerationResult, LlmBackend, Message, Role};
pub use gemini::{GeminiBackend, GeminiConfig};
pub use prompt::{
    classification_prompt, extraction_prompt, persona_prompt, policy_prompt,
    PERSONA_SYSTEM_PROMPT,
};
pub use schema::{
    classification_schema, extraction_schema, parse_classification, parse_extraction,
    LlmClassification, LlmExtraction, LlmScoredIntent,
};

use thiserror::Error;

/// LLM errors.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Structured output failed schema validation
    #[error("schema violation: {0}")]
    Schema(String),

    #[error("timeout")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for converge_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => converge_core::Error::Timeout("llm call".to_string()),
            other => converge_core::Error::Llm(other.to_string()),
        }
    }
}
