//! Gemini backend
//!
//! Client for the generateContent REST API. System messages map onto
//! `systemInstruction`; when a response schema is requested the call
//! asks for `application/json` output so the model is constrained at
//! the API level, not just by prompt wording.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::backend::{GenerateRequest, GenerationResult, LlmBackend, Message, Role};
use crate::LlmError;

/// Configuration for the Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// API root, e.g. `https://generativelanguage.googleapis.com/v1beta`
    pub endpoint: String,
    /// Transport-level ceiling; per-request deadlines are tighter
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Gemini REST backend.
pub struct GeminiBackend {
    config: GeminiConfig,
    client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "GEMINI_API_KEY not set; set it via environment or config".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn build_request(&self, request: &GenerateRequest) -> GeminiRequest {
        let system_instruction = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            system_instruction: (!system_instruction.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system_instruction,
                }],
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request
                    .response_schema
                    .as_ref()
                    .map(|_| "application/json".to_string()),
                response_schema: request.response_schema.clone(),
            },
        }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint, self.config.model
        );
        let body = self.build_request(request);
        let started = Instant::now();

        let send = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send();

        let response = tokio::time::timeout(request.timeout, send)
            .await
            .map_err(|_| LlmError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| LlmError::InvalidResponse("no candidates in response".to_string()))?;

        let total_time_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %self.config.model,
            total_time_ms,
            chars = text.len(),
            "gemini generation complete"
        );

        Ok(GenerationResult {
            text,
            total_time_ms,
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models/{}", self.config.endpoint, self.config.model);
        self.client
            .get(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_rejected() {
        let config = GeminiConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            GeminiBackend::new(config),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_request_mapping() {
        let backend = GeminiBackend::new(GeminiConfig::new("test-key")).unwrap();
        let request = GenerateRequest::new(
            vec![
                Message::system("be brief"),
                Message::user("hello"),
                Message::assistant("hi"),
                Message::user("book AC service"),
            ],
            0.3,
        )
        .with_schema(serde_json::json!({"type": "object"}));

        let mapped = backend.build_request(&request);
        assert!(mapped.system_instruction.is_some());
        assert_eq!(mapped.contents.len(), 3);
        assert_eq!(mapped.contents[1].role.as_deref(), Some("model"));
        assert_eq!(
            mapped.generation_config.response_mime_type.as_deref(),
            Some("application/json")
        );
    }
}
