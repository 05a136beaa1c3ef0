//! Entity extractor
//!
//! Pattern-first for precision; on a miss the LLM runs in extraction
//! mode with the already-collected entities as context (so "the same
//! day" resolves). Whatever the LLM returns is re-normalized through
//! the deterministic rules before anything downstream sees it.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use converge_config::LlmSettings;
use converge_core::{EntityKey, EntityValue, ExtractionMethod};
use converge_llm::{extraction_prompt, parse_extraction, GenerateRequest, LlmBackend};
use converge_nlu::EntityPatternExtractor;

/// Pattern confidence at which the LLM stage is skipped.
const PATTERN_ACCEPT_THRESHOLD: f32 = 0.85;

pub struct EntityExtractor {
    patterns: Arc<EntityPatternExtractor>,
    llm: Arc<dyn LlmBackend>,
    llm_settings: LlmSettings,
}

impl EntityExtractor {
    pub fn new(
        patterns: Arc<EntityPatternExtractor>,
        llm: Arc<dyn LlmBackend>,
        llm_settings: LlmSettings,
    ) -> Self {
        Self {
            patterns,
            llm,
            llm_settings,
        }
    }

    /// Extract the expected entity from a message.
    pub async fn extract(
        &self,
        message: &str,
        key: EntityKey,
        collected: &HashMap<EntityKey, String>,
        today: NaiveDate,
    ) -> Option<EntityValue> {
        if let Some(extraction) = self.patterns.extract(message, key, today) {
            if extraction.confidence >= PATTERN_ACCEPT_THRESHOLD {
                return Some(EntityValue::new(
                    key,
                    extraction.raw,
                    extraction.normalized,
                    extraction.confidence,
                    ExtractionMethod::Pattern,
                ));
            }
        }

        self.extract_llm(message, key, collected, today).await
    }

    async fn extract_llm(
        &self,
        message: &str,
        key: EntityKey,
        collected: &HashMap<EntityKey, String>,
        today: NaiveDate,
    ) -> Option<EntityValue> {
        let collected_pairs: Vec<(String, String)> = collected
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect();

        let messages = extraction_prompt(
            message,
            key.as_str(),
            entity_description(key),
            &collected_pairs,
        );
        let request = GenerateRequest::new(messages, self.llm_settings.extraction_temperature)
            .with_max_tokens(256)
            .with_schema(converge_llm::extraction_schema())
            .with_timeout(Duration::from_millis(self.llm_settings.classification_timeout_ms));

        let raw = match self.llm.generate(&request).await {
            Ok(result) => result.text,
            Err(e) => {
                tracing::debug!(entity = %key, error = %e, "llm extraction failed");
                return None;
            }
        };

        let parsed = match parse_extraction(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(entity = %key, error = %e, "llm extraction output malformed");
                return None;
            }
        };

        let value = parsed.value?;
        if value.trim().is_empty() {
            return None;
        }

        // Re-normalize deterministically; the LLM picks the span, the
        // rules decide the canonical form
        let normalized = self
            .patterns
            .extract(&value, key, today)
            .map(|e| e.normalized)
            .unwrap_or_else(|| value.clone());

        Some(EntityValue::new(
            key,
            value,
            normalized,
            parsed.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
            ExtractionMethod::Llm,
        ))
    }
}

/// Short value descriptions fed to the extraction prompt.
fn entity_description(key: EntityKey) -> &'static str {
    match key {
        EntityKey::ServiceType => "The home service wanted: AC service, plumbing, cleaning, electrical work or pest control.",
        EntityKey::PreferredDate => "The date of the visit; relative expressions like 'tomorrow' are fine.",
        EntityKey::PreferredTime => "The time of day for the visit, e.g. '3 PM' or '15:00'.",
        EntityKey::Location => "The service address area: a 6-digit pincode or a city name.",
        EntityKey::BookingId => "The booking reference, e.g. ORD331718A2.",
        EntityKey::IssueType => "What went wrong: no_show, damage, quality or delay.",
        EntityKey::Description => "A free-text description of the problem in the customer's words.",
        EntityKey::Quantity => "How many units or rooms the service covers.",
        EntityKey::PaymentMethod => "How the customer wants to pay: upi, card, netbanking or cash.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use converge_config::EntityRulesConfig;
    use converge_llm::{GenerationResult, LlmError};
    use parking_lot::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn generate(&self, _request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(LlmError::Api("script exhausted".to_string()));
            }
            responses.remove(0).map(|text| GenerationResult {
                text,
                total_time_ms: 1,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn extractor(responses: Vec<Result<String, LlmError>>) -> EntityExtractor {
        EntityExtractor::new(
            Arc::new(EntityPatternExtractor::new(EntityRulesConfig::default())),
            Arc::new(ScriptedLlm {
                responses: Mutex::new(responses),
            }),
            LlmSettings::default(),
        )
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    #[tokio::test]
    async fn test_pattern_path_skips_llm() {
        // An exhausted script errors if consulted
        let e = extractor(Vec::new());
        let value = e
            .extract("tomorrow", EntityKey::PreferredDate, &HashMap::new(), today())
            .await
            .unwrap();

        assert_eq!(value.normalized_value, "2026-08-02");
        assert_eq!(value.method, ExtractionMethod::Pattern);
        assert!(value.confidence >= 0.85);
    }

    #[tokio::test]
    async fn test_llm_path_renormalizes() {
        let e = extractor(vec![Ok(r#"{"value": "tomorrow", "confidence": 0.8}"#.to_string())]);
        let value = e
            .extract(
                "let's do it the day you suggested",
                EntityKey::PreferredDate,
                &HashMap::new(),
                today(),
            )
            .await
            .unwrap();

        // The LLM picked the span; normalization is deterministic
        assert_eq!(value.normalized_value, "2026-08-02");
        assert_eq!(value.method, ExtractionMethod::Llm);
    }

    #[tokio::test]
    async fn test_llm_null_value_is_a_miss() {
        let e = extractor(vec![Ok(r#"{"value": null}"#.to_string())]);
        let value = e
            .extract("no idea", EntityKey::PreferredTime, &HashMap::new(), today())
            .await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_llm_failure_is_a_miss() {
        let e = extractor(Vec::new());
        let value = e
            .extract("hmm", EntityKey::Location, &HashMap::new(), today())
            .await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_collected_context_reaches_prompt() {
        // "for the same day" has no date pattern; the LLM resolves it
        // against the collected date
        let mut collected = HashMap::new();
        collected.insert(
            EntityKey::PreferredDate,
            (today() + ChronoDuration::days(1)).to_string(),
        );
        let e = extractor(vec![Ok(r#"{"value": "2026-08-02", "confidence": 0.9}"#.to_string())]);
        let value = e
            .extract(
                "for the same day",
                EntityKey::PreferredDate,
                &collected,
                today(),
            )
            .await
            .unwrap();
        assert_eq!(value.normalized_value, "2026-08-02");
    }
}
