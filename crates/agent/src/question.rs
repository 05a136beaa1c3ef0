//! Question generator
//!
//! Three prompt shapes: slot questions, validation-error prompts, and
//! the confirmation summary. Each has an LLM conversational variant
//! (warm persona, temperature 0.7) and a static template fallback so a
//! prompt timeout can never block a turn. Wording varies across
//! retries; the third failed attempt escalates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use converge_config::{EntityRulesConfig, LlmSettings};
use converge_core::{EntityKey, IntentKind};
use converge_llm::{persona_prompt, GenerateRequest, LlmBackend};

use crate::validator::ValidationOutcome;

pub struct QuestionGenerator {
    llm: Arc<dyn LlmBackend>,
    rules: Arc<EntityRulesConfig>,
    llm_settings: LlmSettings,
    /// Disable the LLM variant entirely (deterministic deployments)
    use_llm_variant: bool,
}

impl QuestionGenerator {
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        rules: Arc<EntityRulesConfig>,
        llm_settings: LlmSettings,
    ) -> Self {
        Self {
            llm,
            rules,
            llm_settings,
            use_llm_variant: true,
        }
    }

    pub fn without_llm_variant(mut self) -> Self {
        self.use_llm_variant = false;
        self
    }

    /// Ask for the next needed entity.
    pub async fn slot_question(
        &self,
        intent: IntentKind,
        key: EntityKey,
        collected: &HashMap<EntityKey, String>,
        retry_count: u32,
    ) -> String {
        let fallback = self.slot_template(key, collected, retry_count);
        let instruction = format!(
            "Ask the customer one short question to get their {} for a {} request. \
Already known: {}. Ask only for the {}.",
            key.display(),
            intent,
            self.summarize(collected),
            key.display(),
        );
        self.conversational_or(&instruction, fallback).await
    }

    /// Re-ask after a failed validation, embedding the error and
    /// suggestions.
    pub async fn validation_error_prompt(&self, outcome: &ValidationOutcome) -> String {
        let error = outcome
            .error_message
            .clone()
            .unwrap_or_else(|| "Sorry, that value didn't work.".to_string());
        let fallback = if outcome.suggestions.is_empty() {
            error.clone()
        } else {
            format!("{} Suggestions: {}.", error, outcome.suggestions.join(", "))
        };
        let instruction = format!(
            "The customer's {} was rejected: {} Gently re-ask for it{}",
            outcome.key.display(),
            error,
            if outcome.suggestions.is_empty() {
                ".".to_string()
            } else {
                format!(", offering these examples: {}.", outcome.suggestions.join(", "))
            }
        );
        self.conversational_or(&instruction, fallback).await
    }

    /// Summarize everything collected and ask to proceed.
    pub async fn confirmation_prompt(
        &self,
        intent: IntentKind,
        ordered_keys: &[EntityKey],
        collected: &HashMap<EntityKey, String>,
    ) -> String {
        let summary = self.ordered_summary(ordered_keys, collected);
        let fallback = format!("Here's what I have: {}. Should I proceed?", summary);
        let instruction = format!(
            "Summarize this {} request back to the customer ({}) and ask whether to proceed. \
End with the words \"Should I proceed?\"",
            intent, summary
        );
        self.conversational_or(&instruction, fallback).await
    }

    /// Third failed attempt on one entity: offer a way out.
    pub fn escalation_prompt(&self) -> String {
        "I'm having trouble getting that detail right, and I don't want to waste your time. \
We can try again, skip it for now, or I can connect you with a human agent — \
just say the word."
            .to_string()
    }

    /// Explicit cancellation acknowledgement.
    pub fn cancelled_prompt(&self) -> String {
        "No problem, I've set that request aside. Tell me whenever you'd like to pick it \
back up or start something new."
            .to_string()
    }

    async fn conversational_or(&self, instruction: &str, fallback: String) -> String {
        if !self.use_llm_variant {
            return fallback;
        }
        let request = GenerateRequest::new(
            persona_prompt(instruction),
            self.llm_settings.generation_temperature,
        )
        .with_max_tokens(256)
        .with_timeout(Duration::from_millis(self.llm_settings.generation_timeout_ms));

        match self.llm.generate(&request).await {
            Ok(result) if !result.text.trim().is_empty() => result.text.trim().to_string(),
            Ok(_) => fallback,
            Err(e) => {
                tracing::debug!(error = %e, "persona generation failed, using template");
                fallback
            }
        }
    }

    fn slot_template(
        &self,
        key: EntityKey,
        collected: &HashMap<EntityKey, String>,
        retry_count: u32,
    ) -> String {
        let templates: [String; 3] = match key {
            EntityKey::ServiceType => [
                "Which service do you need — AC service, plumbing, cleaning, electrical work or pest control?".to_string(),
                "What kind of help do you need at home?".to_string(),
                "Could you tell me the service you'd like to book?".to_string(),
            ],
            EntityKey::PreferredDate => [
                format!(
                    "When should we schedule your {}? You can say 'tomorrow' or give a date.",
                    self.service_display(collected)
                ),
                "Which date works best for you?".to_string(),
                "Could you share the date one more time — 'tomorrow' or something like 2026-08-15 both work?".to_string(),
            ],
            EntityKey::PreferredTime => [
                "What time suits you? Our technicians work 08:00 to 20:00.".to_string(),
                "And what time of day should the technician arrive?".to_string(),
                "Could you give me a time like '3 PM' or '15:00'?".to_string(),
            ],
            EntityKey::Location => [
                "Where should the technician come — your pincode or city?".to_string(),
                "What's the pincode or city for the visit?".to_string(),
                "Could you share your area pincode one more time?".to_string(),
            ],
            EntityKey::BookingId => [
                "Which booking is this about? The order ID starts with ORD.".to_string(),
                "Could you share the booking ID (it looks like ORD1234ABCD)?".to_string(),
                "I just need the ORD number from your booking confirmation.".to_string(),
            ],
            EntityKey::IssueType => [
                "I'm sorry to hear that. What went wrong — a no-show, damage, service quality, or a delay?".to_string(),
                "Which of these best describes the problem: no-show, damage, quality, or delay?".to_string(),
                "Just so I file this right — was it a no-show, damage, a quality issue, or a delay?".to_string(),
            ],
            EntityKey::Description => [
                "Could you describe what happened in a sentence or two?".to_string(),
                "Please tell me a bit more about what went wrong.".to_string(),
                "What exactly happened? A short description helps us fix it faster.".to_string(),
            ],
            EntityKey::Quantity => [
                "How many units should the visit cover?".to_string(),
                "For how many units or rooms?".to_string(),
                "Could you give me the count as a number?".to_string(),
            ],
            EntityKey::PaymentMethod => [
                "How would you like to pay — UPI, card, netbanking or cash?".to_string(),
                "Which payment method works for you?".to_string(),
                "Just the payment method left: UPI, card, netbanking or cash?".to_string(),
            ],
        };
        templates[(retry_count as usize) % templates.len()].clone()
    }

    fn service_display(&self, collected: &HashMap<EntityKey, String>) -> String {
        collected
            .get(&EntityKey::ServiceType)
            .and_then(|id| self.rules.service_type(id))
            .map(|s| s.display.clone())
            .unwrap_or_else(|| "visit".to_string())
    }

    fn summarize(&self, collected: &HashMap<EntityKey, String>) -> String {
        if collected.is_empty() {
            return "nothing yet".to_string();
        }
        let mut parts: Vec<String> = collected
            .iter()
            .map(|(k, v)| format!("{}={}", k, self.display_value(*k, v)))
            .collect();
        parts.sort();
        parts.join(", ")
    }

    fn ordered_summary(
        &self,
        ordered_keys: &[EntityKey],
        collected: &HashMap<EntityKey, String>,
    ) -> String {
        let parts: Vec<String> = ordered_keys
            .iter()
            .filter_map(|k| collected.get(k).map(|v| self.display_value(*k, v)))
            .collect();
        parts.join(", ")
    }

    fn display_value(&self, key: EntityKey, value: &str) -> String {
        match key {
            EntityKey::ServiceType => self
                .rules
                .service_type(value)
                .map(|s| s.display.clone())
                .unwrap_or_else(|| value.to_string()),
            EntityKey::IssueType => self
                .rules
                .issue_type(value)
                .map(|s| s.display.clone())
                .unwrap_or_else(|| value.to_string()),
            _ => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use converge_llm::{GenerationResult, LlmError};

    struct FailingLlm;

    #[async_trait]
    impl LlmBackend for FailingLlm {
        async fn generate(&self, _request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
            Err(LlmError::Timeout)
        }

        async fn is_available(&self) -> bool {
            false
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn generator() -> QuestionGenerator {
        QuestionGenerator::new(
            Arc::new(FailingLlm),
            Arc::new(EntityRulesConfig::default()),
            LlmSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_slot_question_never_blocks_on_llm_failure() {
        let g = generator();
        let question = g
            .slot_question(
                IntentKind::BookingCreate,
                EntityKey::PreferredDate,
                &HashMap::new(),
                0,
            )
            .await;
        assert!(!question.is_empty());
        assert!(question.contains("tomorrow"));
    }

    #[tokio::test]
    async fn test_wording_varies_across_retries() {
        let g = generator();
        let collected = HashMap::new();
        let q0 = g
            .slot_question(IntentKind::BookingCreate, EntityKey::PreferredTime, &collected, 0)
            .await;
        let q1 = g
            .slot_question(IntentKind::BookingCreate, EntityKey::PreferredTime, &collected, 1)
            .await;
        let q2 = g
            .slot_question(IntentKind::BookingCreate, EntityKey::PreferredTime, &collected, 2)
            .await;
        assert_ne!(q0, q1);
        assert_ne!(q1, q2);
        assert_ne!(q0, q2);
    }

    #[tokio::test]
    async fn test_validation_error_prompt_embeds_suggestions() {
        let g = generator();
        let outcome = ValidationOutcome::invalid(
            EntityKey::PreferredDate,
            "2026-07-31",
            "Sorry, the date must be today or in the future.",
            vec!["today".to_string(), "tomorrow".to_string(), "next Monday".to_string()],
        );
        let prompt = g.validation_error_prompt(&outcome).await;
        assert_eq!(
            prompt,
            "Sorry, the date must be today or in the future. Suggestions: today, tomorrow, next Monday."
        );
    }

    #[tokio::test]
    async fn test_confirmation_prompt_lists_values_in_order() {
        let g = generator();
        let mut collected = HashMap::new();
        collected.insert(EntityKey::ServiceType, "ac_service".to_string());
        collected.insert(EntityKey::PreferredDate, "2026-08-02".to_string());
        collected.insert(EntityKey::PreferredTime, "15:00".to_string());
        collected.insert(EntityKey::Location, "282002".to_string());

        let prompt = g
            .confirmation_prompt(
                IntentKind::BookingCreate,
                &[
                    EntityKey::ServiceType,
                    EntityKey::PreferredDate,
                    EntityKey::PreferredTime,
                    EntityKey::Location,
                ],
                &collected,
            )
            .await;

        assert_eq!(
            prompt,
            "Here's what I have: AC service, 2026-08-02, 15:00, 282002. Should I proceed?"
        );
    }

    #[test]
    fn test_escalation_offers_human() {
        let g = generator();
        let prompt = g.escalation_prompt();
        assert!(prompt.contains("human"));
        assert!(prompt.contains("skip"));
    }
}
