//! Hybrid intent classifier
//!
//! Three steps: deterministic pattern match, LLM classification with
//! schema-validated output, fallback to unclear_intent. Context-aware:
//! with an active collecting_info state the active intent wins unless a
//! different intent's pattern matches at the switch threshold AND its
//! trigger words appear. This keeps "the technician didn't show up"
//! inside an ongoing complaint flow.

use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use converge_config::{CatalogConfig, DialogSettings, LlmSettings};
use converge_core::{
    ClassificationMethod, DialogState, EntityKey, HistoryMessage, IntentKind, ScoredIntent,
};
use converge_llm::{classification_prompt, parse_classification, GenerateRequest, LlmBackend};
use converge_nlu::{EntityPatternExtractor, PatternIntentMatcher};

/// Classifier result.
#[derive(Debug, Clone)]
pub struct Classification {
    /// All candidates, most confident first
    pub intents: Vec<ScoredIntent>,
    pub primary: IntentKind,
    pub confidence: f32,
    pub method: ClassificationMethod,
    pub requires_clarification: bool,
}

impl Classification {
    fn single(
        intent: IntentKind,
        confidence: f32,
        entities: HashMap<String, String>,
        method: ClassificationMethod,
    ) -> Self {
        Self {
            intents: vec![ScoredIntent {
                intent,
                confidence,
                entities,
            }],
            primary: intent,
            confidence,
            method,
            requires_clarification: false,
        }
    }

    fn fallback(active: Option<&DialogState>) -> Self {
        match active {
            // Mid-dialog the active intent wins even when the
            // classifier has nothing; the turn reads as a slot answer.
            Some(state) => Classification {
                intents: vec![ScoredIntent {
                    intent: state.intent,
                    confidence: 0.6,
                    entities: HashMap::new(),
                }],
                primary: state.intent,
                confidence: 0.6,
                method: ClassificationMethod::Fallback,
                requires_clarification: false,
            },
            None => Classification {
                intents: vec![ScoredIntent {
                    intent: IntentKind::UnclearIntent,
                    confidence: 0.5,
                    entities: HashMap::new(),
                }],
                primary: IntentKind::UnclearIntent,
                confidence: 0.5,
                method: ClassificationMethod::Fallback,
                requires_clarification: true,
            },
        }
    }
}

/// Pattern -> LLM -> fallback classifier.
pub struct IntentClassifier {
    matcher: Arc<PatternIntentMatcher>,
    entity_patterns: Arc<EntityPatternExtractor>,
    llm: Arc<dyn LlmBackend>,
    catalog: Arc<CatalogConfig>,
    llm_settings: LlmSettings,
    dialog_settings: DialogSettings,
}

impl IntentClassifier {
    pub fn new(
        matcher: Arc<PatternIntentMatcher>,
        entity_patterns: Arc<EntityPatternExtractor>,
        llm: Arc<dyn LlmBackend>,
        catalog: Arc<CatalogConfig>,
        llm_settings: LlmSettings,
        dialog_settings: DialogSettings,
    ) -> Self {
        Self {
            matcher,
            entity_patterns,
            llm,
            catalog,
            llm_settings,
            dialog_settings,
        }
    }

    /// Classify a message in context.
    pub async fn classify(
        &self,
        message: &str,
        history: &[HistoryMessage],
        active: Option<&DialogState>,
    ) -> Classification {
        let matches = self.matcher.scan(message);

        if let Some(state) = active {
            // Confirmation answers are decided deterministically
            if state.kind == converge_core::DialogStateKind::AwaitingConfirmation
                && (self.matcher.is_affirmative(message) || self.matcher.is_negative(message))
            {
                return Classification::single(
                    state.intent,
                    0.95,
                    HashMap::new(),
                    ClassificationMethod::Pattern,
                );
            }

            // Explicit switch: different intent at the switch threshold
            // with its trigger words present
            if let Some(switch) = matches.iter().find(|m| {
                m.intent != state.intent
                    && m.confidence >= self.dialog_settings.intent_switch_threshold
                    && m.has_trigger_word
            }) {
                tracing::info!(
                    from = %state.intent,
                    to = %switch.intent,
                    confidence = switch.confidence,
                    "pattern stage detected intent switch"
                );
                return Classification::single(
                    switch.intent,
                    switch.confidence,
                    self.pattern_entities(message, switch.intent),
                    ClassificationMethod::Pattern,
                );
            }
        }

        // Fast path: exactly one unambiguous match, no multi-intent
        // signal, and no active state expecting a different answer
        let expecting_answer = active.map(|s| s.expected.is_some()).unwrap_or(false);
        let matched_active = active
            .map(|s| matches.first().map(|m| m.intent == s.intent).unwrap_or(false))
            .unwrap_or(true);
        if matches.len() == 1
            && matches[0].confidence >= self.dialog_settings.pattern_confidence_threshold
            && !self.matcher.has_multi_intent_signal(message)
            && (!expecting_answer || matched_active)
        {
            let m = &matches[0];
            return Classification::single(
                m.intent,
                m.confidence,
                self.pattern_entities(message, m.intent),
                ClassificationMethod::Pattern,
            );
        }

        // LLM stage
        match self.classify_llm(message, history, active).await {
            Some(classification) => classification,
            None => Classification::fallback(active),
        }
    }

    async fn classify_llm(
        &self,
        message: &str,
        history: &[HistoryMessage],
        active: Option<&DialogState>,
    ) -> Option<Classification> {
        let catalog_block = self.catalog_block();
        let summary = active.map(|s| s.summary());
        let messages =
            classification_prompt(message, history, summary.as_deref(), &catalog_block);

        let request = GenerateRequest::new(messages, self.llm_settings.classification_temperature)
            .with_max_tokens(self.llm_settings.max_tokens)
            .with_schema(converge_llm::classification_schema())
            .with_timeout(Duration::from_millis(self.llm_settings.classification_timeout_ms));

        let raw = match self.llm.generate(&request).await {
            Ok(result) => result.text,
            Err(e) => {
                tracing::warn!(error = %e, "llm classification failed, falling back");
                return None;
            }
        };

        let parsed = match parse_classification(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "llm classification output malformed, falling back");
                return None;
            }
        };

        let mut intents: Vec<ScoredIntent> = parsed
            .intents
            .into_iter()
            .filter_map(|i| {
                IntentKind::parse(&i.intent).map(|intent| ScoredIntent {
                    intent,
                    confidence: i.confidence.clamp(0.0, 1.0),
                    entities: i.entities,
                })
            })
            .collect();
        if intents.is_empty() {
            return None;
        }
        intents.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

        let mut primary = IntentKind::parse(&parsed.primary_intent)
            .unwrap_or(intents[0].intent);
        let mut confidence = intents
            .iter()
            .find(|i| i.intent == primary)
            .map(|i| i.confidence)
            .unwrap_or(intents[0].confidence);

        // Context-aware override: the active intent wins unless the new
        // intent carries strong pattern evidence of its own
        if let Some(state) = active {
            if primary != state.intent && !self.pattern_supports_switch(message, primary) {
                tracing::debug!(
                    llm_intent = %primary,
                    active_intent = %state.intent,
                    "overriding llm classification in favor of active dialog"
                );
                primary = state.intent;
                confidence = intents
                    .iter()
                    .find(|i| i.intent == primary)
                    .map(|i| i.confidence)
                    .unwrap_or(0.75);
            }
        }

        Some(Classification {
            intents,
            primary,
            confidence,
            method: ClassificationMethod::Llm,
            requires_clarification: primary == IntentKind::UnclearIntent,
        })
    }

    fn pattern_supports_switch(&self, message: &str, intent: IntentKind) -> bool {
        self.matcher
            .match_for(message, intent)
            .map(|m| {
                m.confidence >= self.dialog_settings.intent_switch_threshold && m.has_trigger_word
            })
            .unwrap_or(false)
    }

    /// Cheap deterministic entity sweep for the intent's required keys.
    fn pattern_entities(&self, message: &str, intent: IntentKind) -> HashMap<String, String> {
        let today = Local::now().date_naive();
        let mut entities = HashMap::new();
        for key in self.catalog.required_entities(intent) {
            // Free text only counts when the dialog explicitly asks for it
            if key == EntityKey::Description {
                continue;
            }
            if let Some(extraction) = self.entity_patterns.extract(message, key, today) {
                entities.insert(key.as_str().to_string(), extraction.normalized);
            }
        }
        entities
    }

    fn catalog_block(&self) -> String {
        let mut block = String::new();
        for entry in &self.catalog.intents {
            block.push_str(&format!("- {}: {}", entry.kind, entry.display_name));
            if !entry.examples.is_empty() {
                block.push_str(&format!(" (e.g. \"{}\")", entry.examples.join("\", \"")));
            }
            block.push('\n');
        }
        block
    }
}
