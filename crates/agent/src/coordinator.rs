//! Coordinator agent
//!
//! The single entry point from the outside. Persists the inbound turn,
//! runs the slot-filling graph, dispatches completed slot sets to the
//! owning task agent (or the policy agent), composes conversational
//! replies itself, enforces the low-confidence review rule, and
//! persists the assistant turn with full metadata.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use converge_config::{CatalogConfig, DialogSettings, LlmSettings};
use converge_core::{
    AgentKind, AgentReply, ClassificationMethod, ConversationTurn, InboundMessage, IntentKind,
    Provenance, QualityScores, ReplyMetadata, Result, ScoredIntent,
};
use converge_llm::{persona_prompt, GenerateRequest, LlmBackend};
use converge_rag::{namespaces, PolicyAgent, PolicyAnswer};
use converge_persistence::ConversationTurnStore;

use crate::graph::SlotFillingGraph;
use crate::review::ReviewService;
use crate::state::TurnState;
use crate::tasks::{TaskAgent, TaskRequest};

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub dialog: DialogSettings,
    pub llm: LlmSettings,
    /// Namespace policy questions retrieve from
    pub policy_namespace: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            dialog: DialogSettings::default(),
            llm: LlmSettings::default(),
            policy_namespace: namespaces::POLICIES.to_string(),
        }
    }
}

/// The single entry point for one conversation turn.
pub struct Coordinator {
    graph: SlotFillingGraph,
    turns: Arc<dyn ConversationTurnStore>,
    review: Arc<ReviewService>,
    task_agents: HashMap<AgentKind, Arc<dyn TaskAgent>>,
    policy: Arc<PolicyAgent>,
    llm: Arc<dyn LlmBackend>,
    catalog: Arc<CatalogConfig>,
    config: CoordinatorConfig,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: SlotFillingGraph,
        turns: Arc<dyn ConversationTurnStore>,
        review: Arc<ReviewService>,
        task_agents: Vec<Arc<dyn TaskAgent>>,
        policy: Arc<PolicyAgent>,
        llm: Arc<dyn LlmBackend>,
        catalog: Arc<CatalogConfig>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            graph,
            turns,
            review,
            task_agents: task_agents.into_iter().map(|a| (a.kind(), a)).collect(),
            policy,
            llm,
            catalog,
            config,
        }
    }

    /// Handle one inbound message.
    ///
    /// The only errors surfaced to the caller are the inbound shape
    /// check and failure to persist the turn; everything else resolves
    /// to a polite response inside the reply.
    pub async fn handle(&self, inbound: InboundMessage) -> Result<AgentReply> {
        inbound.validate()?;
        let started = Instant::now();

        let session_id = inbound
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let history = match &inbound.history {
            Some(history) => history.clone(),
            None => self
                .turns
                .recent(&session_id, self.config.dialog.history_window)
                .await
                .map(|turns| turns.iter().map(|t| t.history_message()).collect())
                .unwrap_or_default(),
        };

        self.turns
            .append(&ConversationTurn::user(
                &session_id,
                inbound.user_id,
                &inbound.message,
            ))
            .await?;

        // Run the graph under the whole-turn budget
        let turn_state = TurnState::new(
            &inbound.message,
            &session_id,
            inbound.user_id,
            history,
        );
        let state = match tokio::time::timeout(
            Duration::from_millis(self.config.dialog.turn_timeout_ms),
            self.graph.run(turn_state),
        )
        .await
        {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!(session_id = %session_id, "turn exceeded its budget");
                let mut state =
                    TurnState::new(&inbound.message, &session_id, inbound.user_id, Vec::new());
                state.response = Some(
                    "I'm sorry, that took longer than it should have. Could you try again?"
                        .to_string(),
                );
                state
            }
        };

        let reply = self.compose(&inbound, &session_id, state, started).await?;
        Ok(reply)
    }

    async fn compose(
        &self,
        inbound: &InboundMessage,
        session_id: &str,
        state: TurnState,
        started: Instant,
    ) -> Result<AgentReply> {
        let classification = state.classification.clone();
        let (primary, confidence, method, requires_clarification, all_intents) =
            match &classification {
                Some(c) => (
                    c.primary,
                    c.confidence,
                    c.method,
                    c.requires_clarification,
                    c.intents.clone(),
                ),
                None => (
                    IntentKind::UnclearIntent,
                    0.5,
                    ClassificationMethod::Fallback,
                    true,
                    Vec::new(),
                ),
            };

        let mut agents_used: Vec<String> = Vec::new();
        let mut provenance = Provenance::default();
        let mut grounding_score = None;
        let mut citations = Vec::new();
        let mut flagged_for_review = false;
        let mut review_reasons: Vec<String> = Vec::new();

        let response = if let Some(handoff) = &state.handoff {
            if handoff.intent == IntentKind::PolicyInquiry {
                let answer = self
                    .policy
                    .answer(&inbound.message, &self.config.policy_namespace, None)
                    .await;
                agents_used.push(AgentKind::Policy.as_str().to_string());
                self.absorb_policy_answer(
                    &answer,
                    &mut provenance,
                    &mut grounding_score,
                    &mut citations,
                    &mut flagged_for_review,
                );
                let mut text = answer.response;

                // Secondary intents ride along in priority order
                let extra = self
                    .secondary_responses(inbound, primary, &all_intents, &mut agents_used)
                    .await;
                if !extra.is_empty() {
                    text = format!("{}\n\n{}", text, extra.join("\n\n"));
                }
                text
            } else {
                let agent_kind = self.catalog.agent_for(handoff.intent);
                let request = TaskRequest {
                    intent: handoff.intent,
                    entities: handoff.entities.clone(),
                    user_id: inbound.user_id,
                    session_id: session_id.to_string(),
                    confirmation_nonce: handoff.confirmation_nonce.clone(),
                    confidence,
                };

                let mut text = match self.task_agents.get(&agent_kind) {
                    Some(agent) => match agent.execute(&request).await {
                        Ok(outcome) => {
                            agents_used.push(agent_kind.as_str().to_string());
                            provenance.merge(outcome.provenance);
                            if let Some(reason) = outcome.needs_review {
                                review_reasons.push(reason);
                            }
                            outcome.response
                        }
                        Err(e) => {
                            tracing::error!(agent = %agent_kind, error = %e, "task agent failed");
                            review_reasons.push(format!("task agent failure: {}", e.kind()));
                            "I'm sorry — I couldn't complete that just now. Your request is \
saved, so please try again in a moment."
                                .to_string()
                        }
                    },
                    None => {
                        tracing::error!(agent = %agent_kind, "no task agent registered");
                        "I'm sorry — I can't complete that request right now.".to_string()
                    }
                };

                let extra = self
                    .secondary_responses(inbound, primary, &all_intents, &mut agents_used)
                    .await;
                if !extra.is_empty() {
                    text = format!("{}\n\n{}", text, extra.join("\n\n"));
                }
                text
            }
        } else if let Some(response) = state.response.clone() {
            // Question, confirmation, cancellation or error text from
            // the graph
            response
        } else {
            agents_used.push(AgentKind::Coordinator.as_str().to_string());
            self.conversational_reply(primary, &inbound.message).await
        };

        // Every published turn has a non-empty response
        let response = if response.trim().is_empty() {
            tracing::error!(session_id, intent = %primary, "empty response composed");
            "I'm here to help with home services — what would you like to do?".to_string()
        } else {
            response
        };

        // Low-confidence classifications either clarify or queue for
        // review. Slot-filling questions, validation re-asks and
        // confirmations all count as clarifications.
        let asked_question = state.response.is_some() && state.error.is_none();
        let is_clarification =
            requires_clarification || asked_question || response.trim_end().ends_with('?');
        if confidence < self.config.dialog.review_confidence_threshold && !is_clarification {
            review_reasons.push("low classification confidence".to_string());
        }
        for reason in &review_reasons {
            if let Err(e) = self
                .review
                .enqueue(
                    inbound.user_id,
                    session_id,
                    primary,
                    confidence,
                    &inbound.message,
                    reason,
                )
                .await
            {
                tracing::warn!(error = %e, "failed to enqueue review entry");
            }
        }

        let response_time_ms = started.elapsed().as_millis() as u64;
        let mut assistant_turn =
            ConversationTurn::assistant(session_id, inbound.user_id, response.clone());
        assistant_turn.intent = Some(primary);
        assistant_turn.confidence = Some(confidence);
        assistant_turn.agents = agents_used.clone();
        assistant_turn.provenance = provenance.clone();
        assistant_turn.scores = Some(QualityScores {
            grounding: grounding_score,
            faithfulness: None,
            relevancy: None,
            response_time_ms,
        });
        assistant_turn.flagged_for_review = flagged_for_review;
        self.turns.append(&assistant_turn).await?;

        tracing::info!(
            session_id,
            intent = %primary,
            confidence,
            method = method.as_str(),
            agents = ?agents_used,
            response_time_ms,
            "turn complete"
        );

        let collected_entities: HashMap<String, String> = state
            .collected
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect();

        Ok(AgentReply {
            session_id: session_id.to_string(),
            response,
            intent: primary,
            confidence,
            agent_used: if agents_used.is_empty() {
                vec![AgentKind::Coordinator.as_str().to_string()]
            } else {
                agents_used
            },
            metadata: ReplyMetadata {
                all_intents,
                classification_method: method,
                collected_entities,
                needed_entities: state.needed.iter().map(|k| k.as_str().to_string()).collect(),
                should_trigger_agent: state.handoff.is_some(),
                provenance,
                grounding_score,
                citations,
            },
        })
    }

    fn absorb_policy_answer(
        &self,
        answer: &PolicyAnswer,
        provenance: &mut Provenance,
        grounding_score: &mut Option<f32>,
        citations: &mut Vec<converge_core::Citation>,
        flagged: &mut bool,
    ) {
        *grounding_score = answer.grounding_score;
        *citations = answer.citations.clone();
        *flagged = *flagged || answer.flagged_for_review;
        for citation in &answer.citations {
            provenance.chunks.push(citation.chunk_id.clone());
        }
    }

    /// Responses for secondary classified intents, highest catalog
    /// priority first. Policy questions are answered inline; task
    /// intents get a hand-back line (their slot-filling starts on the
    /// user's next message).
    async fn secondary_responses(
        &self,
        inbound: &InboundMessage,
        primary: IntentKind,
        all_intents: &[ScoredIntent],
        agents_used: &mut Vec<String>,
    ) -> Vec<String> {
        let mut secondary: Vec<&ScoredIntent> = all_intents
            .iter()
            .filter(|i| {
                i.intent != primary
                    && !i.intent.is_conversational()
                    && i.confidence >= self.config.dialog.review_confidence_threshold
            })
            .collect();
        secondary.sort_by_key(|i| std::cmp::Reverse(self.catalog.priority(i.intent)));

        let mut parts = Vec::new();
        for scored in secondary {
            match scored.intent {
                IntentKind::PolicyInquiry => {
                    let answer = self
                        .policy
                        .answer(&inbound.message, &self.config.policy_namespace, None)
                        .await;
                    if !answer.no_information {
                        agents_used.push(AgentKind::Policy.as_str().to_string());
                        parts.push(format!("Also — {}", answer.response));
                    }
                }
                intent => {
                    let display = self
                        .catalog
                        .get(intent)
                        .map(|e| e.display_name.to_lowercase())
                        .unwrap_or_else(|| intent.to_string());
                    parts.push(format!(
                        "And about the other thing — I can help you {} right after this; \
just say the word.",
                        display
                    ));
                }
            }
        }
        parts
    }

    /// Conversational reply for coordinator-owned intents: warm persona
    /// via the LLM with a static fallback, never blocking on a prompt
    /// timeout.
    async fn conversational_reply(&self, intent: IntentKind, message: &str) -> String {
        let fallback = self.static_reply(intent, message);
        let instruction = match intent {
            IntentKind::Greeting => {
                "Greet the customer briefly and offer to help with booking home services, \
checking on bookings, or policy questions."
                    .to_string()
            }
            IntentKind::GeneralQuery => format!(
                "Answer briefly: we offer AC service, plumbing, home cleaning, electrical work \
and pest control from verified professionals. The customer asked: {}",
                message
            ),
            IntentKind::OutOfScope => format!(
                "The customer asked something outside home services: \"{}\". Decline warmly, \
say what you can help with instead.",
                message
            ),
            _ => format!(
                "You couldn't tell what the customer wants from: \"{}\". Ask one short \
clarifying question offering booking, cancellation, complaints or policy questions.",
                message
            ),
        };

        let request = GenerateRequest::new(
            persona_prompt(&instruction),
            self.config.llm.generation_temperature,
        )
        .with_max_tokens(256)
        .with_timeout(Duration::from_millis(self.config.llm.generation_timeout_ms));

        match self.llm.generate(&request).await {
            Ok(result) if !result.text.trim().is_empty() => result.text.trim().to_string(),
            _ => fallback,
        }
    }

    fn static_reply(&self, intent: IntentKind, message: &str) -> String {
        match intent {
            IntentKind::Greeting => "Hi! I can help you book home services like AC repair, \
plumbing and cleaning, check on a booking, or answer policy questions. What do you need?"
                .to_string(),
            IntentKind::GeneralQuery => "We connect you with verified professionals for AC \
service, plumbing, home cleaning, electrical work and pest control. Which one can I set up \
for you?"
                .to_string(),
            IntentKind::OutOfScope => format!(
                "I help with home services; I can't {}, but I can help you book AC repair, \
cleaning, and more.",
                out_of_scope_phrase(message)
            ),
            _ => "I didn't quite catch that — are you looking to book a service, cancel a \
booking, or file a complaint?"
                .to_string(),
        }
    }
}

/// Phrase the declined topic naturally in the out-of-scope reply.
fn out_of_scope_phrase(message: &str) -> &'static str {
    let lowered = message.to_lowercase();
    if lowered.contains("weather") {
        "check the weather"
    } else if lowered.contains("joke") {
        "tell jokes"
    } else if lowered.contains("news") || lowered.contains("election") {
        "cover the news"
    } else if lowered.contains("movie") || lowered.contains("song") {
        "make entertainment picks"
    } else if lowered.contains("cricket") || lowered.contains("football") || lowered.contains("stock") {
        "track scores or markets"
    } else if lowered.contains("recipe") {
        "share recipes"
    } else {
        "help with that"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_scope_phrasing() {
        assert_eq!(out_of_scope_phrase("What is the weather today?"), "check the weather");
        assert_eq!(out_of_scope_phrase("tell me a joke"), "tell jokes");
        assert_eq!(out_of_scope_phrase("paint my fence"), "help with that");
    }
}
