//! Slot-filling graph
//!
//! A directed graph of async nodes over a shared [`TurnState`]. Nodes
//! return partial updates; the runtime composes them, applies the
//! per-node timeout, and routes along conditional edges. Node failures
//! and timeouts become graph-state errors routed to `handle_error`,
//! never panics or caller-visible exceptions.
//!
//! ```text
//! classify_intent -> check_follow_up -+-> extract_entity -> validate_entity -+-> update_dialog_state
//!                                     |        |  (miss)          | (invalid) |
//!                                     |        +-> generate_question <--------+
//!                                     +-> determine_needed -+-> handoff / end
//!                                                           +-> generate_question
//! ```

use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use converge_config::{CatalogConfig, DialogSettings};
use converge_core::{
    DialogState, DialogStateKind, EntityKey, Error, IntentKind, Result,
};
use converge_nlu::{EntityPatternExtractor, PatternIntentMatcher};

use crate::classifier::IntentClassifier;
use crate::dialog::DialogStateManager;
use crate::extractor::EntityExtractor;
use crate::question::QuestionGenerator;
use crate::state::{Handoff, StateUpdate, TurnError, TurnState};
use crate::validator::{EntityValidator, ValidationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    ClassifyIntent,
    CheckFollowUp,
    ExtractEntity,
    ValidateEntity,
    UpdateDialogState,
    DetermineNeeded,
    GenerateQuestion,
    HandleError,
    End,
}

impl Node {
    fn name(&self) -> &'static str {
        match self {
            Self::ClassifyIntent => "classify_intent",
            Self::CheckFollowUp => "check_follow_up",
            Self::ExtractEntity => "extract_entity",
            Self::ValidateEntity => "validate_entity",
            Self::UpdateDialogState => "update_dialog_state",
            Self::DetermineNeeded => "determine_needed",
            Self::GenerateQuestion => "generate_question",
            Self::HandleError => "handle_error",
            Self::End => "end",
        }
    }
}

/// The orchestrator.
pub struct SlotFillingGraph {
    classifier: Arc<IntentClassifier>,
    extractor: Arc<EntityExtractor>,
    validator: Arc<EntityValidator>,
    questions: Arc<QuestionGenerator>,
    dialog: Arc<DialogStateManager>,
    matcher: Arc<PatternIntentMatcher>,
    entity_patterns: Arc<EntityPatternExtractor>,
    catalog: Arc<CatalogConfig>,
    settings: DialogSettings,
}

impl SlotFillingGraph {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Arc<IntentClassifier>,
        extractor: Arc<EntityExtractor>,
        validator: Arc<EntityValidator>,
        questions: Arc<QuestionGenerator>,
        dialog: Arc<DialogStateManager>,
        matcher: Arc<PatternIntentMatcher>,
        entity_patterns: Arc<EntityPatternExtractor>,
        catalog: Arc<CatalogConfig>,
        settings: DialogSettings,
    ) -> Self {
        Self {
            classifier,
            extractor,
            validator,
            questions,
            dialog,
            matcher,
            entity_patterns,
            catalog,
            settings,
        }
    }

    /// Run one turn through the graph.
    pub async fn run(&self, mut state: TurnState) -> TurnState {
        let node_timeout = Duration::from_millis(self.settings.node_timeout_ms);
        let mut node = Node::ClassifyIntent;

        while node != Node::End {
            let outcome = tokio::time::timeout(node_timeout, self.execute(node, &state)).await;

            match outcome {
                Ok(Ok(update)) => state.apply(update),
                Ok(Err(e)) => {
                    tracing::warn!(node = node.name(), error = %e, "graph node failed");
                    state.error = Some(TurnError::from_core(&e));
                    if node == Node::HandleError {
                        break;
                    }
                    node = Node::HandleError;
                    continue;
                }
                Err(_) => {
                    tracing::warn!(node = node.name(), "graph node timed out");
                    let e = Error::Timeout(format!("node {}", node.name()));
                    state.error = Some(TurnError::from_core(&e));
                    if node == Node::HandleError {
                        break;
                    }
                    node = Node::HandleError;
                    continue;
                }
            }

            node = self.route(node, &state);
        }

        state
    }

    fn route(&self, from: Node, state: &TurnState) -> Node {
        if state.error.is_some() && from != Node::HandleError {
            return Node::HandleError;
        }
        match from {
            Node::ClassifyIntent => Node::CheckFollowUp,
            Node::CheckFollowUp => {
                if state.is_follow_up
                    && state.follow_up_confidence > self.settings.follow_up_confidence_threshold
                    && state.expected.is_some()
                {
                    Node::ExtractEntity
                } else {
                    Node::DetermineNeeded
                }
            }
            Node::ExtractEntity => {
                if state.extracted.is_some() {
                    Node::ValidateEntity
                } else {
                    // Miss: a synthesized invalid outcome re-asks
                    Node::GenerateQuestion
                }
            }
            Node::ValidateEntity => {
                if state.validation.as_ref().map(|v| v.is_valid).unwrap_or(false) {
                    Node::UpdateDialogState
                } else {
                    Node::GenerateQuestion
                }
            }
            Node::UpdateDialogState => Node::DetermineNeeded,
            Node::DetermineNeeded => {
                if state.handoff.is_some() || state.response.is_some() {
                    Node::End
                } else if state
                    .primary_intent()
                    .map(|i| i.is_conversational())
                    .unwrap_or(true)
                {
                    // Coordinator composes conversational replies
                    Node::End
                } else {
                    Node::GenerateQuestion
                }
            }
            Node::GenerateQuestion | Node::HandleError | Node::End => Node::End,
        }
    }

    async fn execute(&self, node: Node, state: &TurnState) -> Result<StateUpdate> {
        tracing::debug!(node = node.name(), session_id = %state.session_id, "graph node");
        match node {
            Node::ClassifyIntent => self.classify_intent(state).await,
            Node::CheckFollowUp => self.check_follow_up(state).await,
            Node::ExtractEntity => self.extract_entity(state).await,
            Node::ValidateEntity => self.validate_entity(state).await,
            Node::UpdateDialogState => self.update_dialog_state(state).await,
            Node::DetermineNeeded => self.determine_needed(state).await,
            Node::GenerateQuestion => self.generate_question(state).await,
            Node::HandleError => self.handle_error(state).await,
            Node::End => Ok(StateUpdate::default()),
        }
    }

    async fn classify_intent(&self, state: &TurnState) -> Result<StateUpdate> {
        let mut active = self.dialog.get_active(&state.session_id).await?;

        let classification = self
            .classifier
            .classify(&state.message, &state.history, active.as_ref())
            .await;

        // Intent-switch policy: a confident different intent clears the
        // active state before anything else happens
        if let Some(ref current) = active {
            if classification.primary != current.intent
                && classification.confidence >= self.settings.intent_switch_threshold
            {
                tracing::info!(
                    session_id = %state.session_id,
                    from = %current.intent,
                    to = %classification.primary,
                    "intent switch, clearing active dialog state"
                );
                self.dialog.clear(&state.session_id).await?;
                active = None;
            }
        }

        // Merge newly surfaced entities with existing collected values;
        // new values never overwrite unless explicitly re-asked
        let mut collected: HashMap<EntityKey, String> = active
            .as_ref()
            .map(|s| s.collected.clone())
            .unwrap_or_default();
        let required = self.catalog.required_entities(classification.primary);
        if let Some(primary_entities) = classification
            .intents
            .iter()
            .find(|i| i.intent == classification.primary)
            .map(|i| &i.entities)
        {
            let today = Local::now().date_naive();
            for (name, value) in primary_entities {
                let Some(key) = EntityKey::parse(name) else {
                    continue;
                };
                if !required.contains(&key) || collected.contains_key(&key) {
                    continue;
                }
                let normalized = self
                    .entity_patterns
                    .extract(value, key, today)
                    .map(|e| e.normalized)
                    .unwrap_or_else(|| value.clone());
                collected.insert(key, normalized);
            }
        }

        Ok(StateUpdate {
            dialog: Some(active),
            classification: Some(classification),
            collected: Some(collected),
            ..Default::default()
        })
    }

    async fn check_follow_up(&self, state: &TurnState) -> Result<StateUpdate> {
        let check = self
            .dialog
            .is_follow_up(
                &state.message,
                &state.session_id,
                &self.matcher,
                &self.entity_patterns,
            )
            .await?;

        tracing::debug!(
            session_id = %state.session_id,
            is_follow_up = check.is_follow_up,
            confidence = check.confidence,
            reason = %check.reason,
            "follow-up check"
        );

        Ok(StateUpdate {
            is_follow_up: Some(check.is_follow_up),
            follow_up_confidence: Some(check.confidence),
            expected: Some(check.expected),
            ..Default::default()
        })
    }

    async fn extract_entity(&self, state: &TurnState) -> Result<StateUpdate> {
        let key = state
            .expected
            .ok_or_else(|| Error::StateCorruption("extract_entity without expected entity".to_string()))?;

        let today = Local::now().date_naive();
        let extracted = self
            .extractor
            .extract(&state.message, key, &state.collected, today)
            .await;

        match extracted {
            Some(value) => Ok(StateUpdate {
                extracted: Some(Some(value)),
                ..Default::default()
            }),
            None => Ok(StateUpdate {
                extracted: Some(None),
                validation: Some(ValidationOutcome::invalid(
                    key,
                    "",
                    format!("Sorry, I didn't quite catch your {}.", key.display()),
                    Vec::new(),
                )),
                ..Default::default()
            }),
        }
    }

    async fn validate_entity(&self, state: &TurnState) -> Result<StateUpdate> {
        let extracted = state
            .extracted
            .as_ref()
            .ok_or_else(|| Error::StateCorruption("validate_entity without extraction".to_string()))?;

        let today = Local::now().date_naive();
        let outcome = self
            .validator
            .validate(
                extracted.key,
                &extracted.normalized_value,
                state.user_id,
                today,
            )
            .await;

        Ok(StateUpdate {
            validation: Some(outcome),
            ..Default::default()
        })
    }

    async fn update_dialog_state(&self, state: &TurnState) -> Result<StateUpdate> {
        let outcome = state
            .validation
            .as_ref()
            .filter(|v| v.is_valid)
            .ok_or_else(|| Error::StateCorruption("update_dialog_state without valid entity".to_string()))?;

        let updated = self
            .dialog
            .add_entity(&state.session_id, outcome.key, &outcome.normalized_value)
            .await?;

        Ok(StateUpdate {
            collected: Some(updated.collected.clone()),
            dialog: Some(Some(updated)),
            expected: Some(None),
            ..Default::default()
        })
    }

    async fn determine_needed(&self, state: &TurnState) -> Result<StateUpdate> {
        let classification = state
            .classification
            .as_ref()
            .ok_or_else(|| Error::StateCorruption("determine_needed before classification".to_string()))?;
        let primary = classification.primary;

        if primary.is_conversational() {
            return Ok(StateUpdate {
                needed: Some(Vec::new()),
                ..Default::default()
            });
        }

        if primary == IntentKind::PolicyInquiry {
            // No slots and no domain write: hand off immediately
            return Ok(StateUpdate {
                needed: Some(Vec::new()),
                handoff: Some(Handoff {
                    intent: primary,
                    entities: state.collected.clone(),
                    confirmation_nonce: uuid::Uuid::new_v4().to_string(),
                }),
                ..Default::default()
            });
        }

        // Task intent: make sure a dialog state exists and fold in
        // entities surfaced this turn
        let mut dialog: DialogState = match &state.dialog {
            Some(existing) if existing.intent == primary => existing.clone(),
            _ => self
                .dialog
                .create(&state.session_id, state.user_id, primary)
                .await?,
        };
        for (key, value) in &state.collected {
            if dialog.required.contains(key) && !dialog.collected.contains_key(key) {
                dialog = self
                    .dialog
                    .add_entity(&state.session_id, *key, value)
                    .await?;
            }
        }

        let needed = dialog.needed();

        // Complete and confirmed: hand off to the task agent
        if needed.is_empty() && dialog.kind == DialogStateKind::AwaitingConfirmation {
            if self.matcher.is_affirmative(&state.message) {
                let completed = self
                    .dialog
                    .transition(&state.session_id, DialogStateKind::Completed)
                    .await?;
                return Ok(StateUpdate {
                    needed: Some(Vec::new()),
                    handoff: Some(Handoff {
                        intent: primary,
                        entities: completed.collected.clone(),
                        confirmation_nonce: completed.confirmation_nonce.clone(),
                    }),
                    collected: Some(completed.collected.clone()),
                    dialog: Some(Some(completed)),
                    ..Default::default()
                });
            }
            if self.matcher.is_negative(&state.message) {
                let cancelled = self
                    .dialog
                    .transition(&state.session_id, DialogStateKind::Cancelled)
                    .await?;
                return Ok(StateUpdate {
                    needed: Some(Vec::new()),
                    response: Some(self.questions.cancelled_prompt()),
                    dialog: Some(Some(cancelled)),
                    ..Default::default()
                });
            }
        }

        Ok(StateUpdate {
            collected: Some(dialog.collected.clone()),
            needed: Some(needed),
            dialog: Some(Some(dialog)),
            ..Default::default()
        })
    }

    async fn generate_question(&self, state: &TurnState) -> Result<StateUpdate> {
        let Some(dialog) = state.dialog.clone() else {
            // No slot-filling in progress; a gentle clarification
            return Ok(StateUpdate {
                response: Some(
                    "Could you tell me a bit more about what you need help with?".to_string(),
                ),
                ..Default::default()
            });
        };
        let intent = dialog.intent;

        // Failed validation: retry or escalate
        if let Some(outcome) = state.validation.as_ref().filter(|v| !v.is_valid) {
            let key = outcome.key;
            let retries = self.dialog.increment_retry(&state.session_id, key).await?;
            if retries >= self.settings.max_entity_retries {
                let cancelled = self
                    .dialog
                    .transition(&state.session_id, DialogStateKind::Cancelled)
                    .await?;
                tracing::info!(
                    session_id = %state.session_id,
                    entity = %key,
                    retries,
                    "retry limit reached, escalating"
                );
                return Ok(StateUpdate {
                    response: Some(self.questions.escalation_prompt()),
                    dialog: Some(Some(cancelled)),
                    ..Default::default()
                });
            }

            let updated = self.dialog.set_expected(&state.session_id, key).await?;
            let response = self.questions.validation_error_prompt(outcome).await;
            self.dialog
                .set_context(&state.session_id, "last_question", &response)
                .await?;
            return Ok(StateUpdate {
                response: Some(response),
                expected: Some(Some(key)),
                dialog: Some(Some(updated)),
                ..Default::default()
            });
        }

        // Everything collected: summarize and ask for confirmation
        if state.needed.is_empty() {
            let updated = if dialog.kind == DialogStateKind::AwaitingConfirmation {
                dialog
            } else {
                self.dialog
                    .transition(&state.session_id, DialogStateKind::AwaitingConfirmation)
                    .await?
            };
            let response = self
                .questions
                .confirmation_prompt(intent, &updated.required, &updated.collected)
                .await;
            self.dialog
                .set_context(&state.session_id, "last_question", &response)
                .await?;
            return Ok(StateUpdate {
                response: Some(response),
                dialog: Some(Some(updated)),
                ..Default::default()
            });
        }

        // Ask for the next needed entity
        let next = state.needed[0];
        let updated = self.dialog.set_expected(&state.session_id, next).await?;
        let retry_count = updated.retry_count(next);
        let response = self
            .questions
            .slot_question(intent, next, &updated.collected, retry_count)
            .await;
        self.dialog
            .set_context(&state.session_id, "last_question", &response)
            .await?;

        Ok(StateUpdate {
            response: Some(response),
            expected: Some(Some(next)),
            dialog: Some(Some(updated)),
            ..Default::default()
        })
    }

    async fn handle_error(&self, state: &TurnState) -> Result<StateUpdate> {
        let kind = state.error.as_ref().map(|e| e.kind).unwrap_or("unknown");

        // State corruption is fatal for the dialog: clear and restart
        if kind == "state_corruption" {
            if let Err(e) = self.dialog.clear(&state.session_id).await {
                tracing::warn!(error = %e, "failed to clear corrupted dialog state");
            }
            return Ok(StateUpdate {
                response: Some(
                    "I'm sorry — I lost track of our conversation, so I've reset it. \
Could we start that request over?"
                        .to_string(),
                ),
                dialog: Some(None),
                ..Default::default()
            });
        }

        Ok(StateUpdate {
            response: Some(
                "I'm sorry, something went wrong on my side. Could you try that once more?"
                    .to_string(),
            ),
            ..Default::default()
        })
    }
}
