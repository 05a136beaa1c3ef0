//! Shared turn state for the slot-filling graph
//!
//! Nodes are pure async functions of `&TurnState -> StateUpdate`; the
//! graph runtime composes the updates. Nodes never mutate the state
//! directly.

use std::collections::HashMap;

use converge_core::{DialogState, EntityKey, EntityValue, HistoryMessage, IntentKind};

use crate::classifier::Classification;
use crate::validator::ValidationOutcome;

/// Error recorded inside the graph state.
#[derive(Debug, Clone)]
pub struct TurnError {
    /// Stable tag (mirrors the core error taxonomy)
    pub kind: &'static str,
    pub message: String,
}

impl TurnError {
    pub fn from_core(err: &converge_core::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Completed slot set handed to a task or policy agent.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub intent: IntentKind,
    pub entities: HashMap<EntityKey, String>,
    /// Idempotence key; task agents write at most once per
    /// `(session_id, nonce)`
    pub confirmation_nonce: String,
}

/// The shared state object the graph runs over.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub message: String,
    pub session_id: String,
    pub user_id: i64,
    pub history: Vec<HistoryMessage>,
    /// Active dialog state, loaded by `classify_intent`
    pub dialog: Option<DialogState>,
    pub classification: Option<Classification>,
    pub is_follow_up: bool,
    pub follow_up_confidence: f32,
    /// Entity the active dialog expects an answer for
    pub expected: Option<EntityKey>,
    pub extracted: Option<EntityValue>,
    pub validation: Option<ValidationOutcome>,
    /// Graph-local view of collected entities (dialog ∪ this turn)
    pub collected: HashMap<EntityKey, String>,
    pub needed: Vec<EntityKey>,
    pub response: Option<String>,
    pub error: Option<TurnError>,
    pub handoff: Option<Handoff>,
}

impl TurnState {
    pub fn new(
        message: impl Into<String>,
        session_id: impl Into<String>,
        user_id: i64,
        history: Vec<HistoryMessage>,
    ) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            user_id,
            history,
            dialog: None,
            classification: None,
            is_follow_up: false,
            follow_up_confidence: 0.0,
            expected: None,
            extracted: None,
            validation: None,
            collected: HashMap::new(),
            needed: Vec::new(),
            response: None,
            error: None,
            handoff: None,
        }
    }

    pub fn primary_intent(&self) -> Option<IntentKind> {
        self.classification.as_ref().map(|c| c.primary)
    }

    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(dialog) = update.dialog {
            self.dialog = dialog;
        }
        if let Some(classification) = update.classification {
            self.classification = Some(classification);
        }
        if let Some(is_follow_up) = update.is_follow_up {
            self.is_follow_up = is_follow_up;
        }
        if let Some(confidence) = update.follow_up_confidence {
            self.follow_up_confidence = confidence;
        }
        if let Some(expected) = update.expected {
            self.expected = expected;
        }
        if let Some(extracted) = update.extracted {
            self.extracted = extracted;
        }
        if let Some(validation) = update.validation {
            self.validation = Some(validation);
        }
        if let Some(collected) = update.collected {
            self.collected = collected;
        }
        if let Some(needed) = update.needed {
            self.needed = needed;
        }
        if let Some(response) = update.response {
            self.response = Some(response);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(handoff) = update.handoff {
            self.handoff = Some(handoff);
        }
    }
}

/// Partial update returned by a node. `None` leaves a field untouched;
/// double-options distinguish "set to none" from "leave alone".
#[derive(Debug, Default)]
pub struct StateUpdate {
    pub dialog: Option<Option<DialogState>>,
    pub classification: Option<Classification>,
    pub is_follow_up: Option<bool>,
    pub follow_up_confidence: Option<f32>,
    pub expected: Option<Option<EntityKey>>,
    pub extracted: Option<Option<EntityValue>>,
    pub validation: Option<ValidationOutcome>,
    pub collected: Option<HashMap<EntityKey, String>>,
    pub needed: Option<Vec<EntityKey>>,
    pub response: Option<String>,
    pub error: Option<TurnError>,
    pub handoff: Option<Handoff>,
}

impl StateUpdate {
    pub fn error(err: &converge_core::Error) -> Self {
        Self {
            error: Some(TurnError::from_core(err)),
            ..Default::default()
        }
    }
}
