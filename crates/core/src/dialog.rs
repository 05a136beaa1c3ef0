//! Dialog state: the per-session slot-filling record
//!
//! At most one active state exists per session. The state machine:
//!
//! ```text
//! idle -> collecting_info -> awaiting_confirmation -> completed
//!              |    ^                |
//!              v    |                v
//!        collecting_info       collecting_info | cancelled
//! ```
//!
//! Terminal kinds (completed, cancelled) are immutable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::entity::EntityKey;
use crate::intent::IntentKind;
use crate::{Error, Result};

/// Lifecycle kind of a dialog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogStateKind {
    Idle,
    CollectingInfo,
    AwaitingConfirmation,
    Completed,
    Cancelled,
}

impl DialogStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CollectingInfo => "collecting_info",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Legal transition table. Terminal kinds accept nothing.
    pub fn can_transition_to(&self, next: DialogStateKind) -> bool {
        use DialogStateKind::*;
        match self {
            Idle => matches!(next, CollectingInfo),
            CollectingInfo => matches!(next, AwaitingConfirmation | CollectingInfo | Cancelled),
            AwaitingConfirmation => matches!(next, Completed | CollectingInfo | Cancelled),
            Completed | Cancelled => false,
        }
    }
}

/// Default idle expiry for an active dialog state.
pub const DEFAULT_STATE_TTL_MINUTES: i64 = 30;

/// Per-session slot-filling state.
///
/// Invariants (checked by [`DialogState::check_invariants`]):
/// - the expected entity, when set, appears in `required`
/// - collected keys and still-needed keys partition `required`
/// - `awaiting_confirmation` may only hold when nothing is needed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogState {
    pub session_id: String,
    pub user_id: i64,
    pub intent: IntentKind,
    pub kind: DialogStateKind,
    /// Ordered list of entity keys this intent requires
    pub required: Vec<EntityKey>,
    /// Normalized values collected so far
    pub collected: HashMap<EntityKey, String>,
    /// Entity most recently asked for
    pub expected: Option<EntityKey>,
    /// Retry counts per entity
    pub retries: HashMap<EntityKey, u32>,
    /// Free-form context bag (last question text, ...)
    pub context: HashMap<String, String>,
    /// Idempotence key for the eventual domain write
    pub confirmation_nonce: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DialogState {
    pub fn new(
        session_id: impl Into<String>,
        user_id: i64,
        intent: IntentKind,
        required: Vec<EntityKey>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id,
            intent,
            kind: DialogStateKind::CollectingInfo,
            required,
            collected: HashMap::new(),
            expected: None,
            retries: HashMap::new(),
            context: HashMap::new(),
            confirmation_nonce: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::minutes(DEFAULT_STATE_TTL_MINUTES),
        }
    }

    /// Required keys not yet collected, in required order.
    pub fn needed(&self) -> Vec<EntityKey> {
        self.required
            .iter()
            .filter(|k| !self.collected.contains_key(k))
            .copied()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.needed().is_empty()
    }

    pub fn is_active(&self) -> bool {
        !self.kind.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn retry_count(&self, key: EntityKey) -> u32 {
        self.retries.get(&key).copied().unwrap_or(0)
    }

    /// Refresh activity timestamps after a mutation.
    pub fn touch(&mut self, ttl_minutes: i64) {
        let now = Utc::now();
        self.updated_at = now;
        self.expires_at = now + Duration::minutes(ttl_minutes);
    }

    /// Verify the structural invariants.
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(expected) = self.expected {
            if !self.required.contains(&expected) {
                return Err(Error::StateCorruption(format!(
                    "expected entity {} not in required list for {}",
                    expected, self.intent
                )));
            }
        }
        for key in self.collected.keys() {
            if !self.required.contains(key) {
                return Err(Error::StateCorruption(format!(
                    "collected entity {} not in required list for {}",
                    key, self.intent
                )));
            }
        }
        if self.kind == DialogStateKind::AwaitingConfirmation && !self.is_complete() {
            return Err(Error::StateCorruption(
                "awaiting_confirmation with entities still needed".to_string(),
            ));
        }
        Ok(())
    }

    /// One-line summary for classifier prompts and logs.
    pub fn summary(&self) -> String {
        let collected: Vec<String> = self
            .required
            .iter()
            .filter_map(|k| self.collected.get(k).map(|v| format!("{}={}", k, v)))
            .collect();
        let needed: Vec<&str> = self.needed().iter().map(|k| k.as_str()).collect();
        format!(
            "intent={} state={} collected=[{}] needed=[{}] expecting={}",
            self.intent,
            self.kind.as_str(),
            collected.join(", "),
            needed.join(", "),
            self.expected.map(|k| k.as_str()).unwrap_or("none"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_state() -> DialogState {
        DialogState::new(
            "sess-1",
            42,
            IntentKind::BookingCreate,
            vec![
                EntityKey::ServiceType,
                EntityKey::PreferredDate,
                EntityKey::PreferredTime,
                EntityKey::Location,
            ],
        )
    }

    #[test]
    fn test_needed_preserves_required_order() {
        let mut state = booking_state();
        state
            .collected
            .insert(EntityKey::PreferredDate, "2026-08-02".to_string());
        assert_eq!(
            state.needed(),
            vec![EntityKey::ServiceType, EntityKey::PreferredTime, EntityKey::Location]
        );
    }

    #[test]
    fn test_transition_table() {
        use DialogStateKind::*;
        assert!(Idle.can_transition_to(CollectingInfo));
        assert!(CollectingInfo.can_transition_to(AwaitingConfirmation));
        assert!(CollectingInfo.can_transition_to(CollectingInfo));
        assert!(AwaitingConfirmation.can_transition_to(Completed));
        assert!(AwaitingConfirmation.can_transition_to(CollectingInfo));
        assert!(AwaitingConfirmation.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(CollectingInfo));
        assert!(!Cancelled.can_transition_to(CollectingInfo));
        assert!(!Idle.can_transition_to(Completed));
    }

    #[test]
    fn test_invariant_expected_in_required() {
        let mut state = booking_state();
        state.expected = Some(EntityKey::PreferredDate);
        assert!(state.check_invariants().is_ok());

        state.expected = Some(EntityKey::PaymentMethod);
        assert!(matches!(
            state.check_invariants(),
            Err(Error::StateCorruption(_))
        ));
    }

    #[test]
    fn test_invariant_confirmation_requires_complete() {
        let mut state = booking_state();
        state.kind = DialogStateKind::AwaitingConfirmation;
        assert!(state.check_invariants().is_err());

        for key in state.required.clone() {
            state.collected.insert(key, "x".to_string());
        }
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_expiry() {
        let mut state = booking_state();
        assert!(!state.is_expired(Utc::now()));
        state.expires_at = Utc::now() - Duration::minutes(1);
        assert!(state.is_expired(Utc::now()));
    }

    #[test]
    fn test_summary_mentions_expecting() {
        let mut state = booking_state();
        state.expected = Some(EntityKey::PreferredDate);
        let summary = state.summary();
        assert!(summary.contains("expecting=preferred_date"));
        assert!(summary.contains("booking_create"));
    }
}
