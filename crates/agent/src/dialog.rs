//! Dialog state manager
//!
//! The sole owner of dialog-state lifecycle and the only component that
//! persists it. All operations are idempotent; concurrent writers to
//! the same session resolve by last-write-wins on `updated_at` inside
//! the store.

use chrono::{Local, Utc};
use std::sync::Arc;

use converge_config::{CatalogConfig, DialogSettings};
use converge_core::{DialogState, DialogStateKind, EntityKey, Error, IntentKind, Result};
use converge_nlu::{EntityPatternExtractor, PatternIntentMatcher};
use converge_persistence::DialogStateStore;

/// Follow-up detection result.
#[derive(Debug, Clone)]
pub struct FollowUpCheck {
    pub is_follow_up: bool,
    pub expected: Option<EntityKey>,
    pub confidence: f32,
    pub reason: String,
}

impl FollowUpCheck {
    fn no(reason: impl Into<String>) -> Self {
        Self {
            is_follow_up: false,
            expected: None,
            confidence: 0.0,
            reason: reason.into(),
        }
    }
}

/// Owner of dialog state lifecycle.
pub struct DialogStateManager {
    store: Arc<dyn DialogStateStore>,
    catalog: Arc<CatalogConfig>,
    settings: DialogSettings,
}

impl DialogStateManager {
    pub fn new(
        store: Arc<dyn DialogStateStore>,
        catalog: Arc<CatalogConfig>,
        settings: DialogSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
        }
    }

    /// The active (non-terminal, non-expired) state for a session.
    /// Expired states are lazily cleared.
    pub async fn get_active(&self, session_id: &str) -> Result<Option<DialogState>> {
        let Some(state) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        if !state.is_active() {
            return Ok(None);
        }
        if state.is_expired(Utc::now()) {
            tracing::debug!(session_id, "dialog state expired, clearing");
            self.store.delete(session_id).await?;
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Create a fresh collecting_info state for an intent. Any prior
    /// state for the session is replaced.
    pub async fn create(
        &self,
        session_id: &str,
        user_id: i64,
        intent: IntentKind,
    ) -> Result<DialogState> {
        let required = self.catalog.required_entities(intent);
        let mut state = DialogState::new(session_id, user_id, intent, required);
        state.touch(self.settings.state_ttl_minutes);
        self.store.put(&state).await?;
        tracing::info!(session_id, intent = %intent, "dialog state created");
        Ok(state)
    }

    /// Record a collected entity value.
    pub async fn add_entity(
        &self,
        session_id: &str,
        key: EntityKey,
        value: &str,
    ) -> Result<DialogState> {
        let mut state = self.require_active(session_id).await?;
        if !state.required.contains(&key) {
            return Err(Error::StateCorruption(format!(
                "entity {} not required by {}",
                key, state.intent
            )));
        }
        state.collected.insert(key, value.to_string());
        if state.expected == Some(key) {
            state.expected = None;
        }
        state.touch(self.settings.state_ttl_minutes);
        state.check_invariants()?;
        self.store.put(&state).await?;
        Ok(state)
    }

    /// Mark the entity the next question asks for.
    pub async fn set_expected(&self, session_id: &str, key: EntityKey) -> Result<DialogState> {
        let mut state = self.require_active(session_id).await?;
        if !state.required.contains(&key) {
            return Err(Error::StateCorruption(format!(
                "cannot expect {}: not required by {}",
                key, state.intent
            )));
        }
        state.expected = Some(key);
        state.touch(self.settings.state_ttl_minutes);
        self.store.put(&state).await?;
        Ok(state)
    }

    /// Bump the retry counter for an entity; returns the new count.
    pub async fn increment_retry(&self, session_id: &str, key: EntityKey) -> Result<u32> {
        let mut state = self.require_active(session_id).await?;
        let count = state.retries.entry(key).or_insert(0);
        *count += 1;
        let count = *count;
        state.touch(self.settings.state_ttl_minutes);
        self.store.put(&state).await?;
        Ok(count)
    }

    /// Remember free-form context (last question text, ...).
    pub async fn set_context(
        &self,
        session_id: &str,
        key: &str,
        value: &str,
    ) -> Result<DialogState> {
        let mut state = self.require_active(session_id).await?;
        state.context.insert(key.to_string(), value.to_string());
        state.touch(self.settings.state_ttl_minutes);
        self.store.put(&state).await?;
        Ok(state)
    }

    /// Transition to a new kind; illegal transitions are state
    /// corruption.
    pub async fn transition(
        &self,
        session_id: &str,
        new_kind: DialogStateKind,
    ) -> Result<DialogState> {
        let mut state = self.require_active(session_id).await?;
        if !state.kind.can_transition_to(new_kind) {
            return Err(Error::StateCorruption(format!(
                "illegal transition {} -> {}",
                state.kind.as_str(),
                new_kind.as_str()
            )));
        }
        if new_kind == DialogStateKind::AwaitingConfirmation {
            state.check_invariants()?;
            if !state.is_complete() {
                return Err(Error::StateCorruption(
                    "confirmation requires all entities collected".to_string(),
                ));
            }
        }
        tracing::debug!(
            session_id,
            from = state.kind.as_str(),
            to = new_kind.as_str(),
            "dialog state transition"
        );
        state.kind = new_kind;
        state.touch(self.settings.state_ttl_minutes);
        self.store.put(&state).await?;
        Ok(state)
    }

    /// End the active state (intent switch or explicit cancel).
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        self.store.delete(session_id).await?;
        tracing::debug!(session_id, "dialog state cleared");
        Ok(())
    }

    /// Follow-up detection: the message answers the pending question
    /// iff an active collecting_info state expects an entity and the
    /// message does not match a high-confidence pattern for a different
    /// intent. Low-confidence follow-ups still defer to the classifier
    /// for a second opinion downstream.
    pub async fn is_follow_up(
        &self,
        message: &str,
        session_id: &str,
        matcher: &PatternIntentMatcher,
        extractor: &EntityPatternExtractor,
    ) -> Result<FollowUpCheck> {
        let Some(state) = self.get_active(session_id).await? else {
            return Ok(FollowUpCheck::no("no active dialog state"));
        };
        if state.kind != DialogStateKind::CollectingInfo {
            return Ok(FollowUpCheck::no(format!(
                "dialog state is {}, not collecting_info",
                state.kind.as_str()
            )));
        }
        let Some(expected) = state.expected else {
            return Ok(FollowUpCheck::no("no expected entity"));
        };

        // A strong pattern for a different intent vetoes the follow-up
        if let Some(other) = matcher
            .scan(message)
            .into_iter()
            .find(|m| m.intent != state.intent)
        {
            if other.confidence >= self.settings.intent_switch_threshold {
                return Ok(FollowUpCheck {
                    is_follow_up: false,
                    expected: Some(expected),
                    confidence: 0.0,
                    reason: format!(
                        "message matches {} at {:.2}",
                        other.intent, other.confidence
                    ),
                });
            }
        }

        // Heuristic confidence from the expected entity's pattern set
        let today = Local::now().date_naive();
        let confidence = match extractor.extract(message, expected, today) {
            Some(extraction) => extraction.confidence,
            // Short answers with no pattern hit are still plausible
            // slot answers; the classifier gets the second opinion.
            None => {
                if message.split_whitespace().count() <= 6 {
                    0.65
                } else {
                    0.4
                }
            }
        };

        Ok(FollowUpCheck {
            is_follow_up: true,
            expected: Some(expected),
            confidence,
            reason: format!("active {} expecting {}", state.intent, expected),
        })
    }

    async fn require_active(&self, session_id: &str) -> Result<DialogState> {
        self.get_active(session_id)
            .await?
            .ok_or_else(|| Error::StateCorruption(format!("no active dialog state for {}", session_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_config::EntityRulesConfig;
    use converge_persistence::InMemoryDialogStateStore;

    fn manager() -> DialogStateManager {
        DialogStateManager::new(
            Arc::new(InMemoryDialogStateStore::new()),
            Arc::new(CatalogConfig::default()),
            DialogSettings::default(),
        )
    }

    fn matcher() -> PatternIntentMatcher {
        PatternIntentMatcher::from_catalog(&CatalogConfig::default())
    }

    fn extractor() -> EntityPatternExtractor {
        EntityPatternExtractor::new(EntityRulesConfig::default())
    }

    #[tokio::test]
    async fn test_create_and_collect_flow() {
        let m = manager();
        let state = m.create("s1", 1, IntentKind::BookingCreate).await.unwrap();
        assert_eq!(state.kind, DialogStateKind::CollectingInfo);
        assert_eq!(state.needed().len(), 4);

        m.set_expected("s1", EntityKey::PreferredDate).await.unwrap();
        let state = m
            .add_entity("s1", EntityKey::PreferredDate, "2026-08-02")
            .await
            .unwrap();
        assert!(state.expected.is_none());
        assert_eq!(state.collected[&EntityKey::PreferredDate], "2026-08-02");
    }

    #[tokio::test]
    async fn test_expected_must_be_required() {
        let m = manager();
        m.create("s1", 1, IntentKind::BookingCancel).await.unwrap();
        // booking_cancel only requires booking_id
        let err = m.set_expected("s1", EntityKey::PreferredDate).await;
        assert!(matches!(err, Err(Error::StateCorruption(_))));
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let m = manager();
        m.create("s1", 1, IntentKind::BookingCreate).await.unwrap();
        // collecting_info -> completed skips confirmation
        let err = m.transition("s1", DialogStateKind::Completed).await;
        assert!(matches!(err, Err(Error::StateCorruption(_))));
    }

    #[tokio::test]
    async fn test_confirmation_requires_complete_set() {
        let m = manager();
        m.create("s1", 1, IntentKind::BookingCancel).await.unwrap();
        let err = m
            .transition("s1", DialogStateKind::AwaitingConfirmation)
            .await;
        assert!(err.is_err());

        m.add_entity("s1", EntityKey::BookingId, "ORD12345678")
            .await
            .unwrap();
        let state = m
            .transition("s1", DialogStateKind::AwaitingConfirmation)
            .await
            .unwrap();
        assert_eq!(state.kind, DialogStateKind::AwaitingConfirmation);
    }

    #[tokio::test]
    async fn test_terminal_state_is_not_active() {
        let m = manager();
        m.create("s1", 1, IntentKind::BookingCancel).await.unwrap();
        m.add_entity("s1", EntityKey::BookingId, "ORD12345678")
            .await
            .unwrap();
        m.transition("s1", DialogStateKind::AwaitingConfirmation)
            .await
            .unwrap();
        m.transition("s1", DialogStateKind::Completed).await.unwrap();

        assert!(m.get_active("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_counter() {
        let m = manager();
        m.create("s1", 1, IntentKind::BookingCreate).await.unwrap();
        assert_eq!(m.increment_retry("s1", EntityKey::PreferredDate).await.unwrap(), 1);
        assert_eq!(m.increment_retry("s1", EntityKey::PreferredDate).await.unwrap(), 2);
        assert_eq!(m.increment_retry("s1", EntityKey::PreferredDate).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_follow_up_detection() {
        let m = manager();
        let matcher = matcher();
        let extractor = extractor();

        // No state -> not a follow-up
        let check = m
            .is_follow_up("tomorrow", "s1", &matcher, &extractor)
            .await
            .unwrap();
        assert!(!check.is_follow_up);

        m.create("s1", 1, IntentKind::BookingCreate).await.unwrap();
        m.set_expected("s1", EntityKey::PreferredDate).await.unwrap();

        // Slot answer matching the expected entity's patterns
        let check = m
            .is_follow_up("tomorrow", "s1", &matcher, &extractor)
            .await
            .unwrap();
        assert!(check.is_follow_up);
        assert_eq!(check.expected, Some(EntityKey::PreferredDate));
        assert!(check.confidence > 0.9);

        // A strong different-intent pattern vetoes the follow-up
        let check = m
            .is_follow_up("actually, cancel booking ORD123", "s1", &matcher, &extractor)
            .await
            .unwrap();
        assert!(!check.is_follow_up);
        assert!(check.reason.contains("booking_cancel"));
    }

    #[tokio::test]
    async fn test_follow_up_same_intent_pattern_does_not_veto() {
        let m = manager();
        let matcher = matcher();
        let extractor = extractor();

        m.create("s1", 1, IntentKind::Complaint).await.unwrap();
        m.set_expected("s1", EntityKey::Description).await.unwrap();

        // Matches the complaint pattern, which is the active intent
        let check = m
            .is_follow_up(
                "Technician did not arrive at 3 PM, I waited two hours.",
                "s1",
                &matcher,
                &extractor,
            )
            .await
            .unwrap();
        assert!(check.is_follow_up);
        assert_eq!(check.expected, Some(EntityKey::Description));
    }
}
