//! In-memory store implementations
//!
//! Back development deployments (persistence disabled) and tests. Same
//! trait semantics as the ScyllaDB stores, including last-write-wins on
//! dialog states.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use converge_core::{ConversationTurn, DialogState, PriorityQueueEntry, ReviewStatus};

use crate::audit::{AuditEntry, AuditLog};
use crate::bookings::{Booking, BookingStore};
use crate::complaints::{Complaint, ComplaintStore};
use crate::dialog::DialogStateStore;
use crate::review_queue::ReviewQueueStore;
use crate::turns::ConversationTurnStore;
use crate::PersistenceError;

/// In-memory conversation turn store.
#[derive(Default)]
pub struct InMemoryTurnStore {
    turns: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationTurnStore for InMemoryTurnStore {
    async fn append(&self, turn: &ConversationTurn) -> Result<(), PersistenceError> {
        self.turns
            .write()
            .entry(turn.session_id.clone())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, PersistenceError> {
        let turns = self.turns.read();
        let Some(session_turns) = turns.get(session_id) else {
            return Ok(Vec::new());
        };
        let skip = session_turns.len().saturating_sub(limit);
        Ok(session_turns[skip..].to_vec())
    }
}

/// In-memory dialog state store with last-write-wins semantics.
#[derive(Default)]
pub struct InMemoryDialogStateStore {
    states: DashMap<String, DialogState>,
}

impl InMemoryDialogStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DialogStateStore for InMemoryDialogStateStore {
    async fn get(&self, session_id: &str) -> Result<Option<DialogState>, PersistenceError> {
        Ok(self.states.get(session_id).map(|s| s.clone()))
    }

    async fn put(&self, state: &DialogState) -> Result<(), PersistenceError> {
        // Read ref must drop before the insert touches the same shard
        let stale = self
            .states
            .get(&state.session_id)
            .map(|existing| existing.updated_at > state.updated_at)
            .unwrap_or(false);
        if !stale {
            self.states
                .insert(state.session_id.clone(), state.clone());
        }
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), PersistenceError> {
        self.states.remove(session_id);
        Ok(())
    }
}

/// In-memory review queue.
#[derive(Default)]
pub struct InMemoryReviewQueueStore {
    entries: DashMap<Uuid, PriorityQueueEntry>,
}

impl InMemoryReviewQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ReviewQueueStore for InMemoryReviewQueueStore {
    async fn create(&self, entry: &PriorityQueueEntry) -> Result<(), PersistenceError> {
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PriorityQueueEntry>, PersistenceError> {
        Ok(self.entries.get(&id).map(|e| e.clone()))
    }

    async fn update(&self, entry: &PriorityQueueEntry) -> Result<(), PersistenceError> {
        if !self.entries.contains_key(&entry.id) {
            return Err(PersistenceError::NotFound(format!(
                "review queue entry {}",
                entry.id
            )));
        }
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list(
        &self,
        status: Option<ReviewStatus>,
        limit: usize,
    ) -> Result<Vec<PriorityQueueEntry>, PersistenceError> {
        let mut entries: Vec<PriorityQueueEntry> = self
            .entries
            .iter()
            .filter(|e| status.map(|s| e.status == s).unwrap_or(true))
            .map(|e| e.clone())
            .collect();
        entries.sort_by(|a, b| b.priority_score.partial_cmp(&a.priority_score).unwrap());
        entries.truncate(limit);
        Ok(entries)
    }
}

/// In-memory audit log.
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<(), PersistenceError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn list_for_target(
        &self,
        target: &str,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, PersistenceError> {
        let entries = self.entries.read();
        let mut matched: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit);
        Ok(matched)
    }
}

/// In-memory booking store keyed by order id.
#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: DashMap<String, Booking>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn create(&self, booking: &Booking) -> Result<(), PersistenceError> {
        self.bookings
            .insert(booking.order_id.clone(), booking.clone());
        Ok(())
    }

    async fn get(
        &self,
        user_id: i64,
        order_id: &str,
    ) -> Result<Option<Booking>, PersistenceError> {
        Ok(self
            .bookings
            .get(order_id)
            .filter(|b| b.user_id == user_id)
            .map(|b| b.clone()))
    }

    async fn find_by_nonce(
        &self,
        session_id: &str,
        nonce: &str,
    ) -> Result<Option<Booking>, PersistenceError> {
        Ok(self
            .bookings
            .iter()
            .find(|b| b.session_id == session_id && b.confirmation_nonce == nonce)
            .map(|b| b.clone()))
    }

    async fn update(&self, booking: &Booking) -> Result<(), PersistenceError> {
        if !self.bookings.contains_key(&booking.order_id) {
            return Err(PersistenceError::NotFound(format!(
                "booking {}",
                booking.order_id
            )));
        }
        self.bookings
            .insert(booking.order_id.clone(), booking.clone());
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Booking>, PersistenceError> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.clone())
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bookings.truncate(limit);
        Ok(bookings)
    }
}

/// In-memory complaint store keyed by complaint id.
#[derive(Default)]
pub struct InMemoryComplaintStore {
    complaints: DashMap<String, Complaint>,
}

impl InMemoryComplaintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.complaints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.complaints.is_empty()
    }
}

#[async_trait]
impl ComplaintStore for InMemoryComplaintStore {
    async fn create(&self, complaint: &Complaint) -> Result<(), PersistenceError> {
        self.complaints
            .insert(complaint.complaint_id.clone(), complaint.clone());
        Ok(())
    }

    async fn get(
        &self,
        user_id: i64,
        complaint_id: &str,
    ) -> Result<Option<Complaint>, PersistenceError> {
        Ok(self
            .complaints
            .get(complaint_id)
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone()))
    }

    async fn find_by_nonce(
        &self,
        session_id: &str,
        nonce: &str,
    ) -> Result<Option<Complaint>, PersistenceError> {
        Ok(self
            .complaints
            .iter()
            .find(|c| c.session_id == session_id && c.confirmation_nonce == nonce)
            .map(|c| c.clone()))
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Complaint>, PersistenceError> {
        let mut complaints: Vec<Complaint> = self
            .complaints
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone())
            .collect();
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        complaints.truncate(limit);
        Ok(complaints)
    }

    async fn count_recent_for_user(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, PersistenceError> {
        Ok(self
            .complaints
            .iter()
            .filter(|c| c.user_id == user_id && c.created_at >= since)
            .count() as u32)
    }
}
