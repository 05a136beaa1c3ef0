//! ScyllaDB persistence layer for the ConvergeAI core
//!
//! Provides durable storage for:
//! - Conversation turns
//! - Dialog states (last-write-wins on `updated_at`)
//! - Priority-queue entries for operations review
//! - Audit logging of PII access
//! - Domain rows the task agents write (bookings, complaints)
//!
//! Every store is a trait with a ScyllaDB implementation and an
//! in-memory implementation; the in-memory layer backs development
//! deployments and tests.

pub mod audit;
pub mod bookings;
pub mod client;
pub mod complaints;
pub mod dialog;
pub mod error;
pub mod memory;
pub mod review_queue;
pub mod schema;
pub mod turns;

pub use audit::{AuditEntry, AuditLog, ScyllaAuditLog};
pub use bookings::{Booking, BookingStatus, BookingStore, ScyllaBookingStore};
pub use client::{ScyllaClient, ScyllaConfig};
pub use complaints::{
    Complaint, ComplaintPriority, ComplaintStatus, ComplaintStore, ScyllaComplaintStore,
};
pub use dialog::{DialogStateStore, ScyllaDialogStateStore};
pub use error::PersistenceError;
pub use memory::{
    InMemoryAuditLog, InMemoryBookingStore, InMemoryComplaintStore, InMemoryDialogStateStore,
    InMemoryReviewQueueStore, InMemoryTurnStore,
};
pub use review_queue::{ReviewQueueStore, ScyllaReviewQueueStore};
pub use turns::{ConversationTurnStore, ScyllaTurnStore};

use std::sync::Arc;

/// Combined persistence layer with all stores.
#[derive(Clone)]
pub struct PersistenceLayer {
    pub turns: Arc<dyn ConversationTurnStore>,
    pub dialog_states: Arc<dyn DialogStateStore>,
    pub review_queue: Arc<dyn ReviewQueueStore>,
    pub audit: Arc<dyn AuditLog>,
    pub bookings: Arc<dyn BookingStore>,
    pub complaints: Arc<dyn ComplaintStore>,
}

/// Initialize the ScyllaDB-backed layer, creating the schema if needed.
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        turns: Arc::new(ScyllaTurnStore::new(client.clone())),
        dialog_states: Arc::new(ScyllaDialogStateStore::new(client.clone())),
        review_queue: Arc::new(ScyllaReviewQueueStore::new(client.clone())),
        audit: Arc::new(ScyllaAuditLog::new(client.clone())),
        bookings: Arc::new(ScyllaBookingStore::new(client.clone())),
        complaints: Arc::new(ScyllaComplaintStore::new(client)),
    })
}

/// In-memory layer for development and tests.
pub fn in_memory() -> PersistenceLayer {
    PersistenceLayer {
        turns: Arc::new(InMemoryTurnStore::new()),
        dialog_states: Arc::new(InMemoryDialogStateStore::new()),
        review_queue: Arc::new(InMemoryReviewQueueStore::new()),
        audit: Arc::new(InMemoryAuditLog::new()),
        bookings: Arc::new(InMemoryBookingStore::new()),
        complaints: Arc::new(InMemoryComplaintStore::new()),
    }
}
