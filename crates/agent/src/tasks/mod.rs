//! Task agents
//!
//! All task agents share one contract and one invariant: they run only
//! after slot-filling has delivered a validated, confirmed entity set,
//! and they write at most once per `(session_id, confirmation_nonce)`.

pub mod booking;
pub mod cancellation;
pub mod complaint;

pub use booking::BookingAgent;
pub use cancellation::CancellationAgent;
pub use complaint::ComplaintAgent;

use async_trait::async_trait;
use std::collections::HashMap;

use converge_core::{AgentKind, EntityKey, Error, IntentKind, Provenance, Result};

/// Confirmed slot set handed to an agent.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub intent: IntentKind,
    pub entities: HashMap<EntityKey, String>,
    pub user_id: i64,
    pub session_id: String,
    pub confirmation_nonce: String,
    /// Classifier confidence that routed here
    pub confidence: f32,
}

impl TaskRequest {
    /// Fetch a required entity; absence at this point is state
    /// corruption, not user error.
    pub fn entity(&self, key: EntityKey) -> Result<&str> {
        self.entities
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| Error::StateCorruption(format!("{} missing after slot-filling", key)))
    }
}

/// Agent result.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// User-facing response; an empty response is a defect
    pub response: String,
    /// Stable tag of what happened, e.g. "booking_created"
    pub action_taken: String,
    pub provenance: Provenance,
    /// Reason to surface this interaction for human review, if any
    pub needs_review: Option<String>,
}

/// The shared task-agent contract.
#[async_trait]
pub trait TaskAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn execute(&self, request: &TaskRequest) -> Result<TaskOutcome>;
}
