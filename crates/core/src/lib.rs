//! Core types for the ConvergeAI conversational engine
//!
//! Shared vocabulary used across every crate in the workspace:
//! - Intent catalog kinds and entity keys
//! - Dialog state (the per-session slot-filling record)
//! - Conversation turns with provenance and quality scores
//! - Priority-queue entries for operations review
//! - The error taxonomy shared across component boundaries

pub mod conversation;
pub mod dialog;
pub mod entity;
pub mod intent;
pub mod message;
pub mod review;

pub use conversation::{ConversationTurn, HistoryMessage, Provenance, QualityScores, Role};
pub use dialog::{DialogState, DialogStateKind};
pub use entity::{EntityKey, EntityValue, ExtractionMethod};
pub use intent::{AgentKind, ClassificationMethod, IntentKind};
pub use message::{AgentReply, Channel, Citation, InboundMessage, ReplyMetadata, ScoredIntent};
pub use review::{PriorityQueueEntry, ReviewStatus, SlaRisk};

use thiserror::Error;

/// Error taxonomy shared across component boundaries.
///
/// Errors travel inside the graph state rather than being thrown across
/// node boundaries; only `InvalidRequest` and `Repository` (on failure to
/// persist the turn) are ever surfaced to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// An entity value failed a business rule. Recovered locally by
    /// re-asking the question.
    #[error("validation failure: {0}")]
    Validation(String),

    /// Upstream model timeout, 5xx, or schema violation. Recovered by
    /// falling back to static templates or the fallback classification.
    #[error("llm error: {0}")]
    Llm(String),

    /// Vector index unavailable or search failed.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Domain store failure.
    #[error("repository error: {0}")]
    Repository(String),

    /// A new high-confidence intent arrived mid-dialog.
    #[error("intent switch from {from} to {to}")]
    IntentSwitch { from: IntentKind, to: IntentKind },

    /// Dialog state invariant violation. Fatal for the turn.
    #[error("state corruption: {0}")]
    StateCorruption(String),

    /// Shape error on the inbound contract (surfaced as 4xx).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A budgeted operation exceeded its deadline.
    #[error("{0} timed out")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short stable tag for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Llm(_) => "llm",
            Error::Retrieval(_) => "retrieval",
            Error::Repository(_) => "repository",
            Error::IntentSwitch { .. } => "intent_switch",
            Error::StateCorruption(_) => "state_corruption",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Timeout(_) => "timeout",
            Error::Config(_) => "config",
        }
    }
}
