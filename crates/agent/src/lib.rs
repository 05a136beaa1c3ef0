//! Multi-agent orchestration for the ConvergeAI core
//!
//! The slot-filling graph is the orchestrator: a directed graph of
//! async nodes over a shared turn state. Around it sit the dialog state
//! manager (sole owner of dialog-state lifecycle), the hybrid intent
//! classifier, entity extraction and validation, the question
//! generator, the coordinator (the single entry point), the task agents
//! (booking, complaint, cancellation), and priority-queue scoring.
//!
//! Errors travel inside the graph state; each node catches, records and
//! routes rather than throwing across node boundaries.

pub mod classifier;
pub mod coordinator;
pub mod dialog;
pub mod extractor;
pub mod graph;
pub mod question;
pub mod review;
pub mod state;
pub mod tasks;
pub mod validator;

pub use classifier::{Classification, IntentClassifier};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use dialog::{DialogStateManager, FollowUpCheck};
pub use extractor::EntityExtractor;
pub use graph::SlotFillingGraph;
pub use question::QuestionGenerator;
pub use review::{PriorityScorer, ReviewService, Viewer};
pub use state::{Handoff, StateUpdate, TurnError, TurnState};
pub use tasks::{
    BookingAgent, CancellationAgent, ComplaintAgent, TaskAgent, TaskOutcome, TaskRequest,
};
pub use validator::{EntityValidator, ValidationOutcome};
