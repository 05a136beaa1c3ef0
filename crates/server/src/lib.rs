//! HTTP server for the ConvergeAI conversational core

pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::{AppState, UnconfiguredLlm};
