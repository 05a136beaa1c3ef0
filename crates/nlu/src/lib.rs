//! Deterministic text processing for the ConvergeAI core
//!
//! Everything in this crate is pattern-driven and runs in microseconds:
//! the fast path of the hybrid intent classifier, precision-tuned entity
//! extraction with deterministic normalization, lexicon sentiment for
//! the priority queue, and PII redaction for the operations surface.
//!
//! The LLM stages live in `converge-agent`; this crate never performs
//! network I/O.

pub mod entities;
pub mod intent;
pub mod pii;
pub mod sentiment;

pub use entities::{EntityPatternExtractor, RawExtraction};
pub use intent::{PatternIntentMatcher, PatternMatch};
pub use pii::PiiRedactor;
pub use sentiment::SentimentAnalyzer;
