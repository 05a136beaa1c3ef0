//! Intent catalog kinds
//!
//! The catalog itself (display names, priorities, required entities,
//! trigger patterns) is config-driven; the closed set of kinds lives here
//! so every crate shares the same vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of intents the classifier may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Book a new home service (AC repair, plumbing, cleaning, ...)
    BookingCreate,
    /// Cancel an existing booking
    BookingCancel,
    /// File a complaint about a past or ongoing service
    Complaint,
    /// Question about policies, FAQs, or service descriptions
    PolicyInquiry,
    /// Greeting / small talk opener
    Greeting,
    /// General question about the platform
    GeneralQuery,
    /// Request outside the home-services domain
    OutOfScope,
    /// Classifier could not determine the intent
    UnclearIntent,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingCreate => "booking_create",
            Self::BookingCancel => "booking_cancel",
            Self::Complaint => "complaint",
            Self::PolicyInquiry => "policy_inquiry",
            Self::Greeting => "greeting",
            Self::GeneralQuery => "general_query",
            Self::OutOfScope => "out_of_scope",
            Self::UnclearIntent => "unclear_intent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking_create" => Some(Self::BookingCreate),
            "booking_cancel" => Some(Self::BookingCancel),
            "complaint" => Some(Self::Complaint),
            "policy_inquiry" => Some(Self::PolicyInquiry),
            "greeting" => Some(Self::Greeting),
            "general_query" => Some(Self::GeneralQuery),
            "out_of_scope" => Some(Self::OutOfScope),
            "unclear_intent" => Some(Self::UnclearIntent),
            _ => None,
        }
    }

    /// Kinds routed to the coordinator itself rather than a task agent.
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            Self::Greeting | Self::GeneralQuery | Self::OutOfScope | Self::UnclearIntent
        )
    }

    /// Kinds whose owning agent writes to the domain store and therefore
    /// require an explicit user confirmation before dispatch.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::BookingCreate | Self::BookingCancel | Self::Complaint)
    }

    pub fn all() -> &'static [IntentKind] {
        &[
            Self::BookingCreate,
            Self::BookingCancel,
            Self::Complaint,
            Self::PolicyInquiry,
            Self::Greeting,
            Self::GeneralQuery,
            Self::OutOfScope,
            Self::UnclearIntent,
        ]
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent that owns an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Booking,
    Cancellation,
    Complaint,
    Policy,
    Coordinator,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booking => "booking_agent",
            Self::Cancellation => "cancellation_agent",
            Self::Complaint => "complaint_agent",
            Self::Policy => "policy_agent",
            Self::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage of the hybrid classifier produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Pattern,
    Llm,
    Fallback,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Llm => "llm",
            Self::Fallback => "fallback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for kind in IntentKind::all() {
            assert_eq!(IntentKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(IntentKind::parse("make_coffee"), None);
    }

    #[test]
    fn test_conversational_kinds() {
        assert!(IntentKind::Greeting.is_conversational());
        assert!(IntentKind::UnclearIntent.is_conversational());
        assert!(!IntentKind::BookingCreate.is_conversational());
        assert!(!IntentKind::PolicyInquiry.is_conversational());
    }

    #[test]
    fn test_confirmation_gate() {
        // Only domain-writing intents require the explicit confirmation turn.
        assert!(IntentKind::BookingCreate.requires_confirmation());
        assert!(IntentKind::BookingCancel.requires_confirmation());
        assert!(IntentKind::Complaint.requires_confirmation());
        assert!(!IntentKind::PolicyInquiry.requires_confirmation());
        assert!(!IntentKind::Greeting.requires_confirmation());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&IntentKind::BookingCancel).unwrap();
        assert_eq!(json, "\"booking_cancel\"");
    }
}
