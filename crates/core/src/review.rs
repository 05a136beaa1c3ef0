//! Priority-queue entries for operations review

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intent::IntentKind;

/// Review lifecycle of a queue entry. Entries are created by the system
/// and mutated only by operations staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Reviewed,
    Escalated,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewed => "reviewed",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "reviewed" => Some(Self::Reviewed),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }
}

/// SLA risk label against the expected response time for the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaRisk {
    OnTrack,
    AtRisk,
    Breached,
}

impl SlaRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "on_track",
            Self::AtRisk => "at_risk",
            Self::Breached => "breached",
        }
    }
}

/// A turn surfaced for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityQueueEntry {
    pub id: Uuid,
    pub user_id: i64,
    pub session_id: String,
    pub intent: IntentKind,
    /// The AI confidence that raised this entry
    pub ai_confidence: f32,
    /// Computed score in [0, 100]
    pub priority_score: f32,
    /// Sentiment of the triggering message in [-1, 1]
    pub sentiment: f32,
    /// Message snippet; PII-redacted at display time for viewers
    /// without the full_access capability
    pub snippet: String,
    pub status: ReviewStatus,
    pub reviewer: Option<String>,
    pub action_taken: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PriorityQueueEntry {
    pub fn new(
        user_id: i64,
        session_id: impl Into<String>,
        intent: IntentKind,
        ai_confidence: f32,
        priority_score: f32,
        sentiment: f32,
        snippet: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_id: session_id.into(),
            intent,
            ai_confidence,
            priority_score: priority_score.clamp(0.0, 100.0),
            sentiment: sentiment.clamp(-1.0, 1.0),
            snippet: snippet.into(),
            status: ReviewStatus::Pending,
            reviewer: None,
            action_taken: None,
            created_at: now,
            updated_at: now,
        }
    }
}
