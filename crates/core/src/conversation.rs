//! Conversation turns with provenance and quality scores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intent::IntentKind;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in the rolling history handed in with a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

/// Data sources consulted while producing a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Domain tables touched
    pub tables: Vec<String>,
    /// Vector chunk ids cited
    pub chunks: Vec<String>,
}

impl Provenance {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            tables: vec![name.into()],
            chunks: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: Provenance) {
        for t in other.tables {
            if !self.tables.contains(&t) {
                self.tables.push(t);
            }
        }
        for c in other.chunks {
            if !self.chunks.contains(&c) {
                self.chunks.push(c);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.chunks.is_empty()
    }
}

/// Quality scores attached to assistant turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityScores {
    pub grounding: Option<f32>,
    pub faithfulness: Option<f32>,
    pub relevancy: Option<f32>,
    pub response_time_ms: u64,
}

/// Immutable record of one message exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: i64,
    pub role: Role,
    pub content: String,
    pub intent: Option<IntentKind>,
    pub confidence: Option<f32>,
    /// Agents invoked to produce this turn (assistant turns only)
    pub agents: Vec<String>,
    pub provenance: Provenance,
    pub scores: Option<QualityScores>,
    /// Set when grounding or faithfulness fell below threshold
    pub flagged_for_review: bool,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(session_id: impl Into<String>, user_id: i64, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            user_id,
            role: Role::User,
            content: content.into(),
            intent: None,
            confidence: None,
            agents: Vec::new(),
            provenance: Provenance::default(),
            scores: None,
            flagged_for_review: false,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        session_id: impl Into<String>,
        user_id: i64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::user(session_id, user_id, content)
        }
    }

    pub fn history_message(&self) -> HistoryMessage {
        HistoryMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_merge_dedups() {
        let mut p = Provenance::table("bookings");
        p.merge(Provenance {
            tables: vec!["bookings".to_string(), "complaints".to_string()],
            chunks: vec!["pol-1#2".to_string()],
        });
        assert_eq!(p.tables, vec!["bookings", "complaints"]);
        assert_eq!(p.chunks, vec!["pol-1#2"]);
    }

    #[test]
    fn test_turn_constructors() {
        let user = ConversationTurn::user("s1", 7, "hello");
        assert_eq!(user.role, Role::User);
        assert!(user.agents.is_empty());

        let reply = ConversationTurn::assistant("s1", 7, "hi there");
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "hi there");
    }
}
