//! Inbound and outbound message contracts

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::conversation::{HistoryMessage, Provenance};
use crate::intent::{ClassificationMethod, IntentKind};
use crate::{Error, Result};

/// Delivery channel of the inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Web,
    Mobile,
    Whatsapp,
}

/// One inbound conversation turn.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_id: i64,
    pub channel: Channel,
    #[serde(default)]
    pub history: Option<Vec<HistoryMessage>>,
}

impl InboundMessage {
    /// Shape check on the inbound contract (violations surface as 4xx).
    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(Error::InvalidRequest("message must not be empty".to_string()));
        }
        if self.message.len() > 4096 {
            return Err(Error::InvalidRequest(
                "message exceeds 4096 characters".to_string(),
            ));
        }
        if self.user_id <= 0 {
            return Err(Error::InvalidRequest("user_id must be positive".to_string()));
        }
        Ok(())
    }
}

/// One scored classification candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredIntent {
    pub intent: IntentKind,
    pub confidence: f32,
    /// Entities surfaced alongside the classification (string-keyed for
    /// the wire; typed entities live in the graph state)
    #[serde(default)]
    pub entities: HashMap<String, String>,
}

/// Citation of a policy-corpus chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub doc_type: String,
    pub section: String,
}

/// Metadata attached to every reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyMetadata {
    pub all_intents: Vec<ScoredIntent>,
    pub classification_method: ClassificationMethod,
    pub collected_entities: HashMap<String, String>,
    pub needed_entities: Vec<String>,
    pub should_trigger_agent: bool,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding_score: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub citations: Vec<Citation>,
}

impl Default for ReplyMetadata {
    fn default() -> Self {
        Self {
            all_intents: Vec::new(),
            classification_method: ClassificationMethod::Fallback,
            collected_entities: HashMap::new(),
            needed_entities: Vec::new(),
            should_trigger_agent: false,
            provenance: Provenance::default(),
            grounding_score: None,
            citations: Vec::new(),
        }
    }
}

/// The coordinator's reply for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub session_id: String,
    pub response: String,
    pub intent: IntentKind,
    pub confidence: f32,
    pub agent_used: Vec<String>,
    pub metadata: ReplyMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_validation() {
        let msg = InboundMessage {
            message: "book AC repair".to_string(),
            session_id: None,
            user_id: 12,
            channel: Channel::Web,
            history: None,
        };
        assert!(msg.validate().is_ok());

        let empty = InboundMessage {
            message: "   ".to_string(),
            ..msg.clone()
        };
        assert!(matches!(empty.validate(), Err(Error::InvalidRequest(_))));

        let bad_user = InboundMessage { user_id: 0, ..msg };
        assert!(bad_user.validate().is_err());
    }

    #[test]
    fn test_inbound_deserialization() {
        let json = r#"{
            "message": "I want to book AC service",
            "user_id": 5,
            "channel": "whatsapp",
            "history": [{"role": "user", "content": "hi"}]
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.channel, Channel::Whatsapp);
        assert!(msg.session_id.is_none());
        assert_eq!(msg.history.unwrap().len(), 1);
    }

    #[test]
    fn test_reply_metadata_skips_empty_optionals() {
        let metadata = ReplyMetadata::default();
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(!json.contains("grounding_score"));
        assert!(!json.contains("citations"));
    }
}
