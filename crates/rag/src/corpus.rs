//! Policy corpus chunks and namespaces

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Logical partitions of the vector index.
pub mod namespaces {
    pub const POLICIES: &str = "policies";
    pub const FAQS: &str = "faqs";
    pub const SERVICE_DESCRIPTIONS: &str = "service-descriptions";
    pub const COMPLAINTS: &str = "complaints";
    pub const PROVIDER_GUIDELINES: &str = "provider-guidelines";
    pub const TRAINING: &str = "training";
    pub const ESCALATION: &str = "escalation";
    pub const KNOWLEDGE_BASE: &str = "knowledge-base";
    pub const REVIEWS: &str = "reviews";

    pub const ALL: &[&str] = &[
        POLICIES,
        FAQS,
        SERVICE_DESCRIPTIONS,
        COMPLAINTS,
        PROVIDER_GUIDELINES,
        TRAINING,
        ESCALATION,
        KNOWLEDGE_BASE,
        REVIEWS,
    ];
}

/// One chunk of a corpus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyChunk {
    /// Chunk id, conventionally `{document_id}#{ordinal}`
    pub id: String,
    pub document_id: String,
    /// policy | faq | service_description | review
    pub doc_type: String,
    pub section: String,
    #[serde(default)]
    pub applicability: String,
    /// ISO date the document took effect
    #[serde(default)]
    pub effective_date: String,
    #[serde(default)]
    pub version: String,
    pub content: String,
}

impl PolicyChunk {
    /// Flatten chunk fields into search-result metadata.
    pub fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("document_id".to_string(), self.document_id.clone()),
            ("doc_type".to_string(), self.doc_type.clone()),
            ("section".to_string(), self.section.clone()),
            ("applicability".to_string(), self.applicability.clone()),
            ("effective_date".to_string(), self.effective_date.clone()),
            ("version".to_string(), self.version.clone()),
        ])
    }

    /// Rebuild a chunk from search-result metadata.
    pub fn from_metadata(id: &str, content: &str, metadata: &HashMap<String, String>) -> Self {
        let get = |key: &str| metadata.get(key).cloned().unwrap_or_default();
        Self {
            id: id.to_string(),
            document_id: get("document_id"),
            doc_type: get("doc_type"),
            section: get("section"),
            applicability: get("applicability"),
            effective_date: get("effective_date"),
            version: get("version"),
            content: content.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_round_trip() {
        let chunk = PolicyChunk {
            id: "policy-cancellation#2".to_string(),
            document_id: "policy-cancellation".to_string(),
            doc_type: "policy".to_string(),
            section: "refunds".to_string(),
            applicability: "all-services".to_string(),
            effective_date: "2026-01-01".to_string(),
            version: "3".to_string(),
            content: "Full refund when cancelled 24 hours ahead.".to_string(),
        };

        let back = PolicyChunk::from_metadata(&chunk.id, &chunk.content, &chunk.metadata());
        assert_eq!(back.document_id, chunk.document_id);
        assert_eq!(back.section, "refunds");
        assert_eq!(back.version, "3");
    }

    #[test]
    fn test_namespace_listing() {
        assert_eq!(namespaces::ALL.len(), 9);
        assert!(namespaces::ALL.contains(&namespaces::POLICIES));
    }
}
