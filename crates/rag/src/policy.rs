//! Policy (RAG) agent
//!
//! Retrieve -> floor-check -> generate -> ground -> cite. The agent
//! must not produce any claim unsupported by retrieved context; when in
//! doubt it returns the no-information response instead.

use std::sync::Arc;
use std::time::Duration;

use converge_core::Citation;
use converge_llm::{policy_prompt, GenerateRequest, LlmBackend};

use crate::grounding::{GroundingBand, GroundingConfig, GroundingScorer};
use crate::index::{ScoredChunk, SearchFilter, VectorIndex};

/// Fixed refusal used whenever retrieval or grounding fails.
pub const NO_INFORMATION_MESSAGE: &str =
    "I don't have enough information to answer that with confidence.";

/// Hedge prefix for the mid-grounding band.
const HEDGE_PREFIX: &str = "Based on available policy, ";

/// Policy agent configuration.
#[derive(Debug, Clone)]
pub struct PolicyAgentConfig {
    pub top_k: usize,
    /// Below this top retrieval score the agent refuses outright
    pub score_floor: f32,
    pub publish_threshold: f32,
    pub hedge_threshold: f32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub search_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for PolicyAgentConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_floor: 0.55,
            publish_threshold: 0.70,
            hedge_threshold: 0.50,
            temperature: 0.3,
            max_tokens: 1024,
            search_timeout: Duration::from_secs(2),
            generation_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a policy query.
#[derive(Debug, Clone)]
pub struct PolicyAnswer {
    pub response: String,
    pub citations: Vec<Citation>,
    /// None when the agent refused before generating
    pub grounding_score: Option<f32>,
    /// Set for hedged answers
    pub flagged_for_review: bool,
    pub no_information: bool,
}

impl PolicyAnswer {
    fn no_information() -> Self {
        Self {
            response: NO_INFORMATION_MESSAGE.to_string(),
            citations: Vec::new(),
            grounding_score: None,
            flagged_for_review: false,
            no_information: true,
        }
    }
}

/// Grounded answering over the policy corpus.
pub struct PolicyAgent {
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LlmBackend>,
    scorer: GroundingScorer,
    config: PolicyAgentConfig,
}

impl PolicyAgent {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmBackend>,
        config: PolicyAgentConfig,
    ) -> Self {
        Self {
            index,
            llm,
            scorer: GroundingScorer::new(GroundingConfig::default()),
            config,
        }
    }

    /// Answer a policy question from the given namespace.
    pub async fn answer(
        &self,
        query: &str,
        namespace: &str,
        filter: Option<SearchFilter>,
    ) -> PolicyAnswer {
        let chunks = match tokio::time::timeout(
            self.config.search_timeout,
            self.index.search(query, namespace, self.config.top_k, filter),
        )
        .await
        {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "policy retrieval failed, refusing to answer");
                return PolicyAnswer::no_information();
            }
            Err(_) => {
                tracing::warn!("policy retrieval timed out, refusing to answer");
                return PolicyAnswer::no_information();
            }
        };

        let top_score = chunks.first().map(|c| c.score).unwrap_or(0.0);
        if chunks.is_empty() || top_score < self.config.score_floor {
            tracing::debug!(top_score, floor = self.config.score_floor, "retrieval below floor");
            return PolicyAnswer::no_information();
        }

        let tagged: Vec<(String, String)> = chunks
            .iter()
            .map(|c| (c.id.clone(), c.content.clone()))
            .collect();
        let request = GenerateRequest::new(policy_prompt(query, &tagged), self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_timeout(self.config.generation_timeout);

        let raw = match self.llm.generate(&request).await {
            Ok(result) => result.text,
            Err(e) => {
                tracing::warn!(error = %e, "policy generation failed, refusing to answer");
                return PolicyAnswer::no_information();
            }
        };

        let chunk_texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let cleaned = strip_citation_markers(&raw, &chunks);
        let score = self.scorer.score(&cleaned, &chunk_texts);
        let band = GroundingBand::from_score(
            score,
            self.config.publish_threshold,
            self.config.hedge_threshold,
        );

        tracing::info!(
            namespace,
            top_score,
            grounding = score,
            band = ?band,
            "policy answer scored"
        );

        match band {
            GroundingBand::Publish => PolicyAnswer {
                response: cleaned,
                citations: citations_for(&raw, &chunks),
                grounding_score: Some(score),
                flagged_for_review: false,
                no_information: false,
            },
            GroundingBand::Hedge => PolicyAnswer {
                response: format!("{}{}", HEDGE_PREFIX, lowercase_first(&cleaned)),
                citations: citations_for(&raw, &chunks),
                grounding_score: Some(score),
                flagged_for_review: true,
                no_information: false,
            },
            GroundingBand::Suppress => PolicyAnswer {
                grounding_score: Some(score),
                ..PolicyAnswer::no_information()
            },
        }
    }
}

/// Citations are the chunks the model cited by id; when it cited none,
/// every retrieved chunk that fed the prompt is listed.
fn citations_for(raw_response: &str, chunks: &[ScoredChunk]) -> Vec<Citation> {
    let cited: Vec<&ScoredChunk> = chunks
        .iter()
        .filter(|c| raw_response.contains(&format!("[{}]", c.id)))
        .collect();
    let source: Vec<&ScoredChunk> = if cited.is_empty() {
        chunks.iter().collect()
    } else {
        cited
    };

    source
        .into_iter()
        .map(|c| Citation {
            chunk_id: c.id.clone(),
            document_id: c.metadata.get("document_id").cloned().unwrap_or_default(),
            doc_type: c.metadata.get("doc_type").cloned().unwrap_or_default(),
            section: c.metadata.get("section").cloned().unwrap_or_default(),
        })
        .collect()
}

fn strip_citation_markers(response: &str, chunks: &[ScoredChunk]) -> String {
    let mut cleaned = response.to_string();
    for chunk in chunks {
        cleaned = cleaned.replace(&format!("[{}]", chunk.id), "");
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{namespaces, PolicyChunk};
    use crate::index::InMemoryIndex;
    use async_trait::async_trait;
    use converge_llm::{GenerationResult, LlmError};
    use parking_lot::Mutex;

    /// Scripted backend returning canned responses in order.
    struct ScriptedLlm {
        responses: Mutex<Vec<Result<String, LlmError>>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn generate(
            &self,
            _request: &GenerateRequest,
        ) -> Result<GenerationResult, LlmError> {
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(LlmError::Api("script exhausted".to_string()));
            }
            responses.remove(0).map(|text| GenerationResult {
                text,
                total_time_ms: 5,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn cancellation_chunk() -> PolicyChunk {
        PolicyChunk {
            id: "policy-cancellation#1".to_string(),
            document_id: "policy-cancellation".to_string(),
            doc_type: "policy".to_string(),
            section: "refunds".to_string(),
            applicability: "all-services".to_string(),
            effective_date: "2026-01-01".to_string(),
            version: "2".to_string(),
            content: "Cancellation policy: cancellations made at least 24 hours before the \
visit receive a full refund. Cancellations within 2 hours receive no refund."
                .to_string(),
        }
    }

    async fn seeded_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        index
            .upsert(&[cancellation_chunk()], namespaces::POLICIES)
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_grounded_answer_is_published_with_citations() {
        let index = seeded_index().await;
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            "Cancellations made at least 24 hours before the visit receive a full refund \
[policy-cancellation#1]."
                .to_string(),
        )]));
        let agent = PolicyAgent::new(index, llm, PolicyAgentConfig::default());

        let answer = agent
            .answer(
                "cancellation policy full refund 24 hours before visit",
                namespaces::POLICIES,
                None,
            )
            .await;

        assert!(!answer.no_information);
        assert!(answer.grounding_score.unwrap() >= 0.70);
        assert!(!answer.flagged_for_review);
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].chunk_id, "policy-cancellation#1");
        assert!(!answer.response.contains("[policy-cancellation#1]"));
    }

    #[tokio::test]
    async fn test_ungrounded_answer_is_suppressed() {
        let index = seeded_index().await;
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            "Cancelling grants lifetime platinum vouchers plus helicopter pickup privileges."
                .to_string(),
        )]));
        let agent = PolicyAgent::new(index, llm, PolicyAgentConfig::default());

        let answer = agent
            .answer(
                "cancellation policy full refund 24 hours before visit",
                namespaces::POLICIES,
                None,
            )
            .await;

        assert!(answer.no_information);
        assert_eq!(answer.response, NO_INFORMATION_MESSAGE);
        assert_eq!(answer.grounding_score, Some(0.0));
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_below_floor_refuses_without_llm_call() {
        let index = seeded_index().await;
        // Script would panic the test if consulted: an Err is fine, the
        // agent must refuse before generating.
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent = PolicyAgent::new(index, llm, PolicyAgentConfig::default());

        let answer = agent
            .answer("completely unrelated gibberish zzz", namespaces::POLICIES, None)
            .await;

        assert!(answer.no_information);
        assert!(answer.grounding_score.is_none());
    }

    #[tokio::test]
    async fn test_llm_failure_returns_no_information() {
        let index = seeded_index().await;
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Timeout)]));
        let agent = PolicyAgent::new(index, llm, PolicyAgentConfig::default());

        let answer = agent
            .answer(
                "cancellation policy full refund 24 hours before visit",
                namespaces::POLICIES,
                None,
            )
            .await;

        assert!(answer.no_information);
        assert_eq!(answer.response, NO_INFORMATION_MESSAGE);
    }

    #[tokio::test]
    async fn test_empty_namespace_refuses() {
        let index = Arc::new(InMemoryIndex::new());
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent = PolicyAgent::new(index, llm, PolicyAgentConfig::default());

        let answer = agent.answer("anything", namespaces::FAQS, None).await;
        assert!(answer.no_information);
    }
}
