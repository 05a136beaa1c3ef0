//! Qdrant-backed vector index
//!
//! One collection holds every namespace; a `namespace` payload field
//! partitions them and every search carries a must-match condition on
//! it. Cosine distance at the configured dimension.

use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue, value::Kind, Condition,
    CreateCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition, Filter, Match,
    PointId, PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::corpus::PolicyChunk;
use crate::embeddings::{Embedder, HashEmbedder};
use crate::index::{ScoredChunk, SearchFilter, VectorIndex};
use crate::RagError;

/// Qdrant index configuration.
#[derive(Debug, Clone)]
pub struct QdrantIndexConfig {
    pub endpoint: String,
    pub collection: String,
    pub vector_dim: usize,
    pub api_key: Option<String>,
}

impl Default for QdrantIndexConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6334".to_string(),
            collection: "policy_corpus".to_string(),
            vector_dim: 384,
            api_key: None,
        }
    }
}

/// Production vector index over Qdrant.
pub struct QdrantIndex {
    client: Qdrant,
    config: QdrantIndexConfig,
    embedder: Arc<dyn Embedder>,
}

impl QdrantIndex {
    pub async fn new(config: QdrantIndexConfig) -> Result<Self, RagError> {
        Self::with_embedder(config, Arc::new(HashEmbedder::default())).await
    }

    pub async fn with_embedder(
        config: QdrantIndexConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        if embedder.dim() != config.vector_dim {
            return Err(RagError::Connection(format!(
                "embedder dimension {} does not match index dimension {}",
                embedder.dim(),
                config.vector_dim
            )));
        }

        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config,
            embedder,
        })
    }

    /// Create the collection if it does not exist.
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
            tracing::info!(collection = %self.config.collection, "created qdrant collection");
        }

        Ok(())
    }

    fn keyword_condition(key: &str, value: String) -> Condition {
        Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: key.to_string(),
                r#match: Some(Match {
                    match_value: Some(MatchValue::Keyword(value)),
                }),
                ..Default::default()
            })),
        }
    }

    fn build_filter(namespace: &str, filter: Option<SearchFilter>) -> Filter {
        let mut conditions = vec![Self::keyword_condition("namespace", namespace.to_string())];
        if let Some(filter) = filter {
            for (key, value) in filter.conditions {
                conditions.push(Self::keyword_condition(&key, value));
            }
        }
        Filter {
            must: conditions,
            ..Default::default()
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(
        &self,
        query: &str,
        namespace: &str,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let query_vector = self.embedder.embed(query)?;

        let search = SearchPointsBuilder::new(
            &self.config.collection,
            query_vector,
            top_k as u64,
        )
        .filter(Self::build_filter(namespace, filter))
        .with_payload(true);

        let results = self
            .client
            .search_points(search)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                let mut metadata = HashMap::new();
                let mut content = String::new();
                let mut chunk_id = String::new();

                for (k, v) in point.payload {
                    let Some(Kind::StringValue(s)) = v.kind else {
                        continue;
                    };
                    match k.as_str() {
                        "content" => content = s,
                        "chunk_id" => chunk_id = s,
                        "namespace" => {}
                        _ => {
                            metadata.insert(k, s);
                        }
                    }
                }

                ScoredChunk {
                    id: chunk_id,
                    score: point.score,
                    content,
                    metadata,
                }
            })
            .collect())
    }

    async fn upsert(&self, chunks: &[PolicyChunk], namespace: &str) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if chunk.id.is_empty() {
                return Err(RagError::InvalidDocument("chunk id is empty".to_string()));
            }
            let vector = self.embedder.embed(&chunk.content)?;

            let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
            payload.insert("chunk_id".to_string(), chunk.id.clone().into());
            payload.insert("namespace".to_string(), namespace.to_string().into());
            payload.insert("content".to_string(), chunk.content.clone().into());
            for (k, v) in chunk.metadata() {
                payload.insert(k, v.into());
            }

            points.push(PointStruct::new(
                point_id(namespace, &chunk.id),
                vector,
                payload,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        tracing::debug!(namespace, count = chunks.len(), "upserted corpus chunks");
        Ok(())
    }

    async fn delete(&self, ids: &[String], namespace: &str) -> Result<(), RagError> {
        let points: Vec<PointId> = ids
            .iter()
            .map(|id| PointId::from(point_id(namespace, id)))
            .collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection)
                    .points(PointsIdsList { ids: points }),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn health(&self) -> bool {
        self.client.health_check().await.is_ok()
    }
}

/// Deterministic numeric point id for a (namespace, chunk id) pair.
/// Chunk ids are free-form strings; Qdrant point ids are not.
fn point_id(namespace: &str, chunk_id: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in namespace.as_bytes().iter().chain([0u8].iter()).chain(chunk_id.as_bytes()) {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable_and_namespace_scoped() {
        let a = point_id("policies", "policy-cancellation#1");
        let b = point_id("policies", "policy-cancellation#1");
        let c = point_id("faqs", "policy-cancellation#1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_filter_always_pins_namespace() {
        let filter = QdrantIndex::build_filter(
            "policies",
            Some(SearchFilter::equals("doc_type", "policy")),
        );
        assert_eq!(filter.must.len(), 2);
    }

    #[test]
    fn test_config_default() {
        let config = QdrantIndexConfig::default();
        assert_eq!(config.vector_dim, 384);
        assert_eq!(config.collection, "policy_corpus");
    }
}
