//! Vector index contract and in-memory implementation

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::corpus::PolicyChunk;
use crate::embeddings::{cosine, Embedder, HashEmbedder};
use crate::RagError;

/// Metadata equality filter applied server-side where possible.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub conditions: HashMap<String, String>,
}

impl SearchFilter {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            conditions: HashMap::from([(key.into(), value.into())]),
        }
    }

    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.conditions
            .iter()
            .all(|(k, v)| metadata.get(k).map(|m| m == v).unwrap_or(false))
    }
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub metadata: HashMap<String, String>,
}

/// The index contract the core consumes. Namespaces partition the
/// corpus by document kind.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(
        &self,
        query: &str,
        namespace: &str,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<ScoredChunk>, RagError>;

    async fn upsert(&self, chunks: &[PolicyChunk], namespace: &str) -> Result<(), RagError>;

    async fn delete(&self, ids: &[String], namespace: &str) -> Result<(), RagError>;

    async fn health(&self) -> bool;
}

struct StoredChunk {
    chunk: PolicyChunk,
    vector: Vec<f32>,
}

/// Brute-force cosine index. Used by tests and by deployments that run
/// without a vector store.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    store: RwLock<HashMap<String, Vec<StoredChunk>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::with_embedder(Arc::new(HashEmbedder::default()))
    }

    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            store: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.store.read().get(namespace).map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search(
        &self,
        query: &str,
        namespace: &str,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let query_vector = self.embedder.embed(query)?;
        let store = self.store.read();
        let Some(chunks) = store.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|stored| {
                filter
                    .as_ref()
                    .map(|f| f.matches(&stored.chunk.metadata()))
                    .unwrap_or(true)
            })
            .map(|stored| ScoredChunk {
                id: stored.chunk.id.clone(),
                score: cosine(&query_vector, &stored.vector),
                content: stored.chunk.content.clone(),
                metadata: stored.chunk.metadata(),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        results.truncate(top_k);
        Ok(results)
    }

    async fn upsert(&self, chunks: &[PolicyChunk], namespace: &str) -> Result<(), RagError> {
        let mut store = self.store.write();
        let bucket = store.entry(namespace.to_string()).or_default();
        for chunk in chunks {
            if chunk.id.is_empty() {
                return Err(RagError::InvalidDocument("chunk id is empty".to_string()));
            }
            let vector = self.embedder.embed(&chunk.content)?;
            bucket.retain(|stored| stored.chunk.id != chunk.id);
            bucket.push(StoredChunk {
                chunk: chunk.clone(),
                vector,
            });
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String], namespace: &str) -> Result<(), RagError> {
        let mut store = self.store.write();
        if let Some(bucket) = store.get_mut(namespace) {
            bucket.retain(|stored| !ids.contains(&stored.chunk.id));
        }
        Ok(())
    }

    async fn health(&self) -> bool {
        true
    }
}
