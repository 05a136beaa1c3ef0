//! Retrieval-augmented answering for policy questions
//!
//! - `VectorIndex`: the service contract the core consumes
//!   (`search`/`upsert`/`delete`/`health`, namespace-scoped)
//! - `QdrantIndex`: production implementation over one Qdrant
//!   collection with a namespace payload field
//! - `InMemoryIndex`: brute-force cosine implementation for tests and
//!   RAG-disabled deployments
//! - `GroundingScorer`: fraction of informational response sentences
//!   supported by retrieved context
//! - `PolicyAgent`: the retrieve -> floor-check -> generate -> ground
//!   -> cite pipeline; refuses to answer rather than hallucinate

pub mod corpus;
pub mod embeddings;
pub mod grounding;
pub mod index;
pub mod policy;
pub mod qdrant;

pub use corpus::{namespaces, PolicyChunk};
pub use embeddings::{Embedder, EmbeddingConfig, HashEmbedder};
pub use grounding::{GroundingBand, GroundingConfig, GroundingScorer};
pub use index::{InMemoryIndex, ScoredChunk, SearchFilter, VectorIndex};
pub use policy::{PolicyAgent, PolicyAgentConfig, PolicyAnswer, NO_INFORMATION_MESSAGE};
pub use qdrant::{QdrantIndex, QdrantIndexConfig};

use thiserror::Error;

/// RAG errors.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("search timed out")]
    Timeout,

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl From<RagError> for converge_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Timeout => converge_core::Error::Timeout("vector search".to_string()),
            other => converge_core::Error::Retrieval(other.to_string()),
        }
    }
}
