//! Text embeddings
//!
//! The embedding model itself is an external collaborator; this module
//! stands at its contract: fixed dimension, L2-normalized vectors,
//! cosine metric. `HashEmbedder` is the deterministic in-process
//! implementation used for tests and for deployments where the hosted
//! model is fronted by the index service.

use crate::RagError;

/// Embedding configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub embedding_dim: usize,
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 384,
            normalize: true,
        }
    }
}

/// Embedder contract: text in, fixed-dim vector out.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
    fn dim(&self) -> usize;
}

/// Deterministic token-hash embedder.
///
/// Tokens and token bigrams hash into the vector; the result is
/// L2-normalized so dot product equals cosine similarity. Lexically
/// similar texts land near each other, which is the property the
/// retrieval tests rely on.
pub struct HashEmbedder {
    config: EmbeddingConfig,
}

impl HashEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    fn fold_token(&self, token: &str, weight: f32, embedding: &mut [f32]) {
        let idx = fnv1a(token.as_bytes()) as usize % self.config.embedding_dim;
        embedding[idx] += weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default())
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut embedding = vec![0.0f32; self.config.embedding_dim];

        let tokens: Vec<String> = text
            .to_lowercase()
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_string()
            })
            .filter(|w| !w.is_empty())
            .collect();

        for token in &tokens {
            self.fold_token(token, 1.0, &mut embedding);
        }
        for pair in tokens.windows(2) {
            self.fold_token(&format!("{} {}", pair[0], pair[1]), 0.5, &mut embedding);
        }

        if self.config.normalize {
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut embedding {
                    *v /= norm;
                }
            }
        }

        Ok(embedding)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity of two equal-length vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_shape_and_norm() {
        let embedder = HashEmbedder::default();
        let embedding = embedder.embed("what is the cancellation policy").unwrap();

        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("refund policy").unwrap();
        let b = embedder.embed("refund policy").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_similar_text_scores_higher() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("cancellation refund policy").unwrap();
        let related = embedder
            .embed("our cancellation policy gives a full refund before 24 hours")
            .unwrap();
        let unrelated = embedder
            .embed("the technician carries a toolkit and spare parts")
            .unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }
}
