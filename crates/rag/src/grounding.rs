//! Grounding score
//!
//! Fraction of the response's informational sentences that are
//! supported by at least one retrieved chunk. Support is lexical:
//! content-word coverage against the chunk. This is the last line of
//! defense against hallucinated policy claims.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Band a scored response falls into. Publish keeps a closed lower
/// bound at the publish threshold; hedge at the hedge threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundingBand {
    /// Publish as-is
    Publish,
    /// Publish with a "based on available policy" hedge; flag for review
    Hedge,
    /// Suppress; return the no-information response
    Suppress,
}

impl GroundingBand {
    pub fn from_score(score: f32, publish_threshold: f32, hedge_threshold: f32) -> Self {
        if score >= publish_threshold {
            Self::Publish
        } else if score >= hedge_threshold {
            Self::Hedge
        } else {
            Self::Suppress
        }
    }
}

/// Scorer configuration.
#[derive(Debug, Clone)]
pub struct GroundingConfig {
    /// Content-word coverage at which a sentence counts as supported
    pub support_overlap: f32,
    /// Sentences shorter than this many words are not informational
    pub min_sentence_words: usize,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            support_overlap: 0.5,
            min_sentence_words: 4,
        }
    }
}

pub struct GroundingScorer {
    config: GroundingConfig,
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "to", "of", "in", "on",
    "at", "by", "for", "with", "from", "and", "or", "but", "if", "then", "you", "your", "our",
    "we", "i", "it", "this", "that", "will", "can", "may", "not", "do", "does", "have", "has",
];

impl GroundingScorer {
    pub fn new(config: GroundingConfig) -> Self {
        Self { config }
    }

    /// Score a response against retrieved chunk texts, in [0, 1].
    pub fn score(&self, response: &str, chunks: &[&str]) -> f32 {
        if response.trim().is_empty() || chunks.is_empty() {
            return 0.0;
        }

        let chunk_words: Vec<HashSet<String>> =
            chunks.iter().map(|c| content_words(c)).collect();

        let sentences: Vec<&str> = response
            .unicode_sentences()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let mut informational: Vec<&str> = sentences
            .iter()
            .copied()
            .filter(|s| s.unicode_words().count() >= self.config.min_sentence_words)
            .collect();
        // A response made only of short sentences is still judged whole
        if informational.is_empty() {
            informational = sentences;
        }
        if informational.is_empty() {
            return 0.0;
        }

        let supported = informational
            .iter()
            .filter(|sentence| self.is_supported(sentence, &chunk_words))
            .count();

        supported as f32 / informational.len() as f32
    }

    fn is_supported(&self, sentence: &str, chunk_words: &[HashSet<String>]) -> bool {
        let words = content_words(sentence);
        if words.is_empty() {
            // Nothing factual to contradict
            return true;
        }
        chunk_words.iter().any(|chunk| {
            let overlap = words.intersection(chunk).count();
            overlap as f32 / words.len() as f32 >= self.config.support_overlap
        })
    }
}

impl Default for GroundingScorer {
    fn default() -> Self {
        Self::new(GroundingConfig::default())
    }
}

fn content_words(text: &str) -> HashSet<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}
