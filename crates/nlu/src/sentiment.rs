//! Lexicon sentiment scoring
//!
//! Feeds the sentiment-urgency component of the priority-queue score.
//! Scores land in [-1, 1]; negative is angry.

use once_cell::sync::Lazy;
use std::collections::HashSet;

static NEGATIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "angry", "annoyed", "awful", "bad", "broken", "cheated", "damaged", "delay", "delayed",
        "disappointed", "frustrated", "furious", "horrible", "late", "never", "pathetic", "poor",
        "refund", "ridiculous", "rude", "terrible", "unacceptable", "unhappy", "upset", "useless",
        "waited", "waiting", "worst", "wrong",
    ]
    .into_iter()
    .collect()
});

static POSITIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "amazing", "appreciate", "awesome", "excellent", "fantastic", "good", "great", "happy",
        "helpful", "love", "nice", "perfect", "pleased", "satisfied", "thank", "thanks",
        "wonderful",
    ]
    .into_iter()
    .collect()
});

/// Stateless lexicon scorer.
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Score a message in [-1, 1].
    pub fn score(&self, message: &str) -> f32 {
        let mut positive = 0i32;
        let mut negative = 0i32;

        for word in message
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        {
            if NEGATIVE_WORDS.contains(word) {
                negative += 1;
            } else if POSITIVE_WORDS.contains(word) {
                positive += 1;
            }
        }

        // Shouted messages read angrier
        let caps_boost = {
            let letters: Vec<char> = message.chars().filter(|c| c.is_alphabetic()).collect();
            let upper = letters.iter().filter(|c| c.is_uppercase()).count();
            letters.len() >= 10 && upper * 2 > letters.len()
        };
        if caps_boost {
            negative += 1;
        }

        if positive == 0 && negative == 0 {
            return 0.0;
        }
        let score = (positive - negative) as f32 / (positive + negative) as f32;
        score.clamp(-1.0, 1.0)
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_message() {
        let s = SentimentAnalyzer::new();
        let score = s.score("Technician never arrived, terrible service, I waited two hours");
        assert!(score < -0.5, "got {}", score);
    }

    #[test]
    fn test_positive_message() {
        let s = SentimentAnalyzer::new();
        assert!(s.score("great service, thank you!") > 0.5);
    }

    #[test]
    fn test_neutral_message() {
        let s = SentimentAnalyzer::new();
        assert_eq!(s.score("I want to book AC service tomorrow"), 0.0);
    }

    #[test]
    fn test_all_caps_reads_angrier() {
        let s = SentimentAnalyzer::new();
        let plain = s.score("where is my technician, he is late");
        let shouted = s.score("WHERE IS MY TECHNICIAN, HE IS LATE");
        assert!(shouted <= plain);
    }
}
