//! Pattern stage of the hybrid intent classifier
//!
//! Compiled-regex scan against the catalog. A single unambiguous match
//! at or above the pattern threshold lets the classifier skip the LLM
//! entirely; typical latency is well under a millisecond.

use regex::Regex;

use converge_config::CatalogConfig;
use converge_core::IntentKind;

/// One scored pattern hit.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub intent: IntentKind,
    pub confidence: f32,
    /// Whether one of the intent's trigger words appears in the message.
    /// Intent switches mid-dialog additionally require this.
    pub has_trigger_word: bool,
}

struct CompiledIntent {
    kind: IntentKind,
    regexes: Vec<Regex>,
    trigger_words: Vec<String>,
}

/// Deterministic keyword/regex scanner over the intent catalog.
pub struct PatternIntentMatcher {
    intents: Vec<CompiledIntent>,
    multi_intent_markers: Vec<String>,
    affirmations: Vec<String>,
    negations: Vec<String>,
}

const BASE_MATCH_CONFIDENCE: f32 = 0.92;
const MULTI_PATTERN_BONUS: f32 = 0.03;

impl PatternIntentMatcher {
    /// Compile the catalog's patterns. Invalid regexes are skipped with
    /// a warning rather than failing startup.
    pub fn from_catalog(catalog: &CatalogConfig) -> Self {
        let intents = catalog
            .intents
            .iter()
            .map(|entry| CompiledIntent {
                kind: entry.kind,
                regexes: entry
                    .patterns
                    .iter()
                    .filter_map(|p| match Regex::new(p) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            tracing::warn!(intent = %entry.kind, pattern = %p, error = %e, "skipping invalid intent pattern");
                            None
                        }
                    })
                    .collect(),
                trigger_words: entry
                    .trigger_words
                    .iter()
                    .map(|w| w.to_lowercase())
                    .collect(),
            })
            .collect();

        Self {
            intents,
            multi_intent_markers: catalog
                .multi_intent_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
            affirmations: catalog.affirmations.iter().map(|a| a.to_lowercase()).collect(),
            negations: catalog.negations.iter().map(|n| n.to_lowercase()).collect(),
        }
    }

    /// Scan the message against every intent; results sorted by
    /// confidence descending.
    pub fn scan(&self, message: &str) -> Vec<PatternMatch> {
        let lowered = message.to_lowercase();
        let mut matches: Vec<PatternMatch> = self
            .intents
            .iter()
            .filter_map(|intent| {
                let hits = intent.regexes.iter().filter(|re| re.is_match(message)).count();
                if hits == 0 {
                    return None;
                }
                let confidence = (BASE_MATCH_CONFIDENCE
                    + MULTI_PATTERN_BONUS * (hits as f32 - 1.0))
                    .min(0.98);
                Some(PatternMatch {
                    intent: intent.kind,
                    confidence,
                    has_trigger_word: intent
                        .trigger_words
                        .iter()
                        .any(|w| contains_word(&lowered, w)),
                })
            })
            .collect();

        matches.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        matches
    }

    /// Highest-confidence match, if any.
    pub fn best(&self, message: &str) -> Option<PatternMatch> {
        self.scan(message).into_iter().next()
    }

    /// Best match for a specific intent kind.
    pub fn match_for(&self, message: &str, kind: IntentKind) -> Option<PatternMatch> {
        self.scan(message).into_iter().find(|m| m.intent == kind)
    }

    /// True when one of the multi-intent signal words appears.
    pub fn has_multi_intent_signal(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.multi_intent_markers
            .iter()
            .any(|marker| contains_word(&lowered, marker))
    }

    /// True when the message reads as a confirmation.
    pub fn is_affirmative(&self, message: &str) -> bool {
        let lowered = normalize_short_answer(message);
        if self.is_negative(message) {
            return false;
        }
        self.affirmations.iter().any(|a| {
            lowered == *a || lowered.starts_with(&format!("{} ", a)) || contains_word(&lowered, a)
        })
    }

    /// True when the message reads as a refusal.
    pub fn is_negative(&self, message: &str) -> bool {
        let lowered = normalize_short_answer(message);
        self.negations
            .iter()
            .any(|n| lowered == *n || lowered.starts_with(&format!("{} ", n)))
    }
}

fn normalize_short_answer(message: &str) -> String {
    message
        .trim()
        .trim_end_matches(['.', '!', ',', '?'])
        .to_lowercase()
}

/// Word-boundary containment; markers may be multi-word ("by the way").
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.split_whitespace().collect::<Vec<_>>().windows(
        needle.split_whitespace().count().max(1),
    ).any(|window| {
        window
            .iter()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .collect::<Vec<_>>()
            .join(" ")
            == needle
    })
}
