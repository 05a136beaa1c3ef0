//! Intent catalog configuration
//!
//! The closed set of intent kinds lives in `converge-core`; this module
//! carries everything config-driven about them: display names,
//! priorities, owning agents, required entities, trigger patterns and
//! example utterances. Loaded from `catalog.yaml`, with a complete
//! built-in default.

use serde::{Deserialize, Serialize};
use std::path::Path;

use converge_core::{AgentKind, EntityKey, IntentKind};

use crate::ConfigError;

/// Single catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentEntry {
    pub kind: IntentKind,
    pub display_name: String,
    /// 1 (lowest) to 10 (highest); orders multi-intent dispatch
    pub priority: u8,
    pub agent: AgentKind,
    #[serde(default)]
    pub required_entities: Vec<EntityKey>,
    /// Regex patterns for the deterministic pattern stage
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Words that must accompany a pattern match for an intent switch
    #[serde(default)]
    pub trigger_words: Vec<String>,
    /// Few-shot examples for the LLM stage
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Intent catalog plus the shared word lists the classifier and the
/// confirmation step consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub intents: Vec<IntentEntry>,
    /// Words that signal a possible multi-intent message
    #[serde(default = "default_multi_intent_markers")]
    pub multi_intent_markers: Vec<String>,
    #[serde(default = "default_affirmations")]
    pub affirmations: Vec<String>,
    #[serde(default = "default_negations")]
    pub negations: Vec<String>,
}

fn default_multi_intent_markers() -> Vec<String> {
    ["and", "also", "plus", "then", "additionally", "by the way"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_affirmations() -> Vec<String> {
    [
        "yes", "yeah", "yep", "sure", "confirm", "confirmed", "ok", "okay", "go ahead",
        "proceed", "correct", "right", "haan",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_negations() -> Vec<String> {
    ["no", "nope", "not yet", "don't", "do not", "stop", "wrong", "nahi"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl CatalogConfig {
    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::FileNotFound(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let catalog: Self =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn get(&self, kind: IntentKind) -> Option<&IntentEntry> {
        self.intents.iter().find(|i| i.kind == kind)
    }

    pub fn required_entities(&self, kind: IntentKind) -> Vec<EntityKey> {
        self.get(kind)
            .map(|i| i.required_entities.clone())
            .unwrap_or_default()
    }

    pub fn agent_for(&self, kind: IntentKind) -> AgentKind {
        self.get(kind)
            .map(|i| i.agent)
            .unwrap_or(AgentKind::Coordinator)
    }

    pub fn priority(&self, kind: IntentKind) -> u8 {
        self.get(kind).map(|i| i.priority).unwrap_or(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.intents {
            if !(1..=10).contains(&entry.priority) {
                return Err(ConfigError::InvalidValue {
                    field: format!("catalog.{}.priority", entry.kind),
                    message: format!("must be 1-10, got {}", entry.priority),
                });
            }
        }
        let mut seen = Vec::new();
        for entry in &self.intents {
            if seen.contains(&entry.kind) {
                return Err(ConfigError::InvalidValue {
                    field: "catalog.intents".to_string(),
                    message: format!("duplicate entry for {}", entry.kind),
                });
            }
            seen.push(entry.kind);
        }
        Ok(())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            intents: vec![
                IntentEntry {
                    kind: IntentKind::BookingCreate,
                    display_name: "Book a service".to_string(),
                    priority: 5,
                    agent: AgentKind::Booking,
                    required_entities: vec![
                        EntityKey::ServiceType,
                        EntityKey::PreferredDate,
                        EntityKey::PreferredTime,
                        EntityKey::Location,
                    ],
                    patterns: vec![
                        r"(?i)\b(book|schedule|arrange)\b.*\b(service|repair|cleaning|technician|visit|ac|plumb\w*|electri\w*)\b".to_string(),
                        r"(?i)\b(need|want)\b.*\b(repair|cleaning|service|technician|plumber|electrician)\b".to_string(),
                    ],
                    trigger_words: vec![
                        "book".to_string(),
                        "schedule".to_string(),
                        "appointment".to_string(),
                    ],
                    examples: vec![
                        "I want to book AC service".to_string(),
                        "schedule a plumber for Saturday".to_string(),
                        "need deep cleaning at home".to_string(),
                    ],
                },
                IntentEntry {
                    kind: IntentKind::BookingCancel,
                    display_name: "Cancel a booking".to_string(),
                    priority: 7,
                    agent: AgentKind::Cancellation,
                    required_entities: vec![EntityKey::BookingId],
                    patterns: vec![
                        r"(?i)\bcancel\b.*\b(booking|order|appointment|visit)\b".to_string(),
                        r"(?i)\bcancel\b.*\bord[a-z0-9]*\d".to_string(),
                    ],
                    trigger_words: vec!["cancel".to_string()],
                    examples: vec![
                        "cancel my booking".to_string(),
                        "actually, cancel booking ORD123".to_string(),
                    ],
                },
                IntentEntry {
                    kind: IntentKind::Complaint,
                    display_name: "File a complaint".to_string(),
                    priority: 8,
                    agent: AgentKind::Complaint,
                    required_entities: vec![EntityKey::IssueType, EntityKey::Description],
                    patterns: vec![
                        r"(?i)\b(complain\w*|grievance)\b".to_string(),
                        r"(?i)\b(no[- ]?show|didn'?t (show|arrive|come)|never (showed|arrived|came)|did not (show|arrive|come))\b".to_string(),
                        r"(?i)\b(terrible|awful|worst|damaged|broke my|unhappy|disappointed|pathetic)\b".to_string(),
                    ],
                    trigger_words: vec![
                        "complaint".to_string(),
                        "complain".to_string(),
                        "unhappy".to_string(),
                    ],
                    examples: vec![
                        "I want to file a complaint".to_string(),
                        "the technician didn't show up".to_string(),
                        "my cabinet was damaged during cleaning".to_string(),
                    ],
                },
                IntentEntry {
                    kind: IntentKind::PolicyInquiry,
                    display_name: "Policy question".to_string(),
                    priority: 4,
                    agent: AgentKind::Policy,
                    required_entities: vec![],
                    patterns: vec![
                        r"(?i)\b(policy|policies|terms and conditions|refund terms)\b".to_string(),
                        r"(?i)\bwhat (is|are) your\b.*\b(terms|charges|fees|warranty|guarantee)\b".to_string(),
                        r"(?i)\b(warranty|guarantee)\b".to_string(),
                    ],
                    trigger_words: vec!["policy".to_string(), "terms".to_string()],
                    examples: vec![
                        "What is your cancellation policy?".to_string(),
                        "do you give a warranty on repairs".to_string(),
                    ],
                },
                IntentEntry {
                    kind: IntentKind::Greeting,
                    display_name: "Greeting".to_string(),
                    priority: 1,
                    agent: AgentKind::Coordinator,
                    required_entities: vec![],
                    patterns: vec![
                        r"(?i)^\s*(hi|hii+|hello|hey|namaste|good (morning|afternoon|evening))[\s!.,]*$".to_string(),
                    ],
                    trigger_words: vec![],
                    examples: vec!["hi".to_string(), "good morning".to_string()],
                },
                IntentEntry {
                    kind: IntentKind::GeneralQuery,
                    display_name: "General question".to_string(),
                    priority: 2,
                    agent: AgentKind::Coordinator,
                    required_entities: vec![],
                    patterns: vec![
                        r"(?i)\b(what services|which services|do you (offer|provide|cover)|how (do|does) (this|it) work)\b".to_string(),
                    ],
                    trigger_words: vec![],
                    examples: vec!["what services do you offer?".to_string()],
                },
                IntentEntry {
                    kind: IntentKind::OutOfScope,
                    display_name: "Out of scope".to_string(),
                    priority: 1,
                    agent: AgentKind::Coordinator,
                    required_entities: vec![],
                    patterns: vec![
                        r"(?i)\b(weather|cricket|football|movie|joke|news|stocks?|recipe|song|election)\b".to_string(),
                    ],
                    trigger_words: vec![],
                    examples: vec!["What is the weather today?".to_string()],
                },
                IntentEntry {
                    kind: IntentKind::UnclearIntent,
                    display_name: "Unclear".to_string(),
                    priority: 1,
                    agent: AgentKind::Coordinator,
                    required_entities: vec![],
                    patterns: vec![],
                    trigger_words: vec![],
                    examples: vec![],
                },
            ],
            multi_intent_markers: default_multi_intent_markers(),
            affirmations: default_affirmations(),
            negations: default_negations(),
        }
    }
}
