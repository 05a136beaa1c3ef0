//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ConfigError;

/// Runtime environment, selects validation strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Hosted LLM configuration (temperature bands, budgets)
    #[serde(default)]
    pub llm: LlmSettings,

    /// Retrieval and grounding configuration
    #[serde(default)]
    pub rag: RagSettings,

    /// Slot-filling graph thresholds and budgets
    #[serde(default)]
    pub dialog: DialogSettings,

    /// Priority-queue scoring and SLA-risk configuration
    #[serde(default)]
    pub review: ReviewSettings,

    /// Business SLA rules (complaints, refunds, service hours)
    #[serde(default)]
    pub sla: SlaSettings,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Path to the intent catalog YAML
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Path to the entity rules YAML
    #[serde(default = "default_entities_path")]
    pub entities_path: String,
}

fn default_catalog_path() -> String {
    "config/catalog.yaml".to_string()
}

fn default_entities_path() -> String {
    "config/entities.yaml".to_string()
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_rag()?;
        self.validate_dialog()?;
        self.validate_review()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("llm.classification_temperature", self.llm.classification_temperature),
            ("llm.extraction_temperature", self.llm.extraction_temperature),
            ("llm.generation_temperature", self.llm.generation_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 0.0 and 2.0, got {}", value),
                });
            }
        }
        // Classification must stay deterministic
        if self.llm.classification_temperature > 0.3 {
            return Err(ConfigError::InvalidValue {
                field: "llm.classification_temperature".to_string(),
                message: "must not exceed 0.3".to_string(),
            });
        }
        if self.environment.is_strict() && self.llm.api_key.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "llm.api_key".to_string(),
                message: "required outside development".to_string(),
            });
        }
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("rag.score_floor", self.rag.score_floor),
            ("rag.grounding_publish_threshold", self.rag.grounding_publish_threshold),
            ("rag.grounding_hedge_threshold", self.rag.grounding_hedge_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 0.0 and 1.0, got {}", value),
                });
            }
        }
        if self.rag.grounding_hedge_threshold >= self.rag.grounding_publish_threshold {
            return Err(ConfigError::InvalidValue {
                field: "rag.grounding_hedge_threshold".to_string(),
                message: "hedge threshold must be below publish threshold".to_string(),
            });
        }
        if self.rag.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.top_k".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_dialog(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("dialog.pattern_confidence_threshold", self.dialog.pattern_confidence_threshold),
            ("dialog.follow_up_confidence_threshold", self.dialog.follow_up_confidence_threshold),
            ("dialog.intent_switch_threshold", self.dialog.intent_switch_threshold),
            ("dialog.review_confidence_threshold", self.dialog.review_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 0.0 and 1.0, got {}", value),
                });
            }
        }
        if self.dialog.max_entity_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dialog.max_entity_retries".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.dialog.node_timeout_ms >= self.dialog.turn_timeout_ms {
            return Err(ConfigError::InvalidValue {
                field: "dialog.node_timeout_ms".to_string(),
                message: "per-node timeout must be below the turn timeout".to_string(),
            });
        }
        Ok(())
    }

    fn validate_review(&self) -> Result<(), ConfigError> {
        let sum = self.review.confidence_weight
            + self.review.sentiment_weight
            + self.review.time_decay_weight
            + self.review.history_weight;
        if (sum - 1.0).abs() > 0.001 {
            return Err(ConfigError::InvalidValue {
                field: "review".to_string(),
                message: format!("priority weights must sum to 1.0, got {}", sum),
            });
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_connections() -> usize {
    1000
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

/// Hosted LLM settings. Temperature bands: classification 0.3,
/// extraction 0.2, generation 0.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Set via CONVERGE__LLM__API_KEY
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_classification_temperature")]
    pub classification_temperature: f32,

    #[serde(default = "default_extraction_temperature")]
    pub extraction_temperature: f32,

    #[serde(default = "default_generation_temperature")]
    pub generation_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Budget for classification calls
    #[serde(default = "default_classification_timeout_ms")]
    pub classification_timeout_ms: u64,

    /// Budget for generation calls
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_classification_temperature() -> f32 {
    0.3
}
fn default_extraction_temperature() -> f32 {
    0.2
}
fn default_generation_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_classification_timeout_ms() -> u64 {
    5_000
}
fn default_generation_timeout_ms() -> u64 {
    10_000
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            classification_temperature: default_classification_temperature(),
            extraction_temperature: default_extraction_temperature(),
            generation_temperature: default_generation_temperature(),
            max_tokens: default_max_tokens(),
            classification_timeout_ms: default_classification_timeout_ms(),
            generation_timeout_ms: default_generation_timeout_ms(),
        }
    }
}

/// Retrieval and grounding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    /// Embedding dimension of the hosted model
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Below this top-score the policy agent refuses to answer
    #[serde(default = "default_score_floor")]
    pub score_floor: f32,

    /// Grounding >= publish threshold: publish as-is
    #[serde(default = "default_grounding_publish")]
    pub grounding_publish_threshold: f32,

    /// Grounding in [hedge, publish): publish hedged and flag for review
    #[serde(default = "default_grounding_hedge")]
    pub grounding_hedge_threshold: f32,

    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
}

fn default_qdrant_endpoint() -> String {
    "http://localhost:6334".to_string()
}
fn default_qdrant_collection() -> String {
    "policy_corpus".to_string()
}
fn default_vector_dim() -> usize {
    384
}
fn default_top_k() -> usize {
    5
}
fn default_score_floor() -> f32 {
    0.55
}
fn default_grounding_publish() -> f32 {
    0.70
}
fn default_grounding_hedge() -> f32 {
    0.50
}
fn default_search_timeout_ms() -> u64 {
    2_000
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            qdrant_api_key: None,
            vector_dim: default_vector_dim(),
            top_k: default_top_k(),
            score_floor: default_score_floor(),
            grounding_publish_threshold: default_grounding_publish(),
            grounding_hedge_threshold: default_grounding_hedge(),
            search_timeout_ms: default_search_timeout_ms(),
        }
    }
}

/// Slot-filling graph thresholds and budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogSettings {
    /// Idle expiry of an active dialog state
    #[serde(default = "default_state_ttl_minutes")]
    pub state_ttl_minutes: i64,

    /// Escalation fires when any one entity reaches this retry count
    #[serde(default = "default_max_entity_retries")]
    pub max_entity_retries: u32,

    /// Most-recent turns used as classifier context
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Pattern stage returns immediately at or above this confidence
    #[serde(default = "default_pattern_threshold")]
    pub pattern_confidence_threshold: f32,

    /// Follow-up path taken above this confidence
    #[serde(default = "default_follow_up_threshold")]
    pub follow_up_confidence_threshold: f32,

    /// A different intent clears the active state at or above this
    #[serde(default = "default_intent_switch_threshold")]
    pub intent_switch_threshold: f32,

    /// Below this confidence a published turn must enqueue for review
    #[serde(default = "default_review_threshold")]
    pub review_confidence_threshold: f32,

    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,

    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
}

fn default_state_ttl_minutes() -> i64 {
    30
}
fn default_max_entity_retries() -> u32 {
    3
}
fn default_history_window() -> usize {
    10
}
fn default_pattern_threshold() -> f32 {
    0.90
}
fn default_follow_up_threshold() -> f32 {
    0.6
}
fn default_intent_switch_threshold() -> f32 {
    0.90
}
fn default_review_threshold() -> f32 {
    0.70
}
fn default_node_timeout_ms() -> u64 {
    3_000
}
fn default_turn_timeout_ms() -> u64 {
    30_000
}

impl Default for DialogSettings {
    fn default() -> Self {
        Self {
            state_ttl_minutes: default_state_ttl_minutes(),
            max_entity_retries: default_max_entity_retries(),
            history_window: default_history_window(),
            pattern_confidence_threshold: default_pattern_threshold(),
            follow_up_confidence_threshold: default_follow_up_threshold(),
            intent_switch_threshold: default_intent_switch_threshold(),
            review_confidence_threshold: default_review_threshold(),
            node_timeout_ms: default_node_timeout_ms(),
            turn_timeout_ms: default_turn_timeout_ms(),
        }
    }
}

/// Priority-queue scoring and SLA-risk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSettings {
    /// Weight of the confidence deficit component
    #[serde(default = "default_confidence_weight")]
    pub confidence_weight: f32,

    #[serde(default = "default_sentiment_weight")]
    pub sentiment_weight: f32,

    #[serde(default = "default_time_decay_weight")]
    pub time_decay_weight: f32,

    #[serde(default = "default_history_weight")]
    pub history_weight: f32,

    /// Hours at which the time-decay component saturates
    #[serde(default = "default_time_decay_hours")]
    pub time_decay_saturation_hours: f32,

    /// Repeat issues at which the history component saturates
    #[serde(default = "default_history_saturation")]
    pub history_saturation: u32,

    /// Buffer subtracted from the expected response time when labelling
    /// entries at_risk
    #[serde(default = "default_sla_buffer_hours")]
    pub sla_buffer_hours: f32,

    /// Expected response minutes per intent kind
    #[serde(default = "default_expected_response_minutes")]
    pub expected_response_minutes: HashMap<String, u64>,

    #[serde(default = "default_status_filter")]
    pub default_status_filter: String,

    #[serde(default = "default_max_expand_per_hour")]
    pub max_expand_per_hour: u32,

    #[serde(default)]
    pub enable_auto_enrichment: bool,
}

fn default_confidence_weight() -> f32 {
    0.40
}
fn default_sentiment_weight() -> f32 {
    0.30
}
fn default_time_decay_weight() -> f32 {
    0.20
}
fn default_history_weight() -> f32 {
    0.10
}
fn default_time_decay_hours() -> f32 {
    24.0
}
fn default_history_saturation() -> u32 {
    5
}
fn default_sla_buffer_hours() -> f32 {
    4.0
}
fn default_expected_response_minutes() -> HashMap<String, u64> {
    HashMap::from([
        ("complaint".to_string(), 120),
        ("booking_cancel".to_string(), 240),
        ("booking_create".to_string(), 480),
        ("unclear_intent".to_string(), 720),
    ])
}
fn default_status_filter() -> String {
    "pending".to_string()
}
fn default_max_expand_per_hour() -> u32 {
    50
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            confidence_weight: default_confidence_weight(),
            sentiment_weight: default_sentiment_weight(),
            time_decay_weight: default_time_decay_weight(),
            history_weight: default_history_weight(),
            time_decay_saturation_hours: default_time_decay_hours(),
            history_saturation: default_history_saturation(),
            sla_buffer_hours: default_sla_buffer_hours(),
            expected_response_minutes: default_expected_response_minutes(),
            default_status_filter: default_status_filter(),
            max_expand_per_hour: default_max_expand_per_hour(),
            enable_auto_enrichment: false,
        }
    }
}

/// One refund band: applies when the booking is at least
/// `min_hours_before` away at cancellation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundWindow {
    pub min_hours_before: f32,
    pub refund_fraction: f32,
    pub label: String,
}

/// Business SLA rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaSettings {
    #[serde(default = "default_complaint_response_hours")]
    pub complaint_response_hours: i64,

    #[serde(default = "default_complaint_resolution_hours")]
    pub complaint_resolution_hours: i64,

    /// Refund bands ordered most-generous first
    #[serde(default = "default_refund_windows")]
    pub refund_windows: Vec<RefundWindow>,

    #[serde(default = "default_refund_processing_days")]
    pub refund_processing_days: u32,
}

fn default_complaint_response_hours() -> i64 {
    48
}
fn default_complaint_resolution_hours() -> i64 {
    168
}
fn default_refund_windows() -> Vec<RefundWindow> {
    vec![
        RefundWindow {
            min_hours_before: 24.0,
            refund_fraction: 1.0,
            label: "full".to_string(),
        },
        RefundWindow {
            min_hours_before: 2.0,
            refund_fraction: 0.5,
            label: "partial".to_string(),
        },
        RefundWindow {
            min_hours_before: 0.0,
            refund_fraction: 0.0,
            label: "none".to_string(),
        },
    ]
}
fn default_refund_processing_days() -> u32 {
    5
}

impl Default for SlaSettings {
    fn default() -> Self {
        Self {
            complaint_response_hours: default_complaint_response_hours(),
            complaint_resolution_hours: default_complaint_resolution_hours(),
            refund_windows: default_refund_windows(),
            refund_processing_days: default_refund_processing_days(),
        }
    }
}

/// ScyllaDB persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// false = in-memory stores only (development)
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}
fn default_keyspace() -> String {
    "converge".to_string()
}
fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (CONVERGE__ prefix, __ separator)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CONVERGE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
