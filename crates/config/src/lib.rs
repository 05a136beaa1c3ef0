//! Configuration management for the ConvergeAI core
//!
//! Three layers:
//! - `settings`: process settings loaded from `config/default.yaml`,
//!   `config/{env}.yaml`, then `CONVERGE__`-prefixed environment
//!   variables (highest priority)
//! - `catalog` / `entities`: the YAML-driven intent catalog and entity
//!   rule set, with complete built-in defaults so the system boots
//!   without files
//! - `ops`: the runtime ops-config service; values take effect on next
//!   read with no cache older than 60 seconds

pub mod catalog;
pub mod entities;
pub mod ops;
pub mod settings;

pub use catalog::{CatalogConfig, IntentEntry};
pub use entities::{
    EntityRulesConfig, IssueTypeEntry, PricingRules, ServiceArea, ServiceHours, ServiceTypeEntry,
};
pub use ops::{keys, CachedOpsConfig, OpsConfigStore, StaticOpsConfig, OPS_CACHE_TTL_SECS};
pub use settings::{
    load_settings, DialogSettings, LlmSettings, ObservabilityConfig, PersistenceConfig,
    RagSettings, RefundWindow, ReviewSettings, RuntimeEnvironment, ServerConfig, Settings,
    SlaSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for converge_core::Error {
    fn from(err: ConfigError) -> Self {
        converge_core::Error::Config(err.to_string())
    }
}
