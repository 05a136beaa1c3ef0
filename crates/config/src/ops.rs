//! Runtime ops-config service
//!
//! Operational knobs (SLA buffers, grounding thresholds, retry limits,
//! refund windows) are read through this service rather than from
//! process settings, so operations can change them without a deploy.
//! Reads go through a cache no older than 60 seconds.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use converge_core::Result;

/// Cache TTL mandated by the concurrency model.
pub const OPS_CACHE_TTL_SECS: u64 = 60;

/// Well-known configuration keys.
pub mod keys {
    pub const DEFAULT_STATUS_FILTER: &str = "DEFAULT_STATUS_FILTER";
    pub const SLA_BUFFER_HOURS: &str = "SLA_BUFFER_HOURS";
    pub const MAX_EXPAND_PER_HOUR: &str = "MAX_EXPAND_PER_HOUR";
    pub const ENABLE_AUTO_ENRICHMENT: &str = "ENABLE_AUTO_ENRICHMENT";
    pub const GROUNDING_PUBLISH_THRESHOLD: &str = "GROUNDING_PUBLISH_THRESHOLD";
    pub const GROUNDING_HEDGE_THRESHOLD: &str = "GROUNDING_HEDGE_THRESHOLD";
    pub const RETRIEVAL_SCORE_FLOOR: &str = "RETRIEVAL_SCORE_FLOOR";
    pub const MAX_ENTITY_RETRIES: &str = "MAX_ENTITY_RETRIES";
    pub const COMPLAINT_RESPONSE_HOURS: &str = "COMPLAINT_RESPONSE_HOURS";
    pub const COMPLAINT_RESOLUTION_HOURS: &str = "COMPLAINT_RESOLUTION_HOURS";
}

/// Backing store for runtime configuration values.
#[async_trait]
pub trait OpsConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// In-process store seeded from settings; also the test double.
#[derive(Default)]
pub struct StaticOpsConfig {
    values: RwLock<HashMap<String, String>>,
}

impl StaticOpsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }
}

#[async_trait]
impl OpsConfigStore for StaticOpsConfig {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }
}

/// Caching decorator; updates take effect on next read after expiry.
pub struct CachedOpsConfig {
    inner: Arc<dyn OpsConfigStore>,
    ttl: Duration,
    cache: DashMap<String, (Option<String>, Instant)>,
}

impl CachedOpsConfig {
    pub fn new(inner: Arc<dyn OpsConfigStore>) -> Self {
        Self::with_ttl(inner, Duration::from_secs(OPS_CACHE_TTL_SECS))
    }

    pub fn with_ttl(inner: Arc<dyn OpsConfigStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: DashMap::new(),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.cache.get(key) {
            let (value, fetched_at) = entry.value();
            if fetched_at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }
        let value = self.inner.get(key).await?;
        self.cache
            .insert(key.to_string(), (value.clone(), Instant::now()));
        Ok(value)
    }

    pub async fn get_f32(&self, key: &str, default: f32) -> f32 {
        match self.get(key).await {
            Ok(Some(v)) => v.parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %v, "ops config value is not a float, using default");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "ops config read failed, using default");
                default
            }
        }
    }

    pub async fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.get(key).await {
            Ok(Some(v)) => v.parse().unwrap_or(default),
            Ok(None) => default,
            Err(_) => default,
        }
    }

    pub async fn get_u32(&self, key: &str, default: u32) -> u32 {
        match self.get(key).await {
            Ok(Some(v)) => v.parse().unwrap_or(default),
            Ok(None) => default,
            Err(_) => default,
        }
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).await {
            Ok(Some(v)) => matches!(v.as_str(), "true" | "1" | "yes" | "on"),
            Ok(None) => default,
            Err(_) => default,
        }
    }

    pub async fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key).await {
            Ok(Some(v)) => v,
            _ => default.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_store_get_set() {
        let store = StaticOpsConfig::new();
        assert_eq!(store.get(keys::SLA_BUFFER_HOURS).await.unwrap(), None);

        store.set(keys::SLA_BUFFER_HOURS, "6");
        assert_eq!(
            store.get(keys::SLA_BUFFER_HOURS).await.unwrap(),
            Some("6".to_string())
        );
    }

    #[tokio::test]
    async fn test_cache_serves_stale_until_ttl() {
        let store = Arc::new(StaticOpsConfig::new());
        store.set(keys::MAX_ENTITY_RETRIES, "3");

        let cached = CachedOpsConfig::with_ttl(store.clone(), Duration::from_secs(60));
        assert_eq!(cached.get_u32(keys::MAX_ENTITY_RETRIES, 0).await, 3);

        // Update lands in the store but the cache is still fresh
        store.set(keys::MAX_ENTITY_RETRIES, "5");
        assert_eq!(cached.get_u32(keys::MAX_ENTITY_RETRIES, 0).await, 3);
    }

    #[tokio::test]
    async fn test_cache_refreshes_after_ttl() {
        let store = Arc::new(StaticOpsConfig::new());
        store.set(keys::SLA_BUFFER_HOURS, "4");

        let cached = CachedOpsConfig::with_ttl(store.clone(), Duration::from_millis(10));
        assert_eq!(cached.get_f32(keys::SLA_BUFFER_HOURS, 0.0).await, 4.0);

        store.set(keys::SLA_BUFFER_HOURS, "8");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cached.get_f32(keys::SLA_BUFFER_HOURS, 0.0).await, 8.0);
    }

    #[tokio::test]
    async fn test_typed_getters_fall_back_on_garbage() {
        let store = Arc::new(StaticOpsConfig::new());
        store.set(keys::GROUNDING_PUBLISH_THRESHOLD, "not-a-number");

        let cached = CachedOpsConfig::new(store);
        assert_eq!(
            cached.get_f32(keys::GROUNDING_PUBLISH_THRESHOLD, 0.7).await,
            0.7
        );
        assert!(!cached.get_bool(keys::ENABLE_AUTO_ENRICHMENT, false).await);
    }
}
