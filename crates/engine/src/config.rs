//! Engine configuration. Every field has a default, so an empty document
//! deserializes to the stock settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Graph cache lifetimes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hard lifetime of a snapshot, counted from its load.
    pub absolute_ttl_secs: u64,
    /// Idle lifetime; every read pushes it forward.
    pub sliding_ttl_secs: u64,
    /// How long past absolute expiry a stale snapshot may still be served
    /// while the store refuses to reload.
    pub grace_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            absolute_ttl_secs: 30 * 60,
            sliding_ttl_secs: 10 * 60,
            grace_secs: 5 * 60,
        }
    }
}

impl CacheConfig {
    pub fn absolute_ttl(&self) -> Duration {
        Duration::from_secs(self.absolute_ttl_secs)
    }

    pub fn sliding_ttl(&self) -> Duration {
        Duration::from_secs(self.sliding_ttl_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    /// Deadline applied to a request's store calls when the caller sets none.
    pub store_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            store_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
