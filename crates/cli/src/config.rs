//! Server configuration: TOML file, then environment, then flags.

use std::path::Path;

use serde::Deserialize;
use txflow_engine::EngineConfig;

pub(crate) const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct ServerConfig {
    pub(crate) port: u16,
    /// When set, `/admin/*` requires this key.
    pub(crate) admin_api_key: Option<String>,
    pub(crate) engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            admin_api_key: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `path` if given, otherwise start from defaults.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("error reading {}: {}", path.display(), e))?;
        toml::from_str(&text).map_err(|e| format!("error parsing {}: {}", path.display(), e))
    }

    /// Apply `TXFLOW_*` overrides from `lookup` (normally the process
    /// environment). Empty values are ignored.
    pub(crate) fn apply_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("TXFLOW_PORT") {
            self.port = parse("TXFLOW_PORT", &port)?;
        }
        if let Some(key) = get("TXFLOW_ADMIN_KEY") {
            self.admin_api_key = Some(key);
        }
        if let Some(ms) = get("TXFLOW_STORE_TIMEOUT_MS") {
            self.engine.store_timeout_ms = parse("TXFLOW_STORE_TIMEOUT_MS", &ms)?;
        }
        if let Some(secs) = get("TXFLOW_CACHE_TTL_SECS") {
            self.engine.cache.absolute_ttl_secs = parse("TXFLOW_CACHE_TTL_SECS", &secs)?;
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value for {key}: '{value}'"))
}
