//! Gateway configuration
//!
//! Loaded once at startup (and again on reload) from a YAML file, with the
//! listen address overridable through `LISTEN`. Everything is validated here
//! so that a bad route or bound is rejected before any request is served.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::proxy::cache::ResponseCache;
use crate::proxy::orchestrator::{ForwardSettings, Snapshot};
use crate::proxy::policy::SecurityPolicy;
use crate::proxy::route::{AuthSpec, RouteTable};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "CORSWAY_CONFIG";
/// Environment variable overriding `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";
/// File read when `CORSWAY_CONFIG` is unset. Missing is fine; defaults apply.
pub const DEFAULT_CONFIG_PATH: &str = "corsway.yaml";

pub const MAX_TIMEOUT_MS: u64 = 300_000;
pub const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid route '{route}': {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub proxy: ProxySettings,
    pub cache: CacheConfig,
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub allowed_origins: Vec<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl_ms: u64,
    pub max_entries: usize,
    pub per_route_ttl_ms: HashMap<String, u64>,
    pub purge_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_ms: 300_000,
            max_entries: 1000,
            per_route_ttl_ms: HashMap::new(),
            purge_interval_ms: 60_000,
        }
    }
}

/// One `routes:` entry.
///
/// `path_rewrite` and `headers` are YAML mappings whose order is kept:
/// rewrite rules apply in the order they are written.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    #[serde(alias = "target")]
    pub target_base_url: String,
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub path_rewrite: Vec<(String, String)>,
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub auth: Option<AuthSpec>,
}

impl GatewayConfig {
    /// Loads from `CORSWAY_CONFIG` (or `corsway.yaml` if present), applies
    /// environment overrides and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML file without applying overrides or validation.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            if !listen.trim().is_empty() {
                self.server.listen_addr = listen;
            }
        }
    }

    /// Rejects out-of-range bounds and malformed routes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.timeout_ms == 0 || self.proxy.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::InvalidSetting {
                field: "proxy.timeout_ms",
                reason: format!("must be between 1 and {MAX_TIMEOUT_MS}"),
            });
        }

        if self.proxy.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidSetting {
                field: "proxy.max_retries",
                reason: format!("must be at most {MAX_RETRIES_LIMIT}"),
            });
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "cache.max_entries",
                reason: "must be at least 1 when the cache is enabled".to_string(),
            });
        }

        if self.cache.purge_interval_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "cache.purge_interval_ms",
                reason: "must be greater than 0".to_string(),
            });
        }

        let routes = RouteTable::from_config(&self.routes)?;

        if let Some(unknown) = self
            .cache
            .per_route_ttl_ms
            .keys()
            .find(|name| routes.get(name).is_none())
        {
            return Err(ConfigError::InvalidSetting {
                field: "cache.per_route_ttl_ms",
                reason: format!("unknown route '{unknown}'"),
            });
        }

        Ok(())
    }

    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        RouteTable::from_config(&self.routes)
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy::new(
            self.proxy.allowed_origins.iter().cloned(),
            &self.proxy.allowed_domains,
            &self.proxy.blocked_domains,
        )
    }

    pub fn forward_settings(&self) -> ForwardSettings {
        ForwardSettings {
            timeout: Duration::from_millis(self.proxy.timeout_ms),
            max_retries: self.proxy.max_retries,
            cache_enabled: self.cache.enabled,
            default_ttl: Duration::from_millis(self.cache.default_ttl_ms),
            route_ttls: self
                .cache
                .per_route_ttl_ms
                .iter()
                .map(|(name, ms)| (name.clone(), Duration::from_millis(*ms)))
                .collect(),
        }
    }

    /// Validates and assembles the immutable state the orchestrator serves from.
    pub fn snapshot(&self) -> Result<Snapshot, ConfigError> {
        self.validate()?;
        Ok(Snapshot {
            routes: self.route_table()?,
            policy: self.security_policy(),
            settings: self.forward_settings(),
        })
    }

    pub fn response_cache(&self) -> ResponseCache {
        if self.cache.enabled {
            ResponseCache::new(self.cache.max_entries)
        } else {
            ResponseCache::disabled()
        }
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_millis(self.cache.purge_interval_ms)
    }
}

/// Deserializes a string-to-string mapping into pairs, keeping document order.
fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of strings to strings")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((k, v)) = map.next_entry::<String, String>()? {
                pairs.push((k, v));
            }
            Ok(pairs)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_map(PairsVisitor)
}
