//! Named forwarding routes
//!
//! A route is built once from configuration and never mutated afterwards;
//! reloading configuration replaces the whole [`RouteTable`].

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::config::{ConfigError, RouteConfig};
use crate::http::headers::HeaderMap;

/// Credentials injected into requests forwarded through a route.
///
/// Deserialised from a `type`-tagged mapping:
///
/// ```yaml
/// auth:
///   type: basic
///   username: svc
///   password: hunter2
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSpec {
    Bearer { token: String },
    Basic { username: String, password: String },
    ApiKey { header_name: String, header_value: String },
}

impl AuthSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthSpec::Bearer { .. } => "bearer",
            AuthSpec::Basic { .. } => "basic",
            AuthSpec::ApiKey { .. } => "api_key",
        }
    }
}

// Credentials never reach logs through `{:?}`.
impl std::fmt::Debug for AuthSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthSpec::Bearer { .. } => f.write_str("Bearer { token: <redacted> }"),
            AuthSpec::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthSpec::ApiKey { header_name, .. } => f
                .debug_struct("ApiKey")
                .field("header_name", header_name)
                .field("header_value", &"<redacted>")
                .finish(),
        }
    }
}

/// A single path rewrite: the first match of `pattern` is replaced by `replacement`.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub pattern: Regex,
    pub replacement: String,
}

impl RewriteRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    pub fn apply(&self, path: &str) -> String {
        self.pattern
            .replace(path, self.replacement.as_str())
            .into_owned()
    }
}

/// A named, preconfigured forwarding target.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub target_base_url: Url,
    pub rewrites: Vec<RewriteRule>,
    pub static_headers: HeaderMap,
    pub auth: Option<AuthSpec>,
}

impl Route {
    /// Compiles a route from its configuration entry.
    pub fn from_config(config: &RouteConfig) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRoute {
            route: config.name.clone(),
            reason,
        };

        if config.name.trim().is_empty() {
            return Err(invalid("route name must not be empty".to_string()));
        }

        let target_base_url = Url::parse(&config.target_base_url)
            .map_err(|e| invalid(format!("target_base_url: {e}")))?;
        if !matches!(target_base_url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "target_base_url scheme must be http or https, got '{}'",
                target_base_url.scheme()
            )));
        }
        if target_base_url.host_str().is_none() {
            return Err(invalid("target_base_url has no host".to_string()));
        }

        let rewrites = config
            .path_rewrite
            .iter()
            .map(|(pattern, replacement)| {
                RewriteRule::new(pattern, replacement.as_str())
                    .map_err(|e| invalid(format!("path_rewrite '{pattern}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            target_base_url,
            rewrites,
            static_headers: config.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
            auth: config.auth.clone(),
        })
    }

    /// Applies every rewrite rule in declared order.
    ///
    /// Each rule sees the output of the previous one.
    pub fn rewrite_path(&self, path: &str) -> String {
        self.rewrites
            .iter()
            .fold(path.to_string(), |current, rule| rule.apply(&current))
    }

    pub fn host(&self) -> &str {
        self.target_base_url.host_str().unwrap_or_default()
    }
}

/// Immutable lookup table of routes by name.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, Arc<Route>>,
}

impl RouteTable {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|r| (r.name.clone(), Arc::new(r)))
                .collect(),
        }
    }

    /// Builds the table from configuration, rejecting duplicate names.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, ConfigError> {
        let mut routes = HashMap::with_capacity(configs.len());
        for config in configs {
            let route = Route::from_config(config)?;
            if routes.contains_key(&route.name) {
                return Err(ConfigError::InvalidRoute {
                    route: route.name,
                    reason: "duplicate route name".to_string(),
                });
            }
            routes.insert(route.name.clone(), Arc::new(route));
        }
        Ok(Self { routes })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Route>> {
        self.routes.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
