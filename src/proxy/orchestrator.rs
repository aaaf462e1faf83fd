//! The public `forward` contract
//!
//! Resolve target → domain policy → cache lookup → build outbound request →
//! retrying forward → cache store → CORS annotation.
//!
//! Routes, policy and settings live in one immutable [`Snapshot`] behind an
//! [`ArcSwap`]. Each request loads the snapshot once, so a concurrent
//! [`ProxyOrchestrator::update_config`] never changes what an in-flight
//! request sees.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::{ConfigError, GatewayConfig};
use crate::http::response::Response;
use crate::proxy::builder::{self, ProxyRequest, ResolvedTarget};
use crate::proxy::cache::{CacheKey, CacheStats, ResponseCache};
use crate::proxy::cors;
use crate::proxy::error::ProxyError;
use crate::proxy::policy::SecurityPolicy;
use crate::proxy::retry::RetryingForwarder;
use crate::proxy::route::RouteTable;
use crate::proxy::transport::Transport;

/// Header reporting whether a response came from the cache.
pub const CACHE_STATUS_HEADER: &str = "X-Cache";

/// Timeouts, retry bound and cache TTLs.
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub max_retries: u32,
    pub cache_enabled: bool,
    pub default_ttl: Duration,
    pub route_ttls: HashMap<String, Duration>,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        GatewayConfig::default().forward_settings()
    }
}

impl ForwardSettings {
    /// TTL for responses of `route`; zero means "do not cache".
    pub fn ttl_for(&self, route: Option<&str>) -> Duration {
        if !self.cache_enabled {
            return Duration::ZERO;
        }
        route
            .and_then(|name| self.route_ttls.get(name))
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// Everything a request reads from configuration, swapped as a unit.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub routes: RouteTable,
    pub policy: SecurityPolicy,
    pub settings: ForwardSettings,
}

pub struct ProxyOrchestrator<T> {
    snapshot: ArcSwap<Snapshot>,
    cache: ResponseCache,
    forwarder: RetryingForwarder<T>,
}

impl<T: Transport> ProxyOrchestrator<T> {
    pub fn new(snapshot: Snapshot, cache: ResponseCache, forwarder: RetryingForwarder<T>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            cache,
            forwarder,
        }
    }

    /// Builds an orchestrator from validated configuration.
    pub fn from_config(config: &GatewayConfig, transport: T) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.snapshot()?,
            config.response_cache(),
            RetryingForwarder::new(transport),
        ))
    }

    /// Forwards `request`, returning the CORS-annotated upstream response.
    ///
    /// Upstream 4xx responses (and any other non-retried status) come back as
    /// `Ok`, relayed verbatim apart from header filtering.
    pub async fn forward(&self, request: &ProxyRequest) -> Result<Response, ProxyError> {
        let snapshot = self.snapshot.load_full();

        let target = builder::resolve_target(request, &snapshot.routes)?;
        snapshot.policy.validate_url(target.policy_url())?;

        let cacheable = request.method.is_cacheable();
        let key = CacheKey::new(
            target.route_name(),
            request.method,
            &cache_path(request, &target),
            &request.query,
        );

        if cacheable {
            if let Some(hit) = self.cache.lookup(&key).await {
                tracing::debug!(key = %key, "Cache hit");
                let mut response = cors::annotate(hit, request.origin(), &snapshot.policy);
                response.headers.insert(CACHE_STATUS_HEADER, "HIT");
                return Ok(response);
            }
        }

        let outbound = builder::build_outbound(request, &target)?;

        tracing::debug!(
            route = target.route_name().unwrap_or("-"),
            method = %request.method,
            host = %target.host(),
            path = %outbound.url.path(),
            "Forwarding request"
        );

        let response = self
            .forwarder
            .forward(&outbound, snapshot.settings.timeout, snapshot.settings.max_retries)
            .await?;

        tracing::info!(
            route = target.route_name().unwrap_or("-"),
            method = %request.method,
            host = %target.host(),
            status = response.status.as_u16(),
            "Upstream responded"
        );

        if cacheable && response.status.is_success() {
            let ttl = snapshot.settings.ttl_for(target.route_name());
            if self.cache.store(key.clone(), response.clone(), ttl).await {
                tracing::trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "Stored response");
            }
        }

        let mut response = cors::annotate(response, request.origin(), &snapshot.policy);
        response.headers.insert(CACHE_STATUS_HEADER, "MISS");
        Ok(response)
    }

    /// Like [`forward`](Self::forward), but renders errors as annotated JSON responses.
    pub async fn respond(&self, request: &ProxyRequest) -> Response {
        match self.forward(request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    code = error.code(),
                    status = error.status().as_u16(),
                    error = %error,
                    "Proxy request failed"
                );
                self.annotate(error.to_response(), request.origin())
            }
        }
    }

    /// Attaches CORS headers under the current policy.
    pub fn annotate(&self, response: Response, origin: Option<&str>) -> Response {
        cors::annotate(response, origin, &self.snapshot.load().policy)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        tracing::info!("Cache cleared");
    }

    pub async fn invalidate_route(&self, route: &str) -> usize {
        let removed = self.cache.invalidate_route(route).await;
        tracing::info!(route, removed, "Invalidated cache for route");
        removed
    }

    /// Atomically replaces the route table and security policy, keeping settings.
    pub fn update_config(&self, routes: RouteTable, policy: SecurityPolicy) {
        let settings = self.snapshot.load().settings.clone();
        self.snapshot.store(Arc::new(Snapshot {
            routes,
            policy,
            settings,
        }));
        tracing::info!("Routes and security policy updated");
    }

    /// Atomically replaces everything derived from `config`.
    ///
    /// Cache capacity is fixed at construction and not affected.
    pub fn reload(&self, config: &GatewayConfig) -> Result<(), ConfigError> {
        let snapshot = config.snapshot()?;
        let routes = snapshot.routes.len();
        self.snapshot.store(Arc::new(snapshot));
        tracing::info!(routes, "Configuration reloaded");
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        self.forwarder.transport()
    }
}

/// Path component of the cache key: the sub-path for routes, the target URL
/// (without fragment) for ad-hoc requests.
fn cache_path(request: &ProxyRequest, target: &ResolvedTarget) -> String {
    match target {
        ResolvedTarget::Route(_) => request.path.clone(),
        ResolvedTarget::Direct(url) => {
            let mut url = url.clone();
            url.set_fragment(None);
            url.to_string()
        }
    }
}
