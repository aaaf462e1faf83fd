//! In-memory response cache
//!
//! Entries expire lazily on lookup (and in bulk via [`ResponseCache::purge_expired`]).
//! When the cache is full, the entry with the smallest
//! `stored_at + hit_count * HIT_WEIGHT` is evicted: old entries go first,
//! but every hit buys an entry [`HIT_WEIGHT`] of extra life.
//!
//! The map sits behind a single mutex. It is only held for the duration of
//! one cache operation, never across an upstream call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::http::request::Method;
use crate::http::response::Response;

/// Recency credit granted per cache hit when choosing an eviction victim.
pub const HIT_WEIGHT: Duration = Duration::from_millis(1000);

/// Scope used in cache keys for ad-hoc (route-less) requests.
pub const DIRECT_SCOPE: &str = "direct";

/// Deterministic cache key: `scope:METHOD:path:k1=v1&k2=v2`.
///
/// Query parameters are sorted by name (then value), so parameter order in
/// the original request does not matter. Names and values are
/// form-urlencoded, so a decoded `&`, `=` or `:` cannot fake a separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(route: Option<&str>, method: Method, path: &str, query: &[(String, String)]) -> Self {
        let mut params: Vec<&(String, String)> = query.iter().collect();
        params.sort();

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        CacheKey(format!(
            "{}:{}:{}:{}",
            route.unwrap_or(DIRECT_SCOPE),
            method.as_str(),
            path,
            query
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn form_encode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Response,
    stored_at: Instant,
    ttl: Duration,
    hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }

    /// Recency score relative to `epoch`; the lowest score is evicted first.
    fn eviction_score(&self, epoch: Instant) -> Duration {
        let credit = HIT_WEIGHT.saturating_mul(u32::try_from(self.hit_count).unwrap_or(u32::MAX));
        self.stored_at
            .saturating_duration_since(epoch)
            .saturating_add(credit)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Cache counters. Monotonic until [`ResponseCache::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub hit_rate: f64,
}

/// Shared, cloneable handle to the response cache.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    state: Arc<Mutex<CacheState>>,
    epoch: Instant,
    max_entries: usize,
    enabled: bool,
}

impl ResponseCache {
    /// Create a cache holding at most `max_entries` responses.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            epoch: Instant::now(),
            max_entries: max_entries.max(1),
            enabled: true,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Looks up a fresh entry, counting a hit or a miss.
    ///
    /// An expired entry is removed and counts as a miss.
    pub async fn lookup(&self, key: &CacheKey) -> Option<Response> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Instant::now();

        let expired = match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.hit_count += 1;
                let payload = entry.payload.clone();
                state.hits += 1;
                return Some(payload);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            tracing::trace!(key = %key, "Cache entry expired");
        }
        state.misses += 1;
        None
    }

    /// Stores a response under `key`.
    ///
    /// Returns `false` without storing when the cache is disabled or `ttl` is zero.
    /// Writing an existing key replaces the entry and resets its hit count.
    pub async fn store(&self, key: CacheKey, payload: Response, ttl: Duration) -> bool {
        if !self.enabled || ttl.is_zero() {
            return false;
        }

        let mut state = self.state.lock().await;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            if let Some(victim) = Self::eviction_victim(&state.entries, self.epoch) {
                state.entries.remove(&victim);
                tracing::debug!(key = %victim, "Evicted cache entry");
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                payload,
                stored_at: Instant::now(),
                ttl,
                hit_count: 0,
            },
        );
        true
    }

    fn eviction_victim(entries: &HashMap<CacheKey, CacheEntry>, epoch: Instant) -> Option<CacheKey> {
        entries
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                a.eviction_score(epoch)
                    .cmp(&b.eviction_score(epoch))
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(k, _)| k.clone())
    }

    /// Removes every key matching `pattern`.
    ///
    /// `pattern` is a regular expression; if it does not compile it is used as
    /// a literal key prefix instead. Returns the number of entries removed.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let matcher: Box<dyn Fn(&str) -> bool + Send> = match Regex::new(pattern) {
            Ok(re) => Box::new(move |key| re.is_match(key)),
            Err(_) => {
                let prefix = pattern.to_string();
                Box::new(move |key| key.starts_with(&prefix))
            }
        };

        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|key, _| !matcher(key.as_str()));
        let removed = before - state.entries.len();

        tracing::debug!(pattern, removed, "Invalidated cache entries");
        removed
    }

    /// Removes every entry cached for `route`.
    pub async fn invalidate_route(&self, route: &str) -> usize {
        self.invalidate(&format!("^{}:", regex::escape(route))).await
    }

    /// Removes all expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        before - state.entries.len()
    }

    /// Drops all entries and resets the counters.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        *state = CacheState::default();
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let total = state.hits + state.misses;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                state.hits as f64 / total as f64
            },
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }

    /// Hits recorded against the current entry for `key`, without counting a lookup.
    pub async fn hit_count(&self, key: &CacheKey) -> Option<u64> {
        self.state
            .lock()
            .await
            .entries
            .get(key)
            .map(|entry| entry.hit_count)
    }
}

/// Purges expired entries every `every` until the returned handle is aborted.
pub fn spawn_purge_task(cache: ResponseCache, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Purged expired cache entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> CacheKey {
        CacheKey::new(Some("api"), Method::GET, path, &[])
    }

    #[test]
    fn key_layout() {
        let query = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ];
        let key = CacheKey::new(Some("api"), Method::GET, "/p", &query);
        assert_eq!(key.as_str(), "api:GET:/p:a=1&b=2");

        let direct = CacheKey::new(None, Method::GET, "https://x.example.com/p", &[]);
        assert_eq!(direct.as_str(), "direct:GET:https://x.example.com/p:");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_is_never_stored() {
        let cache = ResponseCache::new(4);
        assert!(!cache.store(key("/a"), Response::ok("a"), Duration::ZERO).await);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_cache_never_stores() {
        let cache = ResponseCache::disabled();
        assert!(!cache.store(key("/a"), Response::ok("a"), Duration::from_secs(60)).await);
        assert!(cache.lookup(&key("/a")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_resets_hit_count() {
        let cache = ResponseCache::new(2);
        let ttl = Duration::from_secs(600);

        cache.store(key("/a"), Response::ok("a"), ttl).await;
        for _ in 0..5 {
            cache.lookup(&key("/a")).await;
        }
        assert_eq!(cache.hit_count(&key("/a")).await, Some(5));

        cache.store(key("/a"), Response::ok("a2"), ttl).await;
        assert_eq!(cache.hit_count(&key("/a")).await, Some(0));
        assert_eq!(cache.lookup(&key("/a")).await.unwrap().body, "a2");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lookup_counts_as_miss_and_removes() {
        let cache = ResponseCache::new(2);
        cache.store(key("/a"), Response::ok("a"), Duration::from_millis(100)).await;

        tokio::time::advance(Duration::from_millis(101)).await;

        assert!(cache.lookup(&key("/a")).await.is_none());
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.size), (0, 1, 0));
    }
}
