//! Target domain and browser origin policy
//!
//! [`SecurityPolicy::validate_target`] is a pure function of the policy and
//! the URL, so it is safe to call from any number of tasks at once.

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

/// Wildcard entry in the allowed browser origins list.
pub const ANY_ORIGIN: &str = "*";

/// Why a target URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("target url is missing")]
    Missing,
    #[error("target url could not be parsed: {0}")]
    Unparseable(String),
    #[error("scheme '{0}' is not allowed, only http and https")]
    UnsupportedScheme(String),
    #[error("target url has no host")]
    MissingHost,
    #[error("domain '{0}' is blocked")]
    Blocked(String),
    #[error("domain '{0}' is not in the allowed list")]
    NotAllowed(String),
}

/// Allowed browser origins and allowed/blocked target domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityPolicy {
    allowed_origins: HashSet<String>,
    allowed_domains: HashSet<String>,
    blocked_domains: HashSet<String>,
}

impl SecurityPolicy {
    pub fn new<O, A, B>(allowed_origins: O, allowed_domains: A, blocked_domains: B) -> Self
    where
        O: IntoIterator,
        O::Item: Into<String>,
        A: IntoIterator,
        A::Item: AsRef<str>,
        B: IntoIterator,
        B::Item: AsRef<str>,
    {
        Self {
            allowed_origins: allowed_origins.into_iter().map(Into::into).collect(),
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| normalize_domain(d.as_ref()))
                .filter(|d| !d.is_empty())
                .collect(),
            blocked_domains: blocked_domains
                .into_iter()
                .map(|d| normalize_domain(d.as_ref()))
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// A policy that allows any http(s) target and reflects any origin.
    pub fn permissive() -> Self {
        Self::new([ANY_ORIGIN], Vec::<String>::new(), Vec::<String>::new())
    }

    /// Decides whether `target` may be forwarded to.
    ///
    /// Blocked domains win over allowed ones. An empty allow-list allows every
    /// domain that is not blocked. Returns the parsed URL when allowed.
    pub fn validate_target(&self, target: &str) -> Result<Url, Rejection> {
        let target = target.trim();
        if target.is_empty() {
            return Err(Rejection::Missing);
        }

        let url = Url::parse(target).map_err(|e| Rejection::Unparseable(e.to_string()))?;
        self.validate_url(&url)?;
        Ok(url)
    }

    /// Same decision as [`validate_target`](Self::validate_target) for an already parsed URL.
    pub fn validate_url(&self, url: &Url) -> Result<(), Rejection> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Rejection::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .map(normalize_domain)
            .filter(|h| !h.is_empty())
            .ok_or(Rejection::MissingHost)?;

        if self
            .blocked_domains
            .iter()
            .any(|blocked| host_matches(&host, blocked))
        {
            return Err(Rejection::Blocked(host));
        }

        if !self.allowed_domains.is_empty()
            && !self
                .allowed_domains
                .iter()
                .any(|allowed| host_matches(&host, allowed))
        {
            return Err(Rejection::NotAllowed(host));
        }

        Ok(())
    }

    /// Whether a browser origin is on the allow-list (or the list holds `*`).
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.contains(ANY_ORIGIN) || self.allowed_origins.contains(origin)
    }

    pub fn allowed_origins(&self) -> &HashSet<String> {
        &self.allowed_origins
    }

    pub fn allowed_domains(&self) -> &HashSet<String> {
        &self.allowed_domains
    }

    pub fn blocked_domains(&self) -> &HashSet<String> {
        &self.blocked_domains
    }
}

fn normalize_domain(domain: &str) -> String {
    domain
        .trim()
        .trim_start_matches("*.")
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Exact match or subdomain on a dot boundary: `a.b.com` matches `b.com`, `ab.com` does not.
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}
