//! Forwarding engine
//!
//! This module implements the policy-enforcing forwarding core: target
//! resolution and domain policy, outbound request construction, the retry
//! state machine, the response cache and CORS annotation.

pub mod builder;
pub mod cache;
pub mod cors;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod policy;
pub mod retry;
pub mod route;
pub mod transport;

pub use builder::{OutboundRequest, ProxyRequest, ResolvedTarget};
pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use error::ProxyError;
pub use orchestrator::{ForwardSettings, ProxyOrchestrator, Snapshot};
pub use policy::{Rejection, SecurityPolicy};
pub use retry::{Backoff, RetryingForwarder};
pub use route::{AuthSpec, Route, RouteTable};
pub use transport::{HttpTransport, Transport, TransportError};
