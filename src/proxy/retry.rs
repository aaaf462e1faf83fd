//! Bounded retries with exponential backoff
//!
//! Each `forward` call runs a small state machine:
//!
//! ```text
//!   Attempt(n) ──response (not 5xx/429)──▶ Done(response)
//!       │
//!       │ transport failure, 5xx or 429
//!       ▼
//!   n <= max_retries ? ──yes──▶ Wait(backoff(n)) ──▶ Attempt(n + 1)
//!       │
//!       no
//!       ▼
//!   Failed(error classified from the last failure)
//! ```
//!
//! Attempts are numbered from 1, so at most `max_retries + 1` requests are
//! sent. The timeout applies to each attempt separately.

use std::time::Duration;

use rand::Rng;

use crate::http::response::{Response, StatusCode};
use crate::proxy::builder::OutboundRequest;
use crate::proxy::error::ProxyError;
use crate::proxy::transport::{Transport, TransportError};

/// Delay before the second attempt; doubles on every further attempt.
pub const BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on the random jitter added to each backoff delay.
pub const MAX_JITTER: Duration = Duration::from_millis(250);

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: BASE_DELAY,
            max_jitter: MAX_JITTER,
        }
    }
}

impl Backoff {
    /// `base_delay * 2^(attempt - 1)`, without jitter. The shift saturates at 31.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// [`delay`](Self::delay) plus a random jitter in `[0, max_jitter]`.
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let max_jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if max_jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms))
        };
        self.delay(attempt).saturating_add(jitter)
    }
}

/// Whether an upstream status should be retried rather than relayed.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Most recent retryable failure, used to classify exhaustion.
#[derive(Debug, Clone)]
enum Failure {
    Transport(TransportError),
    Status(StatusCode),
}

/// Transient per-call state: the attempt being made and what went wrong last.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempt: u32,
    last_failure: Option<Failure>,
}

enum Step {
    Attempt(u32),
    Wait { next: u32, delay: Duration },
    Done(Response),
    Failed(ProxyError),
}

/// Sends outbound requests through a [`Transport`], retrying transient failures.
#[derive(Debug, Clone)]
pub struct RetryingForwarder<T> {
    transport: T,
    backoff: Backoff,
}

impl<T: Transport> RetryingForwarder<T> {
    pub fn new(transport: T) -> Self {
        Self::with_backoff(transport, Backoff::default())
    }

    pub fn with_backoff(transport: T, backoff: Backoff) -> Self {
        Self { transport, backoff }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Forwards `request`, retrying up to `max_retries` times.
    ///
    /// Any response that is not 5xx or 429 is returned as-is, including 4xx.
    pub async fn forward(
        &self,
        request: &OutboundRequest,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Response, ProxyError> {
        let host = request.url.host_str().unwrap_or_default().to_string();
        let mut state = RetryState {
            attempt: 0,
            last_failure: None,
        };
        let mut step = Step::Attempt(1);

        loop {
            step = match step {
                Step::Attempt(n) => {
                    state.attempt = n;
                    match self.transport.send(request, timeout).await {
                        Ok(response) if is_retryable_status(response.status) => {
                            tracing::debug!(
                                host = %host,
                                status = response.status.as_u16(),
                                attempt = n,
                                max_retries,
                                "Upstream returned retryable status"
                            );
                            state.last_failure = Some(Failure::Status(response.status));
                            self.next_step(&state, max_retries, &host)
                        }
                        Ok(response) => Step::Done(response),
                        Err(e) if !e.is_retryable() => {
                            Step::Failed(ProxyError::Proxy(format!("request to {host} rejected: {e}")))
                        }
                        Err(e) => {
                            tracing::debug!(
                                host = %host,
                                error = %e,
                                attempt = n,
                                max_retries,
                                "Upstream request failed"
                            );
                            state.last_failure = Some(Failure::Transport(e));
                            self.next_step(&state, max_retries, &host)
                        }
                    }
                }
                Step::Wait { next, delay } => {
                    tokio::time::sleep(delay).await;
                    Step::Attempt(next)
                }
                Step::Done(response) => {
                    if state.attempt > 1 {
                        tracing::info!(
                            host = %host,
                            status = response.status.as_u16(),
                            attempt = state.attempt,
                            "Upstream succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Step::Failed(error) => {
                    tracing::warn!(host = %host, attempts = state.attempt, error = %error, "Giving up on upstream");
                    return Err(error);
                }
            };
        }
    }

    fn next_step(&self, state: &RetryState, max_retries: u32, host: &str) -> Step {
        let n = state.attempt;
        if n <= max_retries {
            let delay = self.backoff.delay_with_jitter(n);
            tracing::debug!(host, attempt = n, delay_ms = delay.as_millis() as u64, "Backing off before retry");
            return Step::Wait { next: n + 1, delay };
        }

        let error = match &state.last_failure {
            Some(Failure::Transport(TransportError::Timeout(after))) => ProxyError::Timeout {
                host: host.to_string(),
                attempts: n,
                cause: format!("no response within {after:?}"),
            },
            Some(Failure::Transport(e)) => ProxyError::Connection {
                host: host.to_string(),
                attempts: n,
                cause: e.to_string(),
            },
            Some(Failure::Status(status)) => ProxyError::UpstreamExhausted {
                host: host.to_string(),
                attempts: n,
                status: status.as_u16(),
            },
            None => ProxyError::Proxy(format!("request to {host} failed without a recorded cause")),
        };
        Step::Failed(error)
    }
}
