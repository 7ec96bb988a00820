//! Retry and backoff policy shared by the token endpoint calls and the
//! resilient API client.
//!
//! A failed attempt is described by a [`FailureKind`]; [`RetryPolicy::next_delay`]
//! decides from the kind, the request's [`Idempotency`] and the attempts so far
//! whether another attempt is allowed and how long to wait before it.

use rand::Rng;
use reqwest::Method;
use std::fmt;
use std::time::Duration;
use ttk_common::config::ClientSettings;

/// Whether repeating a request can duplicate a side effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

impl Idempotency {
    pub fn for_method(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE => {
                Idempotency::Idempotent
            }
            _ => Idempotency::NonIdempotent,
        }
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection could not be established; nothing reached the server
    Connect,
    /// Request timed out, the server may have processed it
    Timeout,
    /// Connection broke mid-exchange
    Network,
    /// HTTP 5xx
    ServerError,
    /// HTTP 429 or a provider quota signal
    RateLimited,
}

impl FailureKind {
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_connect() {
            FailureKind::Connect
        } else if error.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Network
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connect => "connect",
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::ServerError => "server_error",
            FailureKind::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call retry bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts sent so far
    pub attempt: u32,
    pub last_error_kind: Option<FailureKind>,
    pub next_delay: Option<Duration>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: FailureKind, delay: Duration) {
        self.last_error_kind = Some(kind);
        self.next_delay = Some(delay);
    }
}

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform random addition to each delay
    pub jitter: Duration,
    /// Cap on server-provided `Retry-After` values
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ClientSettings::default())
    }
}

impl From<&ClientSettings> for RetryPolicy {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay(),
            jitter: settings.jitter(),
            max_retry_after: settings.max_retry_after(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `min(base_delay * 2^retry + U[0, jitter], max_delay)`, `retry` counting from 0
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry.min(31)));

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };

        exponential.saturating_add(jitter).min(self.max_delay)
    }

    /// Delay before the next attempt, or `None` if the failure must surface.
    ///
    /// Non-idempotent requests are only retried when the connection was never
    /// established. A server-provided `retry_after` replaces the backoff for
    /// rate limiting, capped at `max_retry_after`.
    pub fn next_delay(
        &self,
        state: &RetryState,
        idempotency: Idempotency,
        failure: FailureKind,
        retry_after: Option<Duration>,
    ) -> Option<Duration> {
        if state.attempt >= self.max_attempts {
            return None;
        }

        if idempotency == Idempotency::NonIdempotent && failure != FailureKind::Connect {
            return None;
        }

        let retry = state.attempt.saturating_sub(1);
        match (failure, retry_after) {
            (FailureKind::RateLimited, Some(hint)) => Some(hint.min(self.max_retry_after)),
            _ => Some(self.backoff_delay(retry)),
        }
    }
}
