//! Resilient HTTP client for the TikTok platform APIs
//!
//! Every call carries a fresh bearer token from a [`TokenSource`] and is
//! classified after each attempt:
//!
//! - 2xx: success, unless the JSON `code` is a configured quota signal
//! - 401: one forced token refresh and a single re-send; a second 401
//!   invalidates the profile's stored credentials
//! - 429: rate limited, honouring `Retry-After`
//! - 5xx and network failures: transient, retried with backoff
//! - any other status: permanent, surfaced immediately
//!
//! Non-idempotent requests are only re-sent when the connection was never
//! established. The single re-send after a 401 does not count against the
//! retry budget, although [`ApiResponse::attempts`] includes it.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use ttk_sdk::{ApiRequest, ClientBuilder, TokenSource};
//! use std::sync::Arc;
//!
//! # async fn example(tokens: Arc<dyn TokenSource>) -> ttk_sdk::Result<()> {
//! let client = ClientBuilder::default()
//!     .base_url("https://business-api.tiktok.com/open_api/v1.3")
//!     .token_source(tokens)
//!     .build()?;
//!
//! let response = client
//!     .call(ApiRequest::get("/advertiser/info/?advertiser_ids=[\"123\"]"))
//!     .await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

use crate::{
    auth::{CredentialSet, TokenSource},
    error::{ApiError, Result},
    retry::{FailureKind, RetryPolicy, RetryState},
    types::{ApiRequest, ApiResponse},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use ttk_common::auth_constants::{DEFAULT_API_BASE_URL, DEFAULT_PROFILE, DEFAULT_QUOTA_CODES};
use ttk_common::config::ClientSettings;
use ttk_common::ProfileName;
use url::Url;

/// Default timeout in seconds for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Outcome of one attempt that did not complete the call
struct AttemptFailure {
    kind: FailureKind,
    retry_after: Option<Duration>,
    cause: String,
}

enum Attempt {
    Done(ApiResponse),
    Unauthorized(String),
    /// Client errors other than 401/429 are never retried
    Permanent { status: u16, body: String },
    Failed(AttemptFailure),
}

/// HTTP client that retries, backs off and refreshes credentials
pub struct ResilientClient {
    http_client: reqwest::Client,
    base_url: String,
    profile: ProfileName,
    tokens: Arc<dyn TokenSource>,
    retry: RetryPolicy,
    quota_codes: Vec<i64>,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("base_url", &self.base_url)
            .field("profile", &self.profile)
            .field("retry", &self.retry)
            .field("quota_codes", &self.quota_codes)
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn profile(&self) -> &ProfileName {
        &self.profile
    }

    /// Convenience form of [`ResilientClient::call`]
    pub async fn call_raw(
        &self,
        method: Method,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
    ) -> Result<ApiResponse> {
        self.call(ApiRequest {
            method,
            url: url.to_string(),
            headers,
            body,
            idempotency: None,
        })
        .await
    }

    /// Send `request`, retrying and refreshing credentials as needed
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.resolve_url(&request.url)?;
        let mut headers = header_map(&request.headers)?;
        if headers.remove(AUTHORIZATION).is_some() {
            debug!("Dropping caller-supplied Authorization header");
        }
        let idempotency = request.effective_idempotency();

        let mut state = RetryState::new();
        let mut sends = 0u32;
        let mut refreshed: Option<CredentialSet> = None;
        let mut auth_retried = false;

        loop {
            // The re-send after a forced refresh does not use up the retry budget
            let credentials = match refreshed.take() {
                Some(credentials) => credentials,
                None => {
                    state.attempt += 1;
                    self.tokens.access_token(&self.profile).await?
                }
            };

            sends += 1;
            debug!(
                method = %request.method,
                url = %url,
                attempt = state.attempt,
                sends,
                "Sending API request"
            );

            let failure = match self
                .attempt(&request, &url, &headers, &credentials)
                .await
            {
                Attempt::Done(mut response) => {
                    response.attempts = sends;
                    return Ok(response);
                }
                Attempt::Unauthorized(message) if auth_retried => {
                    warn!(
                        "Request rejected after token refresh, invalidating profile '{}'",
                        self.profile
                    );
                    self.tokens.invalidate(&self.profile).await?;
                    return Err(ApiError::Unauthorized { message });
                }
                Attempt::Unauthorized(_) => {
                    debug!("Received 401, forcing token refresh");
                    auth_retried = true;
                    refreshed = Some(
                        self.tokens
                            .force_refresh(&self.profile, &credentials.access_token)
                            .await?,
                    );
                    continue;
                }
                Attempt::Permanent { status, body } => {
                    return Err(ApiError::Permanent { status, body })
                }
                Attempt::Failed(failure) => failure,
            };

            match self
                .retry
                .next_delay(&state, idempotency, failure.kind, failure.retry_after)
            {
                Some(delay) => {
                    state.record(failure.kind, delay);
                    warn!(
                        attempt = state.attempt,
                        kind = %failure.kind,
                        delay_ms = delay.as_millis() as u64,
                        cause = %failure.cause,
                        "API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(exhausted(failure, sends)),
            }
        }
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &Url,
        headers: &HeaderMap,
        credentials: &CredentialSet,
    ) -> Attempt {
        let mut builder = self
            .http_client
            .request(request.method.clone(), url.clone())
            .headers(headers.clone())
            .header(AUTHORIZATION, credentials.authorization_header());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Failed(AttemptFailure {
                    kind: FailureKind::from_reqwest(&e),
                    retry_after: None,
                    cause: e.to_string(),
                })
            }
        };

        let status = response.status();
        let response_headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                return Attempt::Failed(AttemptFailure {
                    kind: FailureKind::Network,
                    retry_after: None,
                    cause: format!("failed to read response body: {}", e),
                })
            }
        };

        self.classify(status, response_headers, body)
    }

    fn classify(&self, status: StatusCode, headers: HeaderMap, body: Bytes) -> Attempt {
        if status.is_success() {
            if let Some(code) = self.quota_code(&body) {
                return Attempt::Failed(AttemptFailure {
                    kind: FailureKind::RateLimited,
                    retry_after: None,
                    cause: format!("provider quota code {}", code),
                });
            }
            return Attempt::Done(ApiResponse {
                status,
                headers,
                body,
                attempts: 0,
            });
        }

        let text = String::from_utf8_lossy(&body).into_owned();
        match status {
            StatusCode::UNAUTHORIZED => Attempt::Unauthorized(if text.is_empty() {
                "Authentication failed".into()
            } else {
                text
            }),
            StatusCode::TOO_MANY_REQUESTS => Attempt::Failed(AttemptFailure {
                kind: FailureKind::RateLimited,
                retry_after: parse_retry_after(&headers, Utc::now()),
                cause: "server returned 429".into(),
            }),
            s if s.is_server_error() => Attempt::Failed(AttemptFailure {
                kind: FailureKind::ServerError,
                retry_after: None,
                cause: format!("server returned {}", s),
            }),
            s => Attempt::Permanent {
                status: s.as_u16(),
                body: text,
            },
        }
    }

    fn quota_code(&self, body: &[u8]) -> Option<i64> {
        if self.quota_codes.is_empty() {
            return None;
        }
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        let code = value.get("code")?.as_i64()?;
        self.quota_codes.contains(&code).then_some(code)
    }

    fn resolve_url(&self, url: &str) -> Result<Url> {
        let full = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        };
        Url::parse(&full).map_err(|e| ApiError::InvalidRequest {
            message: format!("Invalid URL '{}': {}", full, e),
        })
    }
}

fn exhausted(failure: AttemptFailure, attempts: u32) -> ApiError {
    match failure.kind {
        FailureKind::RateLimited => ApiError::RateLimited {
            retry_after: failure.retry_after,
            attempts,
        },
        _ => ApiError::Transient {
            attempts,
            cause: failure.cause,
        },
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ApiError::InvalidRequest {
                message: format!("Invalid header name '{}': {}", name, e),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| ApiError::InvalidRequest {
            message: format!("Invalid value for header '{}': {}", name, e),
        })?;
        map.append(name, value);
    }
    Ok(map)
}

/// `Retry-After` as delta-seconds or an HTTP-date relative to `now`
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

/// Builder for constructing a ResilientClient with custom configuration
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    profile: Option<ProfileName>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    quota_codes: Option<Vec<i64>>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl ClientBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded from the `client` configuration section
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::default()
            .base_url(settings.base_url.clone())
            .timeout(settings.request_timeout())
            .retry_policy(RetryPolicy::from(settings))
            .quota_codes(settings.quota_codes.clone())
    }

    /// Set the base URL for the API
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Profile whose credentials sign each request
    pub fn profile(mut self, profile: ProfileName) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// JSON `code` values that signal quota exhaustion on a 2xx response
    pub fn quota_codes(mut self, codes: Vec<i64>) -> Self {
        self.quota_codes = Some(codes);
        self
    }

    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(tokens);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ResilientClient> {
        let tokens = self.token_source.ok_or_else(|| ApiError::InvalidRequest {
            message: "A token source is required to build the client".into(),
        })?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        Url::parse(&base_url).map_err(|e| ApiError::InvalidRequest {
            message: format!("Invalid base URL '{}': {}", base_url, e),
        })?;

        let profile = match self.profile {
            Some(profile) => profile,
            None => ProfileName::new(DEFAULT_PROFILE).map_err(|e| ApiError::InvalidRequest {
                message: e.to_string(),
            })?,
        };

        let mut http = reqwest::Client::builder().timeout(
            self.timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        );
        if let Some(connect_timeout) = self.connect_timeout {
            http = http.connect_timeout(connect_timeout);
        }
        let http_client = http.build().map_err(ApiError::HttpClient)?;

        Ok(ResilientClient {
            http_client,
            base_url,
            profile,
            tokens,
            retry: self.retry_policy.unwrap_or_default(),
            quota_codes: self
                .quota_codes
                .unwrap_or_else(|| DEFAULT_QUOTA_CODES.to_vec()),
        })
    }
}
