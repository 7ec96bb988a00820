//! Authentication-related types and data structures
//!
//! This module defines the types shared by the auth components: flow
//! configuration, the persisted credential set, token endpoint payloads and
//! the auth error taxonomy.

use super::vault::VaultError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use ttk_common::config::OAuthSettings;

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth authorization endpoint URL
    pub authorize_url: String,
    /// OAuth token endpoint URL
    pub token_url: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
    /// Host placed in the redirect URI
    pub callback_host: String,
    /// Callback port, `0` for an ephemeral port
    pub callback_port: u16,
    /// Path of the callback endpoint
    pub callback_path: String,
    /// How long a login attempt waits for the browser redirect
    pub login_timeout: Duration,
    /// Refresh when the access token expires within this window
    pub refresh_margin: Duration,
    /// Tolerated clock difference when judging hard expiry
    pub clock_skew: Duration,
    /// Lifetime assumed when the token endpoint omits `expires_in`
    pub default_lifetime: Duration,
}

impl From<&OAuthSettings> for AuthConfig {
    fn from(settings: &OAuthSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            authorize_url: settings.authorize_url.clone(),
            token_url: settings.token_url.clone(),
            scopes: settings.scopes.clone(),
            callback_host: settings.callback_host.clone(),
            callback_port: settings.callback_port,
            callback_path: settings.callback_path.clone(),
            login_timeout: settings.login_timeout(),
            refresh_margin: settings.refresh_margin(),
            clock_skew: settings.clock_skew(),
            default_lifetime: settings.default_lifetime(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::from(&OAuthSettings::default())
    }
}

/// Credentials obtained from the token endpoint
///
/// `expires_at` is computed at write time from the issuance instant and the
/// server-reported lifetime.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: BTreeSet<String>,
    pub token_type: String,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl CredentialSet {
    /// Build a credential set from a token endpoint response.
    ///
    /// `previous_refresh_token` is kept when the response does not rotate it,
    /// and `fallback_scope` is used when the response omits `scope`.
    pub fn from_token_response(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
        default_lifetime: Duration,
        previous_refresh_token: Option<&str>,
        fallback_scope: &BTreeSet<String>,
    ) -> Self {
        let lifetime = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(default_lifetime)
            .min(MAX_TOKEN_LIFETIME);

        let scope = response
            .scope
            .as_deref()
            .map(parse_scope)
            .filter(|scope| !scope.is_empty())
            .unwrap_or_else(|| fallback_scope.clone());

        let refresh_token = response
            .refresh_token
            .filter(|token| !token.is_empty())
            .or_else(|| previous_refresh_token.map(str::to_string));

        Self {
            access_token: response.access_token,
            refresh_token,
            expires_at: issued_at
                .checked_add_signed(to_chrono(lifetime))
                .unwrap_or(issued_at)
                .trunc_subsecs(0),
            scope,
            token_type: response
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Bearer".to_string()),
        }
    }

    /// Check if the token expires within `margin` of `now`
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        match now.checked_add_signed(to_chrono(margin)) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }

    /// Check if the token is past expiry, treating `skew` as already elapsed
    pub fn is_expired(&self, skew: Duration, now: DateTime<Utc>) -> bool {
        self.expires_within(skew, now)
    }

    /// Get time until token expiration, zero if already expired
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Successful token endpoint payload
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Token endpoint error payload
#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Non-secret summary of a stored credential
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub profile: String,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
    pub scope: BTreeSet<String>,
    pub has_refresh_token: bool,
}

/// Providers differ on scope separators: RFC 6749 uses spaces, some use commas
pub fn parse_scope(raw: &str) -> BTreeSet<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Upper bound on a credential's lifetime, whatever the provider reports
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(366 * 24 * 60 * 60);

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Callback `state` did not match the attempt (CSRF protection)
    #[error("State mismatch in authorization callback")]
    StateMismatch,

    /// The provider redirected back with an `error` parameter
    #[error("Authorization denied by provider: {error} {}", .description.as_deref().unwrap_or(""))]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    /// Callback request lacked a usable authorization code
    #[error("Malformed authorization callback: {0}")]
    MalformedCallback(String),

    /// No callback arrived within the login window
    #[error("Authorization timeout")]
    Timeout,

    /// Token endpoint exchange or refresh failed
    #[error("Token exchange failed: {reason}")]
    ExchangeFailed { reason: String, terminal: bool },

    /// No usable credential is stored for the profile
    #[error("Not logged in for profile '{profile}'. Run 'ttk login' to authenticate")]
    LoginRequired { profile: String },

    /// The caller cancelled the login attempt
    #[error("Login cancelled")]
    Cancelled,

    /// Callback server error
    #[error("Callback server error: {0}")]
    CallbackServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl AuthError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::StateMismatch => "state_mismatch",
            AuthError::ProviderDenied { .. } => "provider_denied",
            AuthError::MalformedCallback(_) => "malformed_callback",
            AuthError::Timeout => "timeout",
            AuthError::ExchangeFailed { .. } => "exchange_failed",
            AuthError::LoginRequired { .. } => "login_required",
            AuthError::Cancelled => "cancelled",
            AuthError::CallbackServer(_) => "callback_server",
            AuthError::Config(_) => "config",
            AuthError::Vault(_) => "vault",
        }
    }

    /// True when retrying the same grant can never succeed
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthError::ExchangeFailed { terminal: true, .. })
    }

    pub(crate) fn exchange(reason: impl Into<String>) -> Self {
        AuthError::ExchangeFailed {
            reason: reason.into(),
            terminal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> TokenResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_from_token_response_defaults() {
        let now = Utc::now();
        let fallback: BTreeSet<String> = ["user.info.basic".to_string()].into();
        let creds = CredentialSet::from_token_response(
            response(serde_json::json!({ "access_token": "at" })),
            now,
            Duration::from_secs(7200),
            None,
            &fallback,
        );

        assert_eq!(creds.token_type, "Bearer");
        assert_eq!(creds.refresh_token, None);
        assert_eq!(creds.scope, fallback);
        let lifetime = creds.expires_at - now;
        assert!(lifetime.num_seconds() >= 7199 && lifetime.num_seconds() <= 7200);
    }

    #[test]
    fn test_oversized_expires_in_is_clamped() {
        let now = Utc::now();
        let creds = CredentialSet::from_token_response(
            response(serde_json::json!({
                "access_token": "at",
                "expires_in": 9_000_000_000_000u64
            })),
            now,
            Duration::from_secs(7200),
            None,
            &BTreeSet::new(),
        );

        let lifetime = (creds.expires_at - now).to_std().unwrap();
        assert!(lifetime <= MAX_TOKEN_LIFETIME);
        assert!(lifetime + Duration::from_secs(1) >= MAX_TOKEN_LIFETIME);
        assert!(!creds.expires_within(Duration::from_secs(300), now));
        assert!(creds.expires_within(Duration::from_secs(9_000_000_000_000), now));
    }

    #[test]
    fn test_refresh_token_kept_when_not_rotated() {
        let creds = CredentialSet::from_token_response(
            response(serde_json::json!({
                "access_token": "new",
                "expires_in": 60,
                "scope": "video.list,user.info.basic"
            })),
            Utc::now(),
            Duration::from_secs(7200),
            Some("old-refresh"),
            &BTreeSet::new(),
        );
        assert_eq!(creds.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(creds.scope.len(), 2);

        let rotated = CredentialSet::from_token_response(
            response(serde_json::json!({
                "access_token": "new",
                "refresh_token": "rotated"
            })),
            Utc::now(),
            Duration::from_secs(7200),
            Some("old-refresh"),
            &BTreeSet::new(),
        );
        assert_eq!(rotated.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn test_expiry_checks() {
        let now = Utc::now();
        let creds = CredentialSet {
            access_token: "at".into(),
            refresh_token: None,
            expires_at: now + chrono::Duration::seconds(10),
            scope: BTreeSet::new(),
            token_type: "Bearer".into(),
        };

        assert!(creds.expires_within(Duration::from_secs(60), now));
        assert!(!creds.expires_within(Duration::from_secs(5), now));
        assert!(!creds.is_expired(Duration::from_secs(0), now));
        assert!(creds.is_expired(Duration::from_secs(30), now));
        assert_eq!(
            creds.time_until_expiry(now + chrono::Duration::seconds(20)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = CredentialSet {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: Utc::now(),
            scope: BTreeSet::new(),
            token_type: "Bearer".into(),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }

    #[test]
    fn test_parse_scope_separators() {
        let scope = parse_scope("a b,c  d");
        assert_eq!(scope.len(), 4);
        assert!(parse_scope(" , ").is_empty());
    }
}
