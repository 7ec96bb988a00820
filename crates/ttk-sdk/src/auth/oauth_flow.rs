//! OAuth 2.0 authorization code + PKCE protocol steps
//!
//! Builds the authorize URL and talks to the token endpoint for the
//! `authorization_code` and `refresh_token` grants. Token endpoint calls are
//! treated as non-idempotent: only failures to connect are retried, so an
//! authorization code is never replayed after the server may have consumed it.

use super::callback_server::CallbackListener;
use super::pkce::PkceAttempt;
use super::types::{
    AuthConfig, AuthError, AuthResult, CredentialSet, TokenErrorResponse, TokenResponse,
};
use crate::retry::{FailureKind, Idempotency, RetryPolicy, RetryState};
use chrono::Utc;
use oauth2::{basic::BasicClient, AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope, TokenUrl};
use reqwest::header::ACCEPT;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Token endpoint `error` values that make retrying the same grant pointless
const TERMINAL_ERRORS: &[&str] = &[
    "invalid_grant",
    "invalid_client",
    "unauthorized_client",
    "unsupported_grant_type",
    "invalid_request",
    "invalid_scope",
];

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth flow implementation with PKCE support
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    config: AuthConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl OAuthFlow {
    /// Create a new OAuth flow instance
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_http_client(config, http, RetryPolicy::default()))
    }

    pub fn with_http_client(config: AuthConfig, http: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            config,
            http,
            retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn client_id(&self) -> AuthResult<&str> {
        let client_id = self.config.client_id.trim();
        if client_id.is_empty() {
            return Err(AuthError::Config(
                "OAuth client id is not configured (set oauth.client_id or TTK_OAUTH__CLIENT_ID)"
                    .into(),
            ));
        }
        Ok(client_id)
    }

    /// An idle listener for one login attempt
    pub fn new_listener(&self) -> CallbackListener {
        CallbackListener::new(
            self.config.callback_host.clone(),
            self.config.callback_port,
            self.config.callback_path.clone(),
            self.config.login_timeout,
        )
    }

    /// Build the authorization URL for `attempt`
    pub fn authorize_url(&self, attempt: &PkceAttempt) -> AuthResult<String> {
        let client = BasicClient::new(
            ClientId::new(self.client_id()?.to_string()),
            None,
            AuthUrl::new(self.config.authorize_url.clone())
                .map_err(|e| AuthError::Config(format!("Invalid authorize endpoint: {}", e)))?,
            Some(
                TokenUrl::new(self.config.token_url.clone())
                    .map_err(|e| AuthError::Config(format!("Invalid token endpoint: {}", e)))?,
            ),
        )
        .set_redirect_uri(
            RedirectUrl::new(attempt.redirect_uri().to_string())
                .map_err(|e| AuthError::Config(format!("Invalid redirect URI: {}", e)))?,
        );

        let state = attempt.state().to_string();
        let mut request = client
            .authorize_url(move || CsrfToken::new(state))
            .set_pkce_challenge(attempt.pkce_challenge().clone());

        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let (url, _) = request.url();
        debug!("Built authorization URL for {}", self.config.authorize_url);
        Ok(url.to_string())
    }

    /// Exchange an authorization code for credentials, consuming the attempt
    pub async fn exchange_code(
        &self,
        code: &str,
        attempt: PkceAttempt,
    ) -> AuthResult<CredentialSet> {
        debug!("Exchanging authorization code for tokens");
        let client_id = self.client_id()?;
        let redirect_uri = attempt.redirect_uri().to_string();
        let verifier = attempt.into_verifier();

        let issued_at = Utc::now();
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("code_verifier", verifier.as_str()),
                ("client_id", client_id),
            ])
            .await?;

        let requested: BTreeSet<String> = self.config.scopes.iter().cloned().collect();
        let credentials = CredentialSet::from_token_response(
            response,
            issued_at,
            self.config.default_lifetime,
            None,
            &requested,
        );

        info!("Token exchange completed successfully");
        Ok(credentials)
    }

    /// Refresh `current`, keeping its refresh token unless the server rotates it
    pub async fn refresh(&self, current: &CredentialSet) -> AuthResult<CredentialSet> {
        let refresh_token = current.refresh_token.as_deref().ok_or(AuthError::ExchangeFailed {
            reason: "no refresh token stored".into(),
            terminal: true,
        })?;
        debug!("Refreshing access token");
        let client_id = self.client_id()?;

        let issued_at = Utc::now();
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
            ])
            .await?;

        let credentials = CredentialSet::from_token_response(
            response,
            issued_at,
            self.config.default_lifetime,
            Some(refresh_token),
            &current.scope,
        );

        info!("Token refresh completed successfully");
        Ok(credentials)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        let mut state = RetryState::new();

        let response = loop {
            state.attempt += 1;
            let sent = self
                .http
                .post(&self.config.token_url)
                .header(ACCEPT, "application/json")
                .form(form)
                .send()
                .await;

            match sent {
                Ok(response) => break response,
                Err(e) => {
                    let failure = FailureKind::from_reqwest(&e);
                    match self
                        .retry
                        .next_delay(&state, Idempotency::NonIdempotent, failure, None)
                    {
                        Some(delay) => {
                            state.record(failure, delay);
                            warn!(
                                attempt = state.attempt,
                                kind = %failure,
                                delay_ms = delay.as_millis() as u64,
                                "Token endpoint unreachable, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            return Err(AuthError::exchange(format!(
                                "token endpoint request failed after {} attempt(s): {}",
                                state.attempt, e
                            )))
                        }
                    }
                }
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::exchange(format!("failed to read token response: {}", e)))?;

        if status.is_success() {
            if let Ok(tokens) = serde_json::from_str::<TokenResponse>(&body) {
                if !tokens.access_token.is_empty() {
                    return Ok(tokens);
                }
            }
        }

        match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(error) => Err(classify_token_error(error)),
            Err(_) if status.is_success() => Err(AuthError::exchange(
                "token response did not contain an access token",
            )),
            Err(_) => Err(AuthError::exchange(format!(
                "token endpoint returned {}",
                status
            ))),
        }
    }
}

fn classify_token_error(error: TokenErrorResponse) -> AuthError {
    let terminal = TERMINAL_ERRORS.contains(&error.error.as_str());
    let reason = match error.error_description.filter(|d| !d.is_empty()) {
        Some(description) => format!("{}: {}", error.error, description),
        None => error.error,
    };
    AuthError::ExchangeFailed { reason, terminal }
}
