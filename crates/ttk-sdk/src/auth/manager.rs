//! Token lifecycle: interactive login, silent refresh and invalidation
//!
//! The TokenManager owns the vault, the OAuth flow and the prompt. Logins are
//! serialised process-wide; refreshes are single-flight per profile, so
//! concurrent callers share one token endpoint exchange.

use super::oauth_flow::OAuthFlow;
use super::pkce::PkceAttempt;
use super::provider::{AuthorizationPrompt, TokenSource};
use super::types::{AuthError, AuthResult, CredentialSet, CredentialStatus};
use super::vault::{Vault, VaultError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ttk_common::ProfileName;

/// Only one callback listener and PKCE attempt may be live per process
static LOGIN_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Manages credentials with automatic refresh
pub struct TokenManager {
    vault: Arc<Vault>,
    flow: OAuthFlow,
    prompt: Arc<dyn AuthorizationPrompt>,
    refresh_locks: DashMap<ProfileName, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("vault", &self.vault)
            .field("flow", &self.flow)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(vault: Arc<Vault>, flow: OAuthFlow, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        Self {
            vault,
            flow,
            prompt,
            refresh_locks: DashMap::new(),
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Run the interactive authorization code flow and store the result
    pub async fn login(&self, profile: &ProfileName) -> AuthResult<CredentialSet> {
        self.login_with_cancel(profile, CancellationToken::new())
            .await
    }

    /// Like [`TokenManager::login`], abortable through `cancel`
    pub async fn login_with_cancel(
        &self,
        profile: &ProfileName,
        cancel: CancellationToken,
    ) -> AuthResult<CredentialSet> {
        let _login = tokio::select! {
            guard = LOGIN_LOCK.lock() => guard,
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
        };
        info!("Starting login for profile '{}'", profile);

        let mut listener = self.flow.new_listener();
        let redirect_uri = listener.bind().await?;
        let attempt = PkceAttempt::new(redirect_uri);
        let authorize_url = self.flow.authorize_url(&attempt)?;

        self.prompt.present(&authorize_url).await?;

        let code = listener.wait_for_code(attempt.state(), cancel).await?;
        let credentials = self.flow.exchange_code(&code, attempt).await?;

        self.vault.put(profile, &credentials).await?;
        info!("Login completed for profile '{}'", profile);
        Ok(credentials)
    }

    /// Credentials valid for at least the refresh margin, refreshing if needed
    pub async fn ensure_fresh(&self, profile: &ProfileName) -> AuthResult<CredentialSet> {
        let lock = self.refresh_lock(profile);
        let _guard = lock.lock().await;

        let current = self.load(profile).await?;
        if !current.expires_within(self.flow.config().refresh_margin, Utc::now()) {
            debug!("Stored token for '{}' is fresh", profile);
            return Ok(current);
        }

        debug!("Token for '{}' expires soon, refreshing", profile);
        self.refresh_locked(profile, current, true).await
    }

    /// Refresh after the server rejected `rejected_access_token`
    pub async fn force_refresh(
        &self,
        profile: &ProfileName,
        rejected_access_token: &str,
    ) -> AuthResult<CredentialSet> {
        let lock = self.refresh_lock(profile);
        let _guard = lock.lock().await;

        let current = self.load(profile).await?;
        if current.access_token != rejected_access_token {
            debug!("Token for '{}' already replaced by another caller", profile);
            return Ok(current);
        }

        self.refresh_locked(profile, current, false).await
    }

    /// Refresh now regardless of remaining lifetime
    pub async fn refresh(&self, profile: &ProfileName) -> AuthResult<CredentialSet> {
        let lock = self.refresh_lock(profile);
        let _guard = lock.lock().await;

        let current = self.load(profile).await?;
        self.refresh_locked(profile, current, false).await
    }

    /// Delete stored credentials; returns whether any existed
    pub async fn invalidate(&self, profile: &ProfileName) -> AuthResult<bool> {
        let removed = self.vault.delete(profile).await?;
        if removed {
            warn!("Invalidated stored credentials for profile '{}'", profile);
        }
        Ok(removed)
    }

    pub async fn logout(&self, profile: &ProfileName) -> AuthResult<bool> {
        let removed = self.vault.delete(profile).await?;
        info!("Logged out profile '{}'", profile);
        Ok(removed)
    }

    /// Non-secret summary of the stored credential, if any
    pub async fn status(&self, profile: &ProfileName) -> AuthResult<Option<CredentialStatus>> {
        match self.vault.get(profile).await {
            Ok(credentials) => Ok(Some(CredentialStatus {
                profile: profile.to_string(),
                expires_at: credentials.expires_at,
                expired: credentials.is_expired(self.flow.config().clock_skew, Utc::now()),
                scope: credentials.scope.clone(),
                has_refresh_token: credentials.has_refresh_token(),
            })),
            Err(VaultError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Status of every stored profile
    pub async fn status_all(&self) -> AuthResult<Vec<CredentialStatus>> {
        let mut statuses = Vec::new();
        for profile in self.vault.list().await? {
            if let Some(status) = self.status(&profile).await? {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }

    fn refresh_lock(&self, profile: &ProfileName) -> Arc<Mutex<()>> {
        self.refresh_locks.entry(profile.clone()).or_default().clone()
    }

    async fn load(&self, profile: &ProfileName) -> AuthResult<CredentialSet> {
        self.vault.get(profile).await.map_err(|e| match e {
            VaultError::NotFound { .. } => AuthError::LoginRequired {
                profile: profile.to_string(),
            },
            other => AuthError::Vault(other),
        })
    }

    /// Must be called with the profile's refresh lock held
    async fn refresh_locked(
        &self,
        profile: &ProfileName,
        current: CredentialSet,
        serve_unexpired_on_failure: bool,
    ) -> AuthResult<CredentialSet> {
        if !current.has_refresh_token() {
            warn!("No refresh token for '{}', login required", profile);
            self.vault.delete(profile).await?;
            return Err(AuthError::LoginRequired {
                profile: profile.to_string(),
            });
        }

        match self.flow.refresh(&current).await {
            Ok(fresh) => {
                self.vault.put(profile, &fresh).await?;
                Ok(fresh)
            }
            Err(e) if e.is_terminal() => {
                warn!("Refresh for '{}' rejected ({}), login required", profile, e);
                self.vault.delete(profile).await?;
                Err(AuthError::LoginRequired {
                    profile: profile.to_string(),
                })
            }
            Err(e) => {
                let skew = self.flow.config().clock_skew;
                if serve_unexpired_on_failure && !current.is_expired(skew, Utc::now()) {
                    warn!(
                        "Refresh for '{}' failed ({}), using current token until expiry",
                        profile, e
                    );
                    Ok(current)
                } else {
                    Err(e)
                }
            }
        }
    }
}

#[async_trait]
impl TokenSource for TokenManager {
    async fn access_token(&self, profile: &ProfileName) -> AuthResult<CredentialSet> {
        self.ensure_fresh(profile).await
    }

    async fn force_refresh(
        &self,
        profile: &ProfileName,
        rejected_access_token: &str,
    ) -> AuthResult<CredentialSet> {
        TokenManager::force_refresh(self, profile, rejected_access_token).await
    }

    async fn invalidate(&self, profile: &ProfileName) -> AuthResult<()> {
        TokenManager::invalidate(self, profile).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::AuthConfig;
    use crate::auth::vault::{KdfParams, VaultSecret};
    use crate::retry::RetryPolicy;
    use chrono::SubsecRound;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoPrompt;

    #[async_trait]
    impl AuthorizationPrompt for NoPrompt {
        async fn present(&self, _authorize_url: &str) -> AuthResult<()> {
            Ok(())
        }
    }

    fn manager(dir: &TempDir, token_url: String) -> TokenManager {
        let vault = Vault::new(
            dir.path(),
            VaultSecret::from_parts(b"secret".to_vec(), [1u8; 16]),
            KdfParams::pbkdf2(1_000),
        );
        let config = AuthConfig {
            client_id: "client".into(),
            token_url,
            ..AuthConfig::default()
        };
        let flow = OAuthFlow::new(config)
            .unwrap()
            .with_retry_policy(RetryPolicy::none());
        TokenManager::new(Arc::new(vault), flow, Arc::new(NoPrompt))
    }

    fn credentials(expires_in: i64, refresh: Option<&str>) -> CredentialSet {
        CredentialSet {
            access_token: "old-access".into(),
            refresh_token: refresh.map(str::to_string),
            expires_at: (Utc::now() + chrono::Duration::seconds(expires_in)).trunc_subsecs(0),
            scope: BTreeSet::from(["user.info.basic".to_string()]),
            token_type: "Bearer".into(),
        }
    }

    fn profile() -> ProfileName {
        ProfileName::new("default").unwrap()
    }

    #[tokio::test]
    async fn test_fresh_token_not_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, format!("{}/token", server.uri()));
        let stored = credentials(3600, Some("rt"));
        manager.vault().put(&profile(), &stored).await.unwrap();

        assert_eq!(manager.ensure_fresh(&profile()).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_missing_profile_requires_login() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, "http://127.0.0.1:9/token".into());

        assert!(matches!(
            manager.ensure_fresh(&profile()).await,
            Err(AuthError::LoginRequired { .. })
        ));
    }

    #[tokio::test]
    async fn test_expiring_token_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "expires_in": 86400
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, format!("{}/token", server.uri()));
        manager
            .vault()
            .put(&profile(), &credentials(10, Some("rt")))
            .await
            .unwrap();

        let fresh = manager.ensure_fresh(&profile()).await.unwrap();
        assert_eq!(fresh.access_token, "new-access");
        assert_eq!(fresh.refresh_token.as_deref(), Some("rt"));
        assert_eq!(manager.vault().get(&profile()).await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn test_terminal_refresh_failure_deletes_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, format!("{}/token", server.uri()));
        manager
            .vault()
            .put(&profile(), &credentials(10, Some("rt")))
            .await
            .unwrap();

        assert!(matches!(
            manager.ensure_fresh(&profile()).await,
            Err(AuthError::LoginRequired { .. })
        ));
        assert!(!manager.vault().contains(&profile()).await.unwrap());
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_serves_unexpired_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, format!("{}/token", server.uri()));
        let stored = credentials(45, Some("rt"));
        manager.vault().put(&profile(), &stored).await.unwrap();

        // Inside the 60s refresh margin but outside the 30s skew
        assert_eq!(manager.ensure_fresh(&profile()).await.unwrap(), stored);

        // Past expiry the failure surfaces and nothing is deleted
        let expired = credentials(-5, Some("rt"));
        manager.vault().put(&profile(), &expired).await.unwrap();
        assert!(matches!(
            manager.ensure_fresh(&profile()).await,
            Err(AuthError::ExchangeFailed { terminal: false, .. })
        ));
        assert!(manager.vault().contains(&profile()).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_refresh_token_requires_login() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, "http://127.0.0.1:9/token".into());
        manager
            .vault()
            .put(&profile(), &credentials(10, None))
            .await
            .unwrap();

        assert!(matches!(
            manager.ensure_fresh(&profile()).await,
            Err(AuthError::LoginRequired { .. })
        ));
        assert!(!manager.vault().contains(&profile()).await.unwrap());
    }

    #[tokio::test]
    async fn test_force_refresh_skips_already_replaced_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, format!("{}/token", server.uri()));
        let stored = credentials(3600, Some("rt"));
        manager.vault().put(&profile(), &stored).await.unwrap();

        let result = manager
            .force_refresh(&profile(), "some-older-token")
            .await
            .unwrap();
        assert_eq!(result, stored);
    }

    #[tokio::test]
    async fn test_explicit_refresh_ignores_remaining_lifetime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "rotated",
                "expires_in": 86400
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, format!("{}/token", server.uri()));
        manager
            .vault()
            .put(&profile(), &credentials(3600, Some("rt")))
            .await
            .unwrap();

        let fresh = manager.refresh(&profile()).await.unwrap();
        assert_eq!(fresh.access_token, "new-access");
        assert_eq!(fresh.refresh_token.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn test_status_and_logout() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, "http://127.0.0.1:9/token".into());
        assert!(manager.status(&profile()).await.unwrap().is_none());

        manager
            .vault()
            .put(&profile(), &credentials(3600, Some("rt")))
            .await
            .unwrap();

        let status = manager.status(&profile()).await.unwrap().unwrap();
        assert!(!status.expired);
        assert!(status.has_refresh_token);
        assert_eq!(manager.status_all().await.unwrap().len(), 1);

        assert!(manager.logout(&profile()).await.unwrap());
        assert!(!manager.logout(&profile()).await.unwrap());
    }

    #[tokio::test]
    async fn test_login_cancelled_before_prompt() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, "http://127.0.0.1:9/token".into());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            manager.login_with_cancel(&profile(), cancel),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }
}
