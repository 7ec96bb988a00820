//! Seams between the auth flow and its collaborators
//!
//! [`AuthorizationPrompt`] is how a login surfaces the authorize URL to the
//! user; [`TokenSource`] is how the API client obtains, refreshes and drops
//! credentials without knowing about the vault or the token endpoint.

use super::types::{AuthError, AuthResult, CredentialSet};
use async_trait::async_trait;
use tracing::debug;
use ttk_common::ProfileName;

/// Surfaces the authorize URL to the user
///
/// This is the only interactive step of a login; the flow waits on the
/// callback listener once `present` returns.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn present(&self, authorize_url: &str) -> AuthResult<()>;
}

/// Opens the authorize URL in the system browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowserPrompt;

#[async_trait]
impl AuthorizationPrompt for SystemBrowserPrompt {
    async fn present(&self, authorize_url: &str) -> AuthResult<()> {
        debug!("Opening system browser for authorization");
        let url = authorize_url.to_string();
        tokio::task::spawn_blocking(move || webbrowser::open(&url))
            .await
            .map_err(|e| AuthError::Config(format!("Failed to open browser: {}", e)))?
            .map_err(|e| AuthError::Config(format!("Failed to open browser: {}", e)))
    }
}

/// Source of access tokens for outbound API calls
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Credentials that are valid for at least the refresh margin
    async fn access_token(&self, profile: &ProfileName) -> AuthResult<CredentialSet>;

    /// Replace credentials the server rejected.
    ///
    /// Implementations return newer credentials without another exchange if
    /// `rejected_access_token` has already been replaced.
    async fn force_refresh(
        &self,
        profile: &ProfileName,
        rejected_access_token: &str,
    ) -> AuthResult<CredentialSet>;

    /// Drop stored credentials so the next call requires a login
    async fn invalidate(&self, profile: &ProfileName) -> AuthResult<()>;
}
