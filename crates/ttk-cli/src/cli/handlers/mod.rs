//! Command handlers for the ttk CLI

pub mod auth;
pub mod call;

use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use ttk_common::{ProfileName, TtkConfig};
use ttk_sdk::auth::{AuthConfig, OAuthFlow, TokenManager, Vault};

/// Resolved configuration shared by every handler
#[derive(Debug)]
pub struct CommandContext {
    pub config: TtkConfig,
    pub profile: ProfileName,
    pub json: bool,
}

impl CommandContext {
    /// Build a token manager over the configured vault
    pub async fn token_manager(
        &self,
        open_browser: bool,
        login_timeout: Option<Duration>,
    ) -> Result<Arc<TokenManager>> {
        let vault = Vault::open(&self.config.vault).await?;
        debug!("Using credential vault at {}", vault.dir().display());

        let mut auth_config = AuthConfig::from(&self.config.oauth);
        if let Some(timeout) = login_timeout {
            auth_config.login_timeout = timeout;
        }
        let flow = OAuthFlow::new(auth_config)?;

        Ok(Arc::new(TokenManager::new(
            Arc::new(vault),
            flow,
            Arc::new(auth::ConsolePrompt::new(open_browser)),
        )))
    }
}
