//! Layered configuration for ttk
//!
//! Sources, lowest priority first: compiled defaults, a TOML file, then
//! `TTK_`-prefixed environment variables using `__` between sections
//! (`TTK_OAUTH__CLIENT_ID`, `TTK_CLIENT__MAX_ATTEMPTS`).

use crate::auth_constants::*;
use crate::types::ProfileName;
use etcetera::{choose_base_strategy, BaseStrategy};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Name of the directory ttk uses under platform config/data roots
pub const APP_DIR_NAME: &str = "ttk";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to determine platform directories: {0}")]
    Directories(String),
}

impl From<figment::Error> for ConfigurationError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtkConfig {
    pub oauth: OAuthSettings,
    pub vault: VaultSettings,
    pub client: ClientSettings,
    pub profile: ProfileSettings,
}

/// OAuth client registration and flow timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// Public client identifier issued by the provider
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    /// Host written into the redirect URI; the listener always binds loopback
    pub callback_host: String,
    /// `0` picks an ephemeral port per login attempt
    pub callback_port: u16,
    pub callback_path: String,
    pub login_timeout_secs: u64,
    /// Refresh when the access token expires within this window
    pub refresh_margin_secs: u64,
    pub clock_skew_secs: u64,
    /// Assumed token lifetime when the token endpoint omits `expires_in`
    pub default_lifetime_secs: u64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            callback_host: DEFAULT_CALLBACK_HOST.to_string(),
            callback_port: 0,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            login_timeout_secs: 120,
            refresh_margin_secs: 60,
            clock_skew_secs: 30,
            default_lifetime_secs: 7200,
        }
    }
}

impl OAuthSettings {
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    pub fn default_lifetime(&self) -> Duration {
        Duration::from_secs(self.default_lifetime_secs)
    }
}

/// Local encrypted credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Vault directory; defaults to `<data dir>/ttk/vault`
    pub dir: Option<PathBuf>,
    /// PBKDF2-HMAC-SHA256 iteration count for newly written records
    pub kdf_iterations: u32,
    /// Environment variable holding a passphrase that replaces the key file secret
    pub passphrase_env: String,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            dir: None,
            kdf_iterations: 600_000,
            passphrase_env: "TTK_VAULT_PASSPHRASE".to_string(),
        }
    }
}

impl VaultSettings {
    /// Resolve the vault directory, falling back to the platform data dir
    pub fn resolve_dir(&self) -> Result<PathBuf, ConfigurationError> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("vault")),
        }
    }
}

/// Outbound API client behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub base_url: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    pub max_retry_after_secs: u64,
    pub request_timeout_secs: u64,
    pub quota_codes: Vec<i64>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ms: 250,
            max_retry_after_secs: 120,
            request_timeout_secs: 30,
            quota_codes: DEFAULT_QUOTA_CODES.to_vec(),
        }
    }
}

impl ClientSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_secs(self.max_retry_after_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Profile selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub default: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            default: DEFAULT_PROFILE.to_string(),
        }
    }
}

impl TtkConfig {
    /// Load configuration from defaults, an optional TOML file and the environment.
    ///
    /// With no explicit path, `<config dir>/ttk/config.toml` is merged if it exists.
    pub fn load(path_override: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut figment = Figment::from(Serialized::defaults(TtkConfig::default()));

        let path = match path_override {
            Some(path) => Some(path.to_path_buf()),
            None => config_dir().ok().map(|dir| dir.join("config.toml")),
        };

        if let Some(path) = path {
            if path.exists() {
                debug!("Merging configuration file {}", path.display());
                figment = figment.merge(Toml::file(&path));
            }
        }

        Self::extract(figment.merge(Env::prefixed("TTK_").split("__")))
    }

    /// Extract and validate a prepared figment
    pub fn extract(figment: Figment) -> Result<Self, ConfigurationError> {
        let config: TtkConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the auth and client layers cannot work with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (key, value) in [
            ("oauth.authorize_url", &self.oauth.authorize_url),
            ("oauth.token_url", &self.oauth.token_url),
            ("client.base_url", &self.client.base_url),
        ] {
            url::Url::parse(value).map_err(|e| invalid(key, e.to_string()))?;
        }

        if !self.oauth.callback_path.starts_with('/') {
            return Err(invalid("oauth.callback_path", "must start with '/'"));
        }

        if self.oauth.login_timeout_secs == 0 {
            return Err(invalid("oauth.login_timeout_secs", "must be greater than zero"));
        }

        if !VAULT_KDF_ITERATIONS.contains(&self.vault.kdf_iterations) {
            return Err(invalid(
                "vault.kdf_iterations",
                format!(
                    "must be between {} and {}",
                    VAULT_KDF_ITERATIONS.start(),
                    VAULT_KDF_ITERATIONS.end()
                ),
            ));
        }

        if self.client.max_attempts == 0 {
            return Err(invalid("client.max_attempts", "must be at least 1"));
        }

        if self.client.base_delay_ms > self.client.max_delay_ms {
            return Err(invalid(
                "client.base_delay_ms",
                "must not exceed client.max_delay_ms",
            ));
        }

        ProfileName::new(self.profile.default.as_str())
            .map_err(|e| invalid("profile.default", e.to_string()))?;

        Ok(())
    }

    /// The client id is only required once a login or refresh is attempted
    pub fn require_client_id(&self) -> Result<&str, ConfigurationError> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(invalid(
                "oauth.client_id",
                "not set; add it to config.toml or export TTK_OAUTH__CLIENT_ID",
            ));
        }
        Ok(&self.oauth.client_id)
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Platform data directory for ttk (e.g. `~/.local/share/ttk` on Linux)
pub fn data_dir() -> Result<PathBuf, ConfigurationError> {
    let strategy =
        choose_base_strategy().map_err(|e| ConfigurationError::Directories(e.to_string()))?;
    Ok(strategy.data_dir().join(APP_DIR_NAME))
}

/// Platform config directory for ttk (e.g. `~/.config/ttk` on Linux)
pub fn config_dir() -> Result<PathBuf, ConfigurationError> {
    let strategy =
        choose_base_strategy().map_err(|e| ConfigurationError::Directories(e.to_string()))?;
    Ok(strategy.config_dir().join(APP_DIR_NAME))
}
