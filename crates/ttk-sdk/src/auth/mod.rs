//! Authentication module for the ttk SDK
//!
//! This module provides OAuth 2.0 authentication capabilities including:
//! - PKCE (Proof Key for Code Exchange) authorization code flow
//! - One-shot loopback callback listener
//! - Encrypted per-profile credential vault
//! - Automatic token management with single-flight refresh

pub mod callback_server;
pub mod manager;
pub mod oauth_flow;
pub mod pkce;
pub mod provider;
pub mod types;
pub mod vault;

// Re-export commonly used types and functions
pub use callback_server::{CallbackListener, ListenerState};
pub use manager::TokenManager;
pub use oauth_flow::OAuthFlow;
pub use pkce::PkceAttempt;
pub use provider::{AuthorizationPrompt, SystemBrowserPrompt, TokenSource};
pub use types::{AuthConfig, AuthError, AuthResult, CredentialSet, CredentialStatus};
pub use vault::{KdfParams, Vault, VaultError, VaultSecret};
