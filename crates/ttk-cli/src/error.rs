//! Error types for the ttk CLI

use color_eyre::eyre::Report;
use thiserror::Error;
use ttk_sdk::auth::{AuthError, VaultError};
use ttk_sdk::ApiError;

/// CLI error type with minimal variants
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file or environment issues
    #[error("Configuration error: {0}")]
    Config(#[from] ttk_common::ConfigurationError),

    /// API communication errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Authentication/authorization issues
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Credential vault issues
    #[error("Credential vault error: {0}")]
    Vault(#[from] VaultError),

    /// Argument that clap accepted but the command cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Everything else (using color-eyre's Report for rich errors)
    #[error(transparent)]
    Internal(#[from] Report),
}

impl CliError {
    /// Stable machine-readable kind, delegating to the library error
    pub fn kind(&self) -> &'static str {
        match self {
            CliError::Config(_) => "config",
            CliError::Api(e) => e.kind(),
            CliError::Auth(e) => e.kind(),
            CliError::Vault(e) => e.kind(),
            CliError::InvalidArgument(_) => "invalid_argument",
            CliError::Serialization(_) => "serialization",
            CliError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
