//! Shared building blocks for ttk crates: configuration, logging, provider
//! defaults and validated common types.

pub mod auth_constants;
pub mod config;
pub mod logging;
pub mod types;

pub use config::{ConfigurationError, TtkConfig};
pub use types::{ProfileName, ProfileNameError};
