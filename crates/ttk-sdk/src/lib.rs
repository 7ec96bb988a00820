//! Authentication and resilient HTTP access to the TikTok platform APIs
//!
//! [`auth`] obtains and stores OAuth credentials; [`ResilientClient`] spends
//! them on API calls with retry, backoff and refresh-on-401.

pub mod auth;
pub mod client;
pub mod error;
pub mod retry;
pub mod types;

pub use auth::{AuthError, CredentialSet, TokenManager, TokenSource, Vault};
pub use client::{ClientBuilder, ResilientClient};
pub use error::{ApiError, Result};
pub use retry::{Idempotency, RetryPolicy};
pub use types::{ApiRequest, ApiResponse};
