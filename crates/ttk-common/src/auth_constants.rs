//! Provider defaults compiled into the binary
//!
//! Every value here can be overridden through configuration; these only make
//! a fresh install work without a config file.

/// OAuth authorization endpoint
pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";

/// OAuth token endpoint (authorization_code and refresh_token grants)
pub const DEFAULT_TOKEN_URL: &str = "https://open.tiktokapis.com/v2/oauth/token/";

/// Base URL used to resolve relative paths passed to the API client
pub const DEFAULT_API_BASE_URL: &str = "https://business-api.tiktok.com/open_api/v1.3";

/// Scopes requested by `ttk login` unless configured otherwise
pub const DEFAULT_SCOPES: &[&str] = &["user.info.basic", "video.list", "ads.manage"];

/// Path the local callback listener serves
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

/// Loopback host written into the redirect URI
pub const DEFAULT_CALLBACK_HOST: &str = "127.0.0.1";

/// Profile used when none is given
pub const DEFAULT_PROFILE: &str = "default";

/// Provider response `code` signalling quota exhaustion on an HTTP 2xx body
pub const DEFAULT_QUOTA_CODES: &[i64] = &[40100];

/// Accepted PBKDF2 iteration counts for vault records and configuration
pub const VAULT_KDF_ITERATIONS: std::ops::RangeInclusive<u32> = 1_000..=10_000_000;
