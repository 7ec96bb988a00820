use clap::{Args as ClapArgs, Subcommand};

/// Main CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in through the browser and store credentials for the profile
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Run the browser flow even if stored credentials are still usable
        #[arg(long)]
        force: bool,

        /// Seconds to wait for the browser redirect
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Delete the profile's stored credentials
    Logout,

    /// Show stored profiles, expiry and scopes
    Status,

    /// Exchange the refresh token for a new access token now
    Refresh,

    /// Send an authenticated request to the API
    Call(CallArgs),
}

/// Arguments for `ttk call`
#[derive(ClapArgs, Debug, Clone)]
pub struct CallArgs {
    /// HTTP method, e.g. GET or POST
    pub method: String,

    /// Absolute URL, or a path relative to client.base_url
    pub url: String,

    /// Extra request header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "K:V")]
    pub headers: Vec<String>,

    /// Request body; sent as JSON unless a Content-Type header is given
    #[arg(short, long, value_name = "BODY")]
    pub data: Option<String>,

    /// Allow retries after ambiguous failures even for POST/PATCH
    #[arg(long)]
    pub idempotent: bool,
}
