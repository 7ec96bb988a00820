use crate::cli::{commands::Commands, handlers};
use crate::error::{CliError, Result};
use clap::Parser;
use clap_verbosity_flag::{OffLevel, Verbosity};
use std::path::PathBuf;
use ttk_common::{ProfileName, TtkConfig};

/// ttk - TikTok API authentication and access
#[derive(Parser, Debug)]
#[command(
    name = "ttk",
    version,
    about = "ttk - TikTok API authentication and access",
    long_about = "Command-line access to the TikTok platform APIs.

QUICK START:
  ttk login                         # Authorize in the browser
  ttk status                        # Show stored credentials
  ttk call GET /user/info/          # Authenticated API request

CREDENTIALS:
  ttk refresh                       # Refresh the access token now
  ttk logout                        # Delete stored credentials
  ttk --profile shop login          # Work with a named profile

CONFIGURATION:
  Settings are read from <config dir>/ttk/config.toml and TTK_* environment
  variables, e.g. TTK_OAUTH__CLIENT_ID."
)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Credential profile (defaults to profile.default from configuration)
    #[arg(short, long, global = true, value_name = "NAME")]
    pub profile: Option<ProfileName>,

    #[command(flatten)]
    pub verbosity: Verbosity<OffLevel>,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let config = TtkConfig::load(self.config.as_deref())?;
        let profile = match self.profile {
            Some(profile) => profile,
            None => ProfileName::new(config.profile.default.as_str())
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?,
        };

        let ctx = handlers::CommandContext {
            config,
            profile,
            json: self.json,
        };

        match self.command {
            Commands::Login {
                no_browser,
                force,
                timeout,
            } => {
                handlers::auth::handle_login(
                    &ctx,
                    handlers::auth::LoginOptions {
                        open_browser: !no_browser,
                        force,
                        timeout_secs: timeout,
                    },
                )
                .await
            }
            Commands::Logout => handlers::auth::handle_logout(&ctx).await,
            Commands::Status => handlers::auth::handle_status(&ctx).await,
            Commands::Refresh => handlers::auth::handle_refresh(&ctx).await,
            Commands::Call(args) => handlers::call::handle_call(&ctx, args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_flags() {
        let args = Args::try_parse_from([
            "ttk",
            "--profile",
            "shop",
            "login",
            "--no-browser",
            "--timeout",
            "30",
        ])
        .unwrap();

        assert_eq!(args.profile.unwrap().as_str(), "shop");
        match args.command {
            Commands::Login {
                no_browser,
                force,
                timeout,
            } => {
                assert!(no_browser);
                assert!(!force);
                assert_eq!(timeout, Some(30));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_profile_rejected() {
        assert!(Args::try_parse_from(["ttk", "--profile", "../etc", "status"]).is_err());
    }

    #[test]
    fn test_call_arguments() {
        let args = Args::try_parse_from([
            "ttk",
            "call",
            "POST",
            "/campaign/create/",
            "-H",
            "X-Trace: 1",
            "-H",
            "X-Other: 2",
            "--data",
            "{}",
            "--idempotent",
            "--json",
        ])
        .unwrap();

        assert!(args.json);
        match args.command {
            Commands::Call(call) => {
                assert_eq!(call.method, "POST");
                assert_eq!(call.headers.len(), 2);
                assert_eq!(call.data.as_deref(), Some("{}"));
                assert!(call.idempotent);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
