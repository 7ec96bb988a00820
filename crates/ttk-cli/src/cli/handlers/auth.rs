//! Authentication command handlers

use super::CommandContext;
use crate::error::Result;
use crate::output::{json_output, print_authorize_url, print_hint, print_info, print_success};
use crate::progress::{complete_spinner_and_clear, complete_spinner_error, create_spinner};
use async_trait::async_trait;
use chrono::Utc;
use console::style;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use ttk_sdk::auth::{
    AuthError, AuthResult, AuthorizationPrompt, CredentialSet, CredentialStatus,
    SystemBrowserPrompt,
};

/// Prints the authorize URL and optionally opens the system browser
#[derive(Debug, Clone, Copy)]
pub struct ConsolePrompt {
    open_browser: bool,
}

impl ConsolePrompt {
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

#[async_trait]
impl AuthorizationPrompt for ConsolePrompt {
    async fn present(&self, authorize_url: &str) -> AuthResult<()> {
        print_authorize_url(authorize_url);

        if self.open_browser {
            if let Err(e) = SystemBrowserPrompt.present(authorize_url).await {
                warn!("{}", e);
                print_info("Could not open a browser, open the URL above manually");
            }
        }

        print_info("Waiting for authorization (Ctrl-C to cancel)...");
        Ok(())
    }
}

/// Options for `ttk login`
#[derive(Debug, Clone, Copy)]
pub struct LoginOptions {
    pub open_browser: bool,
    pub force: bool,
    pub timeout_secs: Option<u64>,
}

/// Non-secret view of a credential set for output
#[derive(Debug, Serialize)]
struct CredentialSummary<'a> {
    profile: &'a str,
    expires_at: chrono::DateTime<Utc>,
    expires_in_secs: u64,
    scope: &'a BTreeSet<String>,
    has_refresh_token: bool,
}

impl<'a> CredentialSummary<'a> {
    fn new(profile: &'a str, credentials: &'a CredentialSet) -> Self {
        Self {
            profile,
            expires_at: credentials.expires_at,
            expires_in_secs: credentials.time_until_expiry(Utc::now()).as_secs(),
            scope: &credentials.scope,
            has_refresh_token: credentials.has_refresh_token(),
        }
    }
}

/// Handle login command
pub async fn handle_login(ctx: &CommandContext, options: LoginOptions) -> Result<()> {
    debug!("Starting login for profile '{}'", ctx.profile);
    let manager = ctx
        .token_manager(
            options.open_browser,
            options.timeout_secs.map(Duration::from_secs),
        )
        .await?;

    if !options.force && manager.vault().contains(&ctx.profile).await? {
        match manager.ensure_fresh(&ctx.profile).await {
            Ok(credentials) => {
                return report_credentials(ctx, "Already logged in", &credentials);
            }
            Err(e) => debug!("Stored credentials unusable ({}), starting login", e),
        }
    }

    ctx.config.require_client_id()?;

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let result = manager.login_with_cancel(&ctx.profile, cancel).await;
    ctrl_c.abort();

    let credentials = result?;
    report_credentials(ctx, "Login successful!", &credentials)
}

/// Handle logout command
pub async fn handle_logout(ctx: &CommandContext) -> Result<()> {
    let manager = ctx.token_manager(false, None).await?;
    let removed = manager.logout(&ctx.profile).await?;

    if ctx.json {
        return json_output(&serde_json::json!({
            "profile": ctx.profile.as_str(),
            "removed": removed,
        }));
    }

    if removed {
        print_success(&format!("Logged out of profile '{}'", ctx.profile));
    } else {
        print_info(&format!("Profile '{}' was not logged in", ctx.profile));
    }
    Ok(())
}

/// Handle status command
pub async fn handle_status(ctx: &CommandContext) -> Result<()> {
    let manager = ctx.token_manager(false, None).await?;
    let statuses = manager.status_all().await?;

    if ctx.json {
        return json_output(&statuses);
    }

    if statuses.is_empty() {
        print_info("No stored credentials");
        print_hint("Authenticate with", "ttk login");
        return Ok(());
    }

    for status in &statuses {
        print_status(status, status.profile == ctx.profile.as_str());
    }
    Ok(())
}

/// Handle refresh command
pub async fn handle_refresh(ctx: &CommandContext) -> Result<()> {
    ctx.config.require_client_id()?;
    let manager = ctx.token_manager(false, None).await?;

    let spinner = create_spinner("Refreshing access token...");
    match manager.refresh(&ctx.profile).await {
        Ok(credentials) => {
            complete_spinner_and_clear(spinner);
            report_credentials(ctx, "Token refreshed", &credentials)
        }
        Err(e) => {
            complete_spinner_error(spinner, "Token refresh failed");
            if matches!(e, AuthError::LoginRequired { .. }) {
                print_hint("Log in again with", "ttk login");
            }
            Err(e.into())
        }
    }
}

fn report_credentials(ctx: &CommandContext, headline: &str, credentials: &CredentialSet) -> Result<()> {
    let summary = CredentialSummary::new(ctx.profile.as_str(), credentials);
    if ctx.json {
        return json_output(&summary);
    }

    print_success(headline);
    println!(
        "  {} {} ({})",
        style("expires").dim(),
        summary.expires_at.to_rfc3339(),
        format_remaining(summary.expires_in_secs)
    );
    if !summary.scope.is_empty() {
        println!("  {} {}", style("scope").dim(), join_scope(summary.scope));
    }
    Ok(())
}

fn print_status(status: &CredentialStatus, active: bool) {
    let marker = if active { "*" } else { " " };
    let state = if status.expired {
        style("expired").red().to_string()
    } else {
        style("valid").green().to_string()
    };
    let remaining = (status.expires_at - Utc::now()).num_seconds().max(0) as u64;

    println!(
        "{} {:<20} {:<8} expires {} ({})",
        marker,
        status.profile,
        state,
        status.expires_at.to_rfc3339(),
        format_remaining(remaining)
    );
    if !status.scope.is_empty() {
        println!("    scope: {}", join_scope(&status.scope));
    }
    if !status.has_refresh_token {
        println!("    {}", style("no refresh token").yellow());
    }
}

fn join_scope(scope: &BTreeSet<String>) -> String {
    scope.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Human-readable remaining lifetime, e.g. `in 1h 5m`
fn format_remaining(secs: u64) -> String {
    if secs == 0 {
        return "expired".into();
    }
    let (hours, minutes) = (secs / 3600, (secs % 3600) / 60);
    match (hours, minutes) {
        (0, 0) => format!("in {}s", secs),
        (0, m) => format!("in {}m", m),
        (h, m) => format!("in {}h {}m", h, m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "expired");
        assert_eq!(format_remaining(42), "in 42s");
        assert_eq!(format_remaining(600), "in 10m");
        assert_eq!(format_remaining(3900), "in 1h 5m");
    }

    #[test]
    fn test_summary_omits_tokens() {
        let credentials = CredentialSet {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            scope: BTreeSet::from(["video.list".to_string()]),
            token_type: "Bearer".into(),
        };
        let json = serde_json::to_string(&CredentialSummary::new("default", &credentials)).unwrap();

        assert!(!json.contains("secret-access"));
        assert!(!json.contains("secret-refresh"));
        assert!(json.contains("video.list"));
    }
}
