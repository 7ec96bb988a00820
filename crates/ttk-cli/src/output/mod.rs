//! Console and JSON output for ttk commands

use crate::error::Result;
use console::style;
use reqwest::StatusCode;
use serde::Serialize;

/// Pretty-printed JSON on stdout, used for every `--json` result
pub fn json_output<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{json}");
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Failures go to stderr so `ttk call` output stays pipeable
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

pub fn print_info(message: &str) {
    println!("{} {}", style("ℹ").blue(), message);
}

/// The authorization URL the user must visit to finish `ttk login`
pub fn print_authorize_url(url: &str) {
    println!("{} Authorize ttk in your browser:", style("🔐").cyan());
    println!("  {}", style(url).underlined());
    println!();
}

/// Suggest the ttk command that resolves the current state
pub fn print_hint(message: &str, command: &str) {
    println!(
        "{} {} {}",
        style("→").cyan(),
        message,
        style(format!("`{command}`")).bold()
    );
}

/// Status line for an API response, on stderr ahead of the body
pub fn print_response_status(status: StatusCode, attempts: u32) {
    let code = if status.is_success() {
        style(status.as_u16()).green().bold()
    } else {
        style(status.as_u16()).yellow().bold()
    };
    eprintln!(
        "{} {} {}",
        code,
        status.canonical_reason().unwrap_or(""),
        style(format!("({attempts} attempt(s))")).dim()
    );
}
