//! End-to-end command tests for ttk-cli against a throwaway vault

use clap::Parser;
use std::path::PathBuf;
use tempfile::TempDir;
use ttk_cli::{Args, CliError};

fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("config.toml");
    let vault_dir = dir.path().join("vault");
    std::fs::write(
        &path,
        format!(
            "[oauth]\nclient_id = \"\"\n\n[vault]\ndir = {:?}\nkdf_iterations = 1000\n",
            vault_dir.display().to_string()
        ),
    )
    .unwrap();
    path
}

fn args(config: &PathBuf, rest: &[&str]) -> Args {
    let mut argv = vec!["ttk", "--config", config.to_str().unwrap()];
    argv.extend_from_slice(rest);
    Args::try_parse_from(argv).unwrap()
}

#[tokio::test]
async fn test_status_with_empty_vault() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    args(&config, &["--json", "status"]).run().await.unwrap();
    assert!(dir.path().join("vault").join("vault.key").exists());
}

#[tokio::test]
async fn test_logout_without_credentials_succeeds() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    args(&config, &["--profile", "shop", "logout"])
        .run()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_login_requires_client_id() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let err = args(&config, &["login", "--no-browser"])
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::Config(_)));
    assert_eq!(err.kind(), "config");
}

#[tokio::test]
async fn test_call_without_login_reports_auth_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let err = args(&config, &["call", "GET", "/user/info/"])
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "auth");
}

#[tokio::test]
async fn test_status_text_output_with_empty_vault() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    args(&config, &["status"]).run().await.unwrap();
}
