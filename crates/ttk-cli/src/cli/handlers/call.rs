//! `ttk call`: an authenticated request through the resilient client

use super::CommandContext;
use crate::cli::commands::CallArgs;
use crate::error::{CliError, Result};
use crate::output::{json_output, print_response_status};
use crate::progress::{complete_spinner_and_clear, complete_spinner_error, create_spinner};
use bytes::Bytes;
use reqwest::Method;
use ttk_sdk::{ApiRequest, ApiResponse, ClientBuilder, Idempotency};

/// Handle call command
pub async fn handle_call(ctx: &CommandContext, args: CallArgs) -> Result<()> {
    let request = build_request(args)?;
    let manager = ctx.token_manager(false, None).await?;
    let client = ClientBuilder::from_settings(&ctx.config.client)
        .profile(ctx.profile.clone())
        .token_source(manager)
        .build()?;

    let spinner = create_spinner(&format!("{} {}", request.method, request.url));
    let response = match client.call(request).await {
        Ok(response) => {
            complete_spinner_and_clear(spinner);
            response
        }
        Err(e) => {
            complete_spinner_error(spinner, "Request failed");
            return Err(e.into());
        }
    };

    print_response(ctx, &response)
}

fn build_request(args: CallArgs) -> Result<ApiRequest> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidArgument(format!("unknown HTTP method '{}'", args.method)))?;

    let mut request = ApiRequest::new(method, args.url);
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        request = request.header(name, value);
    }

    if let Some(data) = args.data {
        let has_content_type = request
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            request = request.header("Content-Type", "application/json");
        }
        request = request.body(Bytes::from(data));
    }

    if args.idempotent {
        request = request.idempotency(Idempotency::Idempotent);
    }
    Ok(request)
}

/// Split a `Name: value` header argument
fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CliError::InvalidArgument(format!("header '{}' is not K:V", raw)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "header '{}' has an empty name",
            raw
        )));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn print_response(ctx: &CommandContext, response: &ApiResponse) -> Result<()> {
    let parsed: Option<serde_json::Value> = response.json().ok();

    if ctx.json {
        return json_output(&serde_json::json!({
            "status": response.status.as_u16(),
            "attempts": response.attempts,
            "body": parsed.unwrap_or_else(|| serde_json::Value::String(response.text())),
        }));
    }

    print_response_status(response.status, response.attempts);
    match parsed {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("{}", response.text()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(method: &str, headers: &[&str], data: Option<&str>, idempotent: bool) -> CallArgs {
        CallArgs {
            method: method.into(),
            url: "/campaign/get/".into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            data: data.map(str::to_string),
            idempotent,
        }
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Access-Token:  abc ").unwrap(),
            ("Access-Token".to_string(), "abc".to_string())
        );
        assert_eq!(
            parse_header("X-Url: https://a.b/c").unwrap(),
            ("X-Url".to_string(), "https://a.b/c".to_string())
        );
        assert!(parse_header("no-separator").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_body_defaults_to_json() {
        let request = build_request(args("post", &[], Some("{}"), false)).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
        assert_eq!(request.effective_idempotency(), Idempotency::NonIdempotent);
    }

    #[test]
    fn test_explicit_content_type_kept() {
        let request = build_request(args(
            "POST",
            &["content-type: text/plain"],
            Some("hi"),
            true,
        ))
        .unwrap();
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.effective_idempotency(), Idempotency::Idempotent);
    }

    #[test]
    fn test_invalid_method_rejected() {
        assert!(build_request(args("GE T", &[], None, false)).is_err());
    }
}
