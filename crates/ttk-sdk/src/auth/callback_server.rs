//! One-shot local HTTP listener for the OAuth authorization redirect
//!
//! The listener moves through `Idle -> Listening -> Received ->
//! Validated | Rejected -> Closed`. Only the first request to the callback
//! path is considered; later requests get a fixed "already consumed" page.
//! Whatever the outcome (including timeout and cancellation) the server is
//! shut down and the port released before [`CallbackListener::wait_for_code`]
//! returns.

use super::types::{AuthError, AuthResult};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long in-flight responses may take to drain after an outcome
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle of a callback listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    Received,
    Validated,
    Rejected,
    Closed,
}

/// OAuth callback query parameters
#[derive(Debug, Default, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type Outcome = AuthResult<String>;

#[derive(Clone)]
struct CallbackContext {
    slot: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
    expected_state: Arc<str>,
    lifecycle: Arc<Mutex<ListenerState>>,
}

impl CallbackContext {
    fn take_slot(&self) -> Option<oneshot::Sender<Outcome>> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Short-lived loopback HTTP endpoint receiving the authorization redirect
pub struct CallbackListener {
    host: String,
    port: u16,
    path: String,
    timeout: Duration,
    lifecycle: Arc<Mutex<ListenerState>>,
    listener: Option<TcpListener>,
    redirect_uri: Option<String>,
}

impl std::fmt::Debug for CallbackListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackListener")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

impl CallbackListener {
    /// Create an idle listener; `port` 0 picks an ephemeral port on bind
    pub fn new(
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
            timeout,
            lifecycle: Arc::new(Mutex::new(ListenerState::Idle)),
            listener: None,
            redirect_uri: None,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.lifecycle
            .lock()
            .map(|state| *state)
            .unwrap_or(ListenerState::Closed)
    }

    /// The redirect URI, once bound
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    /// Port actually bound, once bound
    pub fn local_port(&self) -> Option<u16> {
        self.listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map(|addr| addr.port())
    }

    /// Bind the loopback socket and return the exact redirect URI to advertise
    pub async fn bind(&mut self) -> AuthResult<String> {
        if self.state() != ListenerState::Idle {
            return Err(AuthError::CallbackServer(format!(
                "cannot bind listener in state {:?}",
                self.state()
            )));
        }

        let addr = loopback_addr(&self.host, self.port)?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            AuthError::CallbackServer(format!("Failed to bind to {}: {}", addr, e))
        })?;
        let bound = listener
            .local_addr()
            .map_err(|e| AuthError::CallbackServer(e.to_string()))?;

        let host = if bound.is_ipv6() && !self.host.starts_with('[') {
            format!("[{}]", bound.ip())
        } else {
            self.host.clone()
        };
        let redirect_uri = format!("http://{}:{}{}", host, bound.port(), self.path);

        debug!("Callback listener bound on {}", bound);
        self.listener = Some(listener);
        self.redirect_uri = Some(redirect_uri.clone());
        set_state(&self.lifecycle, ListenerState::Listening);
        Ok(redirect_uri)
    }

    /// Serve until the first callback, the timeout or `cancel`, then close.
    ///
    /// Returns the authorization code on a validated callback.
    pub async fn wait_for_code(
        &mut self,
        expected_state: &str,
        cancel: CancellationToken,
    ) -> AuthResult<String> {
        let listener = self.listener.take().ok_or_else(|| {
            AuthError::CallbackServer(format!(
                "cannot wait on listener in state {:?}",
                self.state()
            ))
        })?;

        let (tx, rx) = oneshot::channel();
        let app = callback_router(&self.path, expected_state, tx, self.lifecycle.clone());

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
        });

        let outcome = tokio::select! {
            received = rx => received.unwrap_or_else(|_| {
                Err(AuthError::CallbackServer("callback server stopped unexpectedly".into()))
            }),
            _ = tokio::time::sleep(self.timeout) => {
                info!("No authorization callback within {:?}", self.timeout);
                Err(AuthError::Timeout)
            }
            _ = cancel.cancelled() => {
                info!("Authorization wait cancelled");
                Err(AuthError::Cancelled)
            }
        };

        shutdown.cancel();
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Callback server error during shutdown: {}", e),
            Ok(Err(e)) => warn!("Callback server task failed: {}", e),
            Err(_) => {
                warn!("Callback server did not drain within {:?}, aborting", SHUTDOWN_GRACE);
                server.abort();
                let _ = server.await;
            }
        }

        set_state(&self.lifecycle, ListenerState::Closed);
        debug!("Callback listener closed");
        outcome
    }
}

fn loopback_addr(host: &str, port: u16) -> AuthResult<SocketAddr> {
    let ip: IpAddr = if host.eq_ignore_ascii_case("localhost") {
        Ipv4Addr::LOCALHOST.into()
    } else {
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|_| AuthError::Config(format!("callback host '{host}' is not an IP address")))?
    };

    if !ip.is_loopback() {
        return Err(AuthError::Config(format!(
            "callback host '{host}' is not a loopback address"
        )));
    }
    Ok(SocketAddr::new(ip, port))
}

fn set_state(lifecycle: &Mutex<ListenerState>, next: ListenerState) {
    if let Ok(mut state) = lifecycle.lock() {
        *state = next;
    }
}

fn callback_router(
    path: &str,
    expected_state: &str,
    sender: oneshot::Sender<Outcome>,
    lifecycle: Arc<Mutex<ListenerState>>,
) -> Router {
    let context = CallbackContext {
        slot: Arc::new(Mutex::new(Some(sender))),
        expected_state: Arc::from(expected_state),
        lifecycle,
    };

    Router::new()
        .route(path, get(handle_callback))
        .fallback(handle_not_found)
        .with_state(context)
}

/// Check a callback against the expected state
fn validate(params: &CallbackQuery, expected_state: &str) -> Outcome {
    if let Some(error) = &params.error {
        return Err(AuthError::ProviderDenied {
            error: error.clone(),
            description: params.error_description.clone(),
        });
    }

    let received = params.state.as_deref().unwrap_or("");
    if !bool::from(received.as_bytes().ct_eq(expected_state.as_bytes())) {
        return Err(AuthError::StateMismatch);
    }

    match params.code.as_deref() {
        Some(code) if !code.is_empty() => Ok(code.to_string()),
        _ => Err(AuthError::MalformedCallback(
            "missing authorization code".into(),
        )),
    }
}

async fn handle_callback(
    State(context): State<CallbackContext>,
    params: Option<Query<CallbackQuery>>,
) -> Response {
    let Some(sender) = context.take_slot() else {
        debug!("Rejecting callback: attempt already consumed");
        return page(StatusCode::CONFLICT, already_consumed_page());
    };
    set_state(&context.lifecycle, ListenerState::Received);

    let params = params.map(|Query(p)| p).unwrap_or_default();
    let outcome = validate(&params, &context.expected_state);

    let response = match &outcome {
        Ok(_) => {
            set_state(&context.lifecycle, ListenerState::Validated);
            info!("Authorization callback validated");
            page(StatusCode::OK, success_page())
        }
        Err(e) => {
            set_state(&context.lifecycle, ListenerState::Rejected);
            warn!("Authorization callback rejected: {}", e.kind());
            page(StatusCode::BAD_REQUEST, error_page(&e.to_string()))
        }
    };

    let _ = sender.send(outcome);
    response
}

async fn handle_not_found() -> Response {
    page(StatusCode::NOT_FOUND, error_page("Not found"))
}

fn page(status: StatusCode, body: String) -> Response {
    (status, [(header::CONNECTION, "close")], Html(body)).into_response()
}

const PAGE_STYLE: &str = r#"
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            background: #111111;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
        }
        .container {
            background: #ffffff;
            padding: 40px;
            border-radius: 8px;
            max-width: 440px;
            text-align: center;
        }
        h1 { font-size: 22px; color: #111827; }
        p { color: #6B7280; }
        .details { font-family: monospace; color: #EF4444; word-break: break-word; }
"#;

fn render(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title} - ttk</title>
    <style>{PAGE_STYLE}</style>
</head>
<body>
    <div class="container">
        {body}
    </div>
</body>
</html>
"#
    )
}

fn success_page() -> String {
    render(
        "Authorization Successful",
        "<h1>Authorization successful</h1>\n        <p>You can close this window and return to the terminal.</p>",
    )
}

fn error_page(error: &str) -> String {
    render(
        "Authorization Failed",
        &format!(
            "<h1>Authorization failed</h1>\n        <p class=\"details\">{}</p>\n        <p>Close this window and run the login again.</p>",
            escape_html(error)
        ),
    )
}

fn already_consumed_page() -> String {
    render(
        "Already Consumed",
        "<h1>This login link was already used</h1>\n        <p>Return to the terminal.</p>",
    )
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
