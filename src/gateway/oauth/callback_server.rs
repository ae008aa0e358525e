//! Usage: One-shot localhost callback listener for the browser authorization code flow.
//!
//! The listener runs as its own task and hands the first valid callback to the waiter through a
//! oneshot channel. The waiter owns the timeout and aborts the task when it fires.

use crate::gateway::pages;
use crate::shared::error::AppResult;
use crate::shared::security::constant_time_eq;
use reqwest::Url;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub(crate) const CALLBACK_PATH: &str = "/callback";

const REQUEST_BUFFER_BYTES: usize = 8192;

/// A client that connects and stays silent is dropped after this long.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OAuthCallbackPayload {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

#[derive(Debug)]
pub(crate) struct BoundOAuthCallbackListener {
    port: u16,
    listener_v4: Option<TcpListener>,
    listener_v6: Option<TcpListener>,
}

impl BoundOAuthCallbackListener {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{CALLBACK_PATH}", self.port)
    }

    async fn accept(&mut self) -> std::io::Result<TcpStream> {
        let (socket, _) = match (self.listener_v4.as_mut(), self.listener_v6.as_mut()) {
            (Some(v4), Some(v6)) => {
                tokio::select! {
                    result = v4.accept() => result?,
                    result = v6.accept() => result?,
                }
            }
            (Some(v4), None) => v4.accept().await?,
            (None, Some(v6)) => v6.accept().await?,
            (None, None) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "no callback listener bound",
                ))
            }
        };
        Ok(socket)
    }
}

/// Bind loopback on `port` (IPv4 and IPv6 where available). Port 0 picks a free port.
pub(crate) async fn bind_callback_listener(port: u16) -> AppResult<BoundOAuthCallbackListener> {
    let bound = if port == 0 {
        try_bind_dynamic_port().await
    } else {
        try_bind_on_port(port).await
    };
    bound.map_err(|e| format!("SYSTEM_ERROR: oauth callback bind failed: {e}").into())
}

async fn try_bind_on_port(port: u16) -> Result<BoundOAuthCallbackListener, String> {
    let mut bind_errors: Vec<String> = Vec::new();
    let listener_v4 = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("127.0.0.1:{port} ({err})"));
            None
        }
    };
    let listener_v6 = match TcpListener::bind(("::1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("::1:{port} ({err})"));
            None
        }
    };
    if listener_v4.is_none() && listener_v6.is_none() {
        return Err(bind_errors.join("; "));
    }

    Ok(BoundOAuthCallbackListener {
        port,
        listener_v4,
        listener_v6,
    })
}

async fn try_bind_dynamic_port() -> Result<BoundOAuthCallbackListener, String> {
    let listener_v4 = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| format!("127.0.0.1:0 ({e})"))?;
    let port = listener_v4
        .local_addr()
        .map_err(|e| format!("127.0.0.1:0 (local_addr failed: {e})"))?
        .port();
    // IPv6 loopback is best effort.
    let listener_v6 = TcpListener::bind(("::1", port)).await.ok();

    Ok(BoundOAuthCallbackListener {
        port,
        listener_v4: Some(listener_v4),
        listener_v6,
    })
}

/// Listener task plus the receiving end of its rendezvous.
#[derive(Debug)]
pub(crate) struct PendingCallback {
    port: u16,
    rx: oneshot::Receiver<OAuthCallbackPayload>,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallbackWait {
    Received(OAuthCallbackPayload),
    TimedOut,
}

impl PendingCallback {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) async fn wait(mut self, timeout: Duration) -> AppResult<CallbackWait> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(payload)) => Ok(CallbackWait::Received(payload)),
            Ok(Err(_)) => Err("SYSTEM_ERROR: oauth callback listener stopped unexpectedly"
                .to_string()
                .into()),
            Err(_) => {
                tracing::warn!(
                    port = self.port,
                    timeout_secs = timeout.as_secs(),
                    "oauth callback timed out; stopping listener"
                );
                self.task.abort();
                Ok(CallbackWait::TimedOut)
            }
        }
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start serving the callback path. `expected_state`, when set, must match the callback's `state`.
pub(crate) fn spawn_callback_listener(
    listener: BoundOAuthCallbackListener,
    expected_state: Option<String>,
) -> PendingCallback {
    spawn_listener_task(listener, expected_state, CONNECTION_READ_TIMEOUT)
}

fn spawn_listener_task(
    mut listener: BoundOAuthCallbackListener,
    expected_state: Option<String>,
    read_timeout: Duration,
) -> PendingCallback {
    let port = listener.port();
    let (tx, rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        loop {
            let socket = match listener.accept().await {
                Ok(socket) => socket,
                Err(err) => {
                    tracing::warn!("oauth callback accept failed: {err}");
                    continue;
                }
            };
            if let Some(payload) = handle_connection(socket, expected_state.as_deref(), read_timeout).await {
                if tx.send(payload).is_err() {
                    tracing::debug!("oauth callback waiter went away before delivery");
                }
                return;
            }
        }
    });

    PendingCallback { port, rx, task }
}

/// Answer one request. Returns the payload only for a well-formed callback with a valid state.
async fn handle_connection(
    mut socket: TcpStream,
    expected_state: Option<&str>,
    read_timeout: Duration,
) -> Option<OAuthCallbackPayload> {
    let mut buffer = vec![0u8; REQUEST_BUFFER_BYTES];
    let size = match tokio::time::timeout(read_timeout, socket.read(&mut buffer)).await {
        Ok(Ok(0)) => return None,
        Ok(Ok(size)) => size,
        Ok(Err(err)) => {
            tracing::warn!("oauth callback read failed: {err}");
            return None;
        }
        Err(_) => {
            tracing::debug!("oauth callback connection sent nothing; closing it");
            return None;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..size]);
    let outcome = extract_request_target(request.as_ref())
        .and_then(parse_callback_target)
        .and_then(|payload| {
            if let Some(expected) = expected_state {
                validate_state(&payload, expected)?;
            }
            Ok(payload)
        });

    let (status, body, payload) = match outcome {
        Ok(payload) => {
            let body = match payload.error.as_deref() {
                Some(error) => {
                    pages::auth_failed_page(&format!("Authentication failed: {error}"), false)
                }
                None => pages::local_auth_success_page(),
            };
            ("200 OK", body, Some(payload))
        }
        Err(err) if err.code() == "NOT_FOUND" => ("404 Not Found", pages::not_found_page(), None),
        Err(err) => {
            tracing::warn!("rejected oauth callback request: {err}");
            (
                "400 Bad Request",
                pages::auth_failed_page(err.message(), false),
                None,
            )
        }
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;

    payload
}

fn extract_request_target(request: &str) -> AppResult<&str> {
    let first = request
        .lines()
        .next()
        .ok_or_else(|| "SEC_INVALID_INPUT: oauth callback malformed request".to_string())?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || target.is_empty() {
        return Err("SEC_INVALID_INPUT: oauth callback must be GET"
            .to_string()
            .into());
    }
    Ok(target)
}

pub(crate) fn parse_callback_target(target: &str) -> AppResult<OAuthCallbackPayload> {
    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid oauth callback target: {e}"))?;

    if url.path() != CALLBACK_PATH {
        return Err("NOT_FOUND: not the oauth callback path".to_string().into());
    }

    let mut code: Option<String> = None;
    let mut state: Option<String> = None;
    let mut error: Option<String> = None;
    let mut error_description: Option<String> = None;

    for (key, value) in url.query_pairs() {
        let value = Some(value.to_string()).filter(|v| !v.is_empty());
        match key.as_ref() {
            "code" => code = value,
            "state" => state = value,
            "error" => error = value,
            "error_description" => error_description = value,
            _ => {}
        }
    }

    if code.is_none() && error.is_none() {
        return Err("SEC_INVALID_INPUT: No authorization code found"
            .to_string()
            .into());
    }

    Ok(OAuthCallbackPayload {
        code,
        state,
        error,
        error_description,
    })
}

fn validate_state(payload: &OAuthCallbackPayload, expected_state: &str) -> AppResult<()> {
    let state = payload
        .state
        .as_deref()
        .ok_or_else(|| "SEC_INVALID_INPUT: oauth callback missing state".to_string())?;
    if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
        return Err("SEC_INVALID_INPUT: oauth callback state mismatch"
            .to_string()
            .into());
    }
    Ok(())
}
