use crate::app::app_state::DashboardState;
use crate::shared::error::{AppError, AppResult};
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::listen;
use super::routes::build_router;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DashboardStatus {
    pub port: u16,
    pub base_url: String,
    pub listen_addr: String,
}

/// A running dashboard HTTP server.
#[derive(Debug)]
pub struct DashboardServer {
    status: DashboardStatus,
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

fn bind_host_port(bind_host: &str, port: u16) -> std::io::Result<std::net::TcpListener> {
    let std_listener = std::net::TcpListener::bind((bind_host, port))?;
    std_listener.set_nonblocking(true)?;
    Ok(std_listener)
}

impl DashboardServer {
    /// Bind `host:port` (port 0 picks a free port) and start serving in a background task.
    pub async fn start(state: DashboardState, bind_host: &str, port: u16) -> AppResult<Self> {
        let std_listener = bind_host_port(bind_host, port).map_err(|e| {
            AppError::new(
                "SYSTEM_ERROR",
                format!("failed to bind {}: {e}", listen::format_host_port(bind_host, port)),
            )
            .with_source(e)
        })?;
        let local_addr = std_listener
            .local_addr()
            .map_err(|e| format!("SYSTEM_ERROR: failed to read bound address: {e}"))?;
        let port = local_addr.port();

        let listen_addr = listen::format_host_port(bind_host, port);
        let base_host = if listen::is_wildcard_host(bind_host) {
            "127.0.0.1"
        } else {
            bind_host
        };
        let base_url = format!("http://{}", listen::format_host_port(base_host, port));

        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| format!("SYSTEM_ERROR: listener init failed: {e}"))?;

        let app = build_router(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

            if let Err(err) = serve.await {
                tracing::error!(bind_addr = %local_addr, "dashboard server error: {}", err);
            }
        });

        tracing::info!(listen_addr = %listen_addr, base_url = %base_url, "dashboard server started");

        Ok(Self {
            status: DashboardStatus {
                port,
                base_url,
                listen_addr,
            },
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }

    pub fn status(&self) -> &DashboardStatus {
        &self.status
    }

    pub fn port(&self) -> u16 {
        self.status.port
    }

    pub fn base_url(&self) -> &str {
        &self.status.base_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let in-flight requests finish, then wait for the server task.
    pub async fn shutdown(self) -> AppResult<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| format!("SYSTEM_ERROR: dashboard server task failed: {e}").into())
    }
}
