//! Usage: Public test helpers for integration tests.

use crate::app::app_state::DashboardState;
use crate::app::forms_store::FormsStore;
use crate::gateway::DashboardServer;
use crate::infra::settings::Settings;
use crate::shared::error::AppResult;
use std::time::Duration;

pub const TEST_PROJECT_ID: &str = "b.1234abcd-5678-90ef-1234-567890abcdef";
pub const TEST_SESSION_SECRET: &str = "test-session-secret";

/// Settings pointing every Autodesk endpoint at `api_base_url`.
pub fn settings_for(api_base_url: &str) -> Settings {
    Settings {
        client_id: Some("test-client".to_string()),
        client_secret: Some("test-secret".to_string()),
        project_ids: vec![TEST_PROJECT_ID.to_string()],
        session_secret: TEST_SESSION_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        api_base_url: api_base_url.trim_end_matches('/').to_string(),
        oauth_callback_port: 0,
        oauth_timeout_secs: 5,
        http_timeout_secs: 5,
        ..Settings::default()
    }
}

/// Outbound client that ignores proxy environment variables; stand-ins live on loopback.
pub fn local_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_default()
}

/// Dashboard state wired to a stand-in Autodesk API at `api_base_url`.
pub fn dashboard_state(api_base_url: &str) -> DashboardState {
    DashboardState::with_http_client(settings_for(api_base_url), local_http_client())
}

pub fn store_access_token(state: &DashboardState, access_token: &str) {
    state.authenticator.store_access_token(access_token);
}

pub async fn spawn_dashboard(state: DashboardState) -> AppResult<DashboardServer> {
    DashboardServer::start(state, "127.0.0.1", 0).await
}

/// Poll until no load holds the store. `false` on timeout.
pub async fn wait_until_idle(store: &FormsStore, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while store.is_loading() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}
