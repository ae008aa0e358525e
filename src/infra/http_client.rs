//! Usage: Shared outbound HTTP client for the Autodesk token and forms endpoints.

use crate::shared::error::AppResult;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_http_client(request_timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("acc-forms-dashboard/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| format!("SYSTEM_ERROR: http client init failed: {e}").into())
}
