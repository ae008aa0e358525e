use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::pages;
use crate::app::app_state::DashboardState;
use crate::app::data_load::{spawn_fetch_cycle, start_load, LoadStart};
use crate::domain::export::{export_file_name, export_forms_csv, summarize_forms, FormSummary};
use crate::shared::error::AppError;
use crate::shared::time::now_unix_seconds;

pub const CALLBACK_ROUTE: &str = "/auth/callback";

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    app: &'static str,
    version: &'static str,
    ts: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "ACC Forms Dashboard is running",
        app: "acc-forms-dashboard",
        version: env!("CARGO_PKG_VERSION"),
        ts: now_unix_seconds(),
    })
}

async fn dashboard(State(state): State<DashboardState>) -> Html<String> {
    let snapshot = state.store.snapshot();
    Html(pages::dashboard_page(&snapshot, state.settings.auth_mode.as_str()))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"status": "error", "message": message.into()})),
    )
        .into_response()
}

fn app_error_response(err: &AppError) -> Response {
    let status = match err.code() {
        "SEC_INVALID_INPUT" => StatusCode::BAD_REQUEST,
        "AUTH_REQUIRED" => StatusCode::UNAUTHORIZED,
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "LOAD_IN_PROGRESS" => StatusCode::CONFLICT,
        "UPSTREAM_STATUS" | "UPSTREAM_FORMAT" | "FETCH_FAILED" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("request failed: {err}");
    }
    error_response(status, err.message())
}

/// `redirect_uri` for the web login: `PUBLIC_BASE_URL` when set, else the request's Host.
fn callback_redirect_uri(state: &DashboardState, headers: &HeaderMap) -> String {
    if let Some(base) = state.settings.public_base_url.as_deref() {
        return format!("{base}{CALLBACK_ROUTE}");
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| super::listen::format_host_port("localhost", state.settings.port));
    format!("http://{host}{CALLBACK_ROUTE}")
}

async fn auth_start(State(state): State<DashboardState>, headers: HeaderMap) -> Response {
    if !state.authenticator.has_credentials() {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Missing Autodesk credentials");
    }
    let redirect_uri = callback_redirect_uri(&state, &headers);
    match state.begin_login(&redirect_uri) {
        Ok(auth_url) => {
            tracing::info!(redirect_uri = %redirect_uri, "oauth login started");
            Json(json!({"status": "success", "auth_url": auth_url})).into_response()
        }
        Err(err) => app_error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn html_page(status: StatusCode, body: String) -> Response {
    (status, Html(body)).into_response()
}

async fn auth_callback(
    State(state): State<DashboardState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error.as_deref().filter(|e| !e.is_empty()) {
        tracing::warn!(
            error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "oauth callback reported an error"
        );
        return html_page(
            StatusCode::BAD_REQUEST,
            pages::auth_failed_page(&format!("Authentication failed: {error}"), true),
        );
    }

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return html_page(
            StatusCode::BAD_REQUEST,
            pages::auth_failed_page("No Authorization Code", true),
        );
    };

    let pending = match state.complete_login(query.state.as_deref()) {
        Ok(pending) => pending,
        Err(err) => {
            tracing::warn!("oauth callback rejected: {err}");
            return html_page(
                StatusCode::BAD_REQUEST,
                pages::auth_failed_page(err.message(), true),
            );
        }
    };

    if let Err(err) = state
        .authenticator
        .try_exchange_code_for_token(code, &pending.redirect_uri)
        .await
    {
        tracing::error!("token exchange failed: {err}");
        return html_page(
            StatusCode::BAD_GATEWAY,
            pages::auth_failed_page("Token exchange failed: could not complete authentication", true),
        );
    }

    let loading_started = match state.store.try_begin_load() {
        Some(ticket) => {
            // Detached; the ticket publishes the outcome.
            drop(spawn_fetch_cycle(&state, ticket));
            true
        }
        None => false,
    };
    html_page(StatusCode::OK, pages::auth_success_page(loading_started))
}

async fn load_data(State(state): State<DashboardState>) -> Response {
    match start_load(&state) {
        Ok(LoadStart::AuthRequired) => Json(json!({
            "status": "auth_required",
            "message": "Authentication required. Please click the authentication link.",
            "auth_url": "/auth/start",
        }))
        .into_response(),
        Ok(LoadStart::Fetching(_)) => loading_response("Loading forms data..."),
        Ok(LoadStart::Authenticating(_)) => {
            loading_response("Authenticating with client credentials and loading forms data...")
        }
        Ok(LoadStart::BrowserLogin(_)) => {
            loading_response("Complete the Autodesk login in the opened browser window.")
        }
        Err(err) => app_error_response(&err),
    }
}

fn loading_response(message: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "loading", "message": message})),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    is_loading: bool,
    forms_count: usize,
    last_update: Option<String>,
    error_message: Option<String>,
    issues: Vec<String>,
}

async fn status(State(state): State<DashboardState>) -> Json<StatusResponse> {
    let snapshot = state.store.snapshot();
    Json(StatusResponse {
        is_loading: snapshot.is_loading,
        forms_count: snapshot.forms.len(),
        last_update: snapshot.last_update.map(|t| t.to_rfc3339()),
        error_message: snapshot.error_message.clone(),
        issues: snapshot.issues.clone(),
    })
}

#[derive(Debug, Serialize)]
struct FormsDataResponse {
    status: &'static str,
    data: Vec<FormSummary>,
}

async fn forms_data(State(state): State<DashboardState>) -> Response {
    let snapshot = state.store.snapshot();
    if !snapshot.has_forms() {
        return error_response(StatusCode::NOT_FOUND, "No data loaded");
    }
    Json(FormsDataResponse {
        status: "success",
        data: summarize_forms(&snapshot.forms),
    })
    .into_response()
}

async fn export_csv(State(state): State<DashboardState>) -> Response {
    let snapshot = state.store.snapshot();
    if !snapshot.has_forms() {
        return error_response(StatusCode::NOT_FOUND, "No data to export");
    }

    let bytes = match export_forms_csv(&snapshot.forms) {
        Ok(bytes) => bytes,
        Err(err) => return app_error_response(&err),
    };
    let filename = export_file_name(&chrono::Local::now());
    tracing::info!(filename = %filename, bytes = bytes.len(), "csv export served");

    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

pub(crate) fn build_router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/auth/start", get(auth_start))
        .route(CALLBACK_ROUTE, get(auth_callback))
        .route("/api/load-data", post(load_data))
        .route("/api/status", get(status))
        .route("/api/forms-data", get(forms_data))
        .route("/api/export-csv", get(export_csv))
        .with_state(state)
}
