mod support;

use std::collections::HashMap;
use std::time::Duration;

use acc_forms_dashboard_lib::test_support::{
    dashboard_state, local_http_client, settings_for, spawn_dashboard, store_access_token,
    wait_until_idle,
};
use acc_forms_dashboard_lib::{AuthMode, DashboardState, CSV_COLUMNS, NO_FORMS_MESSAGE};
use serde_json::{json, Value};
use support::{forms_page, http_client, template, Hits, Reply, StubConfig, StubUpstream};

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

fn one_template_upstream() -> StubConfig {
    let mut page = vec![json!({
        "id": "form-1",
        "formNum": 7,
        "name": "Morning walk",
        "status": "submitted",
        "customValues": [
            {"itemLabel": "Weather", "textVal": "Sunny", "fieldId": "w1"}
        ],
        "tabularValues": {
            "Crew": [{"name": "Ana", "hours": 8}]
        }
    })];
    if let Value::Array(rest) = forms_page("f", 1, 2) {
        page.extend(rest);
    }

    StubConfig {
        templates: Reply::Json(json!({"data": [template("t1", "Daily Log", "pg")]})),
        template_pages: HashMap::from([(
            "t1".to_string(),
            vec![Reply::Json(json!({"data": page}))],
        )]),
        ..StubConfig::default()
    }
}

async fn get_json(url: String) -> (u16, Value) {
    let resp = http_client().get(url).send().await.expect("get");
    let status = resp.status().as_u16();
    let body = resp.text().await.expect("body");
    (status, serde_json::from_str(&body).unwrap_or(Value::Null))
}

async fn post_json(url: String) -> (u16, Value) {
    let resp = http_client().post(url).send().await.expect("post");
    let status = resp.status().as_u16();
    let body = resp.text().await.expect("body");
    (status, serde_json::from_str(&body).unwrap_or(Value::Null))
}

fn query_map(url: &str) -> HashMap<String, String> {
    reqwest::Url::parse(url)
        .expect("url")
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[tokio::test]
async fn health_and_empty_state_endpoints() {
    let upstream = StubUpstream::start(StubConfig::default()).await;
    let server = spawn_dashboard(dashboard_state(&upstream.base_url))
        .await
        .expect("server");
    let base = server.base_url().to_string();

    let (code, health) = get_json(format!("{base}/health")).await;
    assert_eq!(code, 200);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["app"], "acc-forms-dashboard");

    let (code, status) = get_json(format!("{base}/api/status")).await;
    assert_eq!(code, 200);
    assert_eq!(status["is_loading"], false);
    assert_eq!(status["forms_count"], 0);
    assert_eq!(status["last_update"], Value::Null);

    let (code, data) = get_json(format!("{base}/api/forms-data")).await;
    assert_eq!(code, 404);
    assert_eq!(data["message"], "No data loaded");

    let (code, export) = get_json(format!("{base}/api/export-csv")).await;
    assert_eq!(code, 404);
    assert_eq!(export["message"], "No data to export");

    let page = http_client()
        .get(format!("{base}/"))
        .send()
        .await
        .expect("dashboard")
        .text()
        .await
        .expect("html");
    assert!(page.contains("ACC Forms Dashboard"));

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn load_without_token_asks_for_login() {
    let upstream = StubUpstream::start(StubConfig::default()).await;
    let server = spawn_dashboard(dashboard_state(&upstream.base_url))
        .await
        .expect("server");

    let (code, body) = post_json(format!("{}/api/load-data", server.base_url())).await;
    assert_eq!(code, 200);
    assert_eq!(body["status"], "auth_required");
    assert_eq!(body["auth_url"], "/auth/start");
    assert_eq!(Hits::count(&upstream.hits.token), 0);

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn load_with_missing_configuration_is_an_error() {
    let mut settings = settings_for("http://127.0.0.1:9");
    settings.project_ids.clear();
    let server = spawn_dashboard(DashboardState::with_http_client(
        settings,
        local_http_client(),
    ))
    .await
    .expect("server");

    let (code, body) = post_json(format!("{}/api/load-data", server.base_url())).await;
    assert_eq!(code, 500);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Missing required environment variables");

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn second_load_while_busy_conflicts() {
    let upstream = StubUpstream::start(StubConfig::default()).await;
    let state = dashboard_state(&upstream.base_url);
    let server = spawn_dashboard(state.clone()).await.expect("server");

    let ticket = state.store.begin_load().expect("first load");
    let (code, body) = post_json(format!("{}/api/load-data", server.base_url())).await;
    assert_eq!(code, 409);
    assert_eq!(body["message"], "Data is already being loaded");

    let (_, status) = get_json(format!("{}/api/status", server.base_url())).await;
    assert_eq!(status["is_loading"], true);

    drop(ticket);
    assert!(wait_until_idle(&state.store, IDLE_TIMEOUT).await);
    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn held_token_loads_forms_and_exports_csv() {
    let upstream = StubUpstream::start(one_template_upstream()).await;
    let state = dashboard_state(&upstream.base_url);
    store_access_token(&state, "held-token");
    let server = spawn_dashboard(state.clone()).await.expect("server");
    let base = server.base_url().to_string();

    let (code, body) = post_json(format!("{base}/api/load-data")).await;
    assert_eq!(code, 202);
    assert_eq!(body["status"], "loading");
    assert!(wait_until_idle(&state.store, IDLE_TIMEOUT).await);

    let (_, status) = get_json(format!("{base}/api/status")).await;
    assert_eq!(status["forms_count"], 3);
    assert_eq!(status["error_message"], Value::Null);
    assert!(status["last_update"].is_string());

    let (code, data) = get_json(format!("{base}/api/forms-data")).await;
    assert_eq!(code, 200);
    assert_eq!(data["status"], "success");
    let first = &data["data"][0];
    assert_eq!(first["templateName"], "Daily Log");
    assert_eq!(first["customFieldsCount"], 1);
    assert_eq!(first["customFields"]["Weather"], "Sunny");
    assert_eq!(first["tabularData"]["Crew"]["rowCount"], 1);

    let bearers = upstream.hits.bearer_tokens.lock().expect("bearers").clone();
    assert_eq!(bearers, vec!["Bearer held-token".to_string()]);

    let resp = http_client()
        .get(format!("{base}/api/export-csv"))
        .send()
        .await
        .expect("export");
    assert_eq!(resp.status().as_u16(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"), "{content_type}");
    let disposition = resp
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        disposition.starts_with("attachment; filename=\"ACC_Forms_Export_"),
        "{disposition}"
    );
    assert!(disposition.ends_with(".csv\""), "{disposition}");

    let csv = resp.text().await.expect("csv");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(CSV_COLUMNS.join(",").as_str()));
    let rows: Vec<&str> = lines.collect();
    assert!(rows.iter().any(|r| r.contains("Weather") && r.contains("Sunny")));
    assert!(rows.iter().any(|r| r.contains("Crew")));

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn empty_project_reports_no_forms() {
    let upstream = StubUpstream::start(StubConfig::default()).await;
    let state = dashboard_state(&upstream.base_url);
    store_access_token(&state, "held-token");
    let server = spawn_dashboard(state.clone()).await.expect("server");

    let (code, _) = post_json(format!("{}/api/load-data", server.base_url())).await;
    assert_eq!(code, 202);
    assert!(wait_until_idle(&state.store, IDLE_TIMEOUT).await);

    let (_, status) = get_json(format!("{}/api/status", server.base_url())).await;
    assert_eq!(status["forms_count"], 0);
    assert_eq!(status["error_message"], NO_FORMS_MESSAGE);

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn client_credentials_mode_authenticates_then_loads() {
    let upstream = StubUpstream::start(one_template_upstream()).await;
    let mut settings = settings_for(&upstream.base_url);
    settings.auth_mode = AuthMode::ClientCredentials;
    let state = DashboardState::with_http_client(settings, local_http_client());
    let server = spawn_dashboard(state.clone()).await.expect("server");

    let (code, body) = post_json(format!("{}/api/load-data", server.base_url())).await;
    assert_eq!(code, 202);
    assert_eq!(body["status"], "loading");
    assert!(wait_until_idle(&state.store, IDLE_TIMEOUT).await);

    assert_eq!(Hits::count(&upstream.hits.token), 1);
    assert_eq!(state.store.snapshot().forms.len(), 3);

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn web_login_round_trip_loads_forms() {
    let upstream = StubUpstream::start(one_template_upstream()).await;
    let state = dashboard_state(&upstream.base_url);
    let server = spawn_dashboard(state.clone()).await.expect("server");
    let base = server.base_url().to_string();

    let (code, start) = get_json(format!("{base}/auth/start")).await;
    assert_eq!(code, 200);
    assert_eq!(start["status"], "success");
    let auth_url = start["auth_url"].as_str().expect("auth_url");
    let params = query_map(auth_url);
    assert_eq!(params["redirect_uri"], format!("{base}/auth/callback"));
    assert_eq!(params["client_id"], "test-client");

    let forged = http_client()
        .get(format!("{base}/auth/callback"))
        .query(&[("code", "c1"), ("state", "forged.state")])
        .send()
        .await
        .expect("forged");
    assert_eq!(forged.status().as_u16(), 400);
    assert_eq!(Hits::count(&upstream.hits.token), 0);

    let ok = http_client()
        .get(format!("{base}/auth/callback"))
        .query(&[("code", "c1"), ("state", params["state"].as_str())])
        .send()
        .await
        .expect("callback");
    assert_eq!(ok.status().as_u16(), 200);
    let page = ok.text().await.expect("page");
    assert!(page.contains("Authentication Successful"));

    assert!(wait_until_idle(&state.store, IDLE_TIMEOUT).await);
    assert_eq!(Hits::count(&upstream.hits.token), 1);
    assert_eq!(state.store.snapshot().forms.len(), 3);
    let forms = upstream.hits.token_forms.lock().expect("forms").clone();
    assert_eq!(forms[0]["code"], "c1");
    assert_eq!(forms[0]["redirect_uri"], format!("{base}/auth/callback"));

    let replay = http_client()
        .get(format!("{base}/auth/callback"))
        .query(&[("code", "c1"), ("state", params["state"].as_str())])
        .send()
        .await
        .expect("replay");
    assert_eq!(replay.status().as_u16(), 400);

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn callback_error_and_missing_code_are_rejected() {
    let upstream = StubUpstream::start(StubConfig::default()).await;
    let server = spawn_dashboard(dashboard_state(&upstream.base_url))
        .await
        .expect("server");
    let base = server.base_url().to_string();

    let denied = http_client()
        .get(format!("{base}/auth/callback?error=access_denied"))
        .send()
        .await
        .expect("denied");
    assert_eq!(denied.status().as_u16(), 400);
    assert!(denied
        .text()
        .await
        .expect("page")
        .contains("Authentication failed: access_denied"));

    let missing = http_client()
        .get(format!("{base}/auth/callback"))
        .send()
        .await
        .expect("missing");
    assert_eq!(missing.status().as_u16(), 400);
    assert!(missing
        .text()
        .await
        .expect("page")
        .contains("No Authorization Code"));

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn failed_code_exchange_is_a_bad_gateway() {
    let upstream = StubUpstream::start(StubConfig {
        token: Reply::Status(400, json!({"error": "invalid_grant"})),
        ..StubConfig::default()
    })
    .await;
    let state = dashboard_state(&upstream.base_url);
    let server = spawn_dashboard(state.clone()).await.expect("server");
    let base = server.base_url().to_string();

    let (_, start) = get_json(format!("{base}/auth/start")).await;
    let params = query_map(start["auth_url"].as_str().expect("auth_url"));

    let resp = http_client()
        .get(format!("{base}/auth/callback"))
        .query(&[("code", "c1"), ("state", params["state"].as_str())])
        .send()
        .await
        .expect("callback");
    assert_eq!(resp.status().as_u16(), 502);
    assert!(state.authenticator.access_token().is_none());
    assert!(!state.store.is_loading());

    server.shutdown().await.expect("shutdown");
}
