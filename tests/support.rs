#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// One canned upstream answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16, Value),
}

impl Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(body) => Json(body).into_response(),
            Reply::Status(code, body) => (
                StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                Json(body),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StubConfig {
    pub templates: Reply,
    /// Replies per template id, consumed one per request; exhausted lists answer `[]`.
    pub template_pages: HashMap<String, Vec<Reply>>,
    pub alternative: Reply,
    pub token: Reply,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            templates: Reply::Json(json!([])),
            template_pages: HashMap::new(),
            alternative: Reply::Json(json!([])),
            token: Reply::Json(json!({
                "access_token": "stub-access-token",
                "refresh_token": "stub-refresh-token",
                "token_type": "Bearer",
                "expires_in": 3599
            })),
        }
    }
}

#[derive(Debug, Default)]
pub struct Hits {
    pub templates: AtomicUsize,
    pub template_forms: AtomicUsize,
    pub alternative: AtomicUsize,
    pub token: AtomicUsize,
    /// `(template_id, limit, offset)` per forms page request.
    pub pages: Mutex<Vec<(String, usize, usize)>>,
    pub token_forms: Mutex<Vec<HashMap<String, String>>>,
    pub token_auth_headers: Mutex<Vec<String>>,
    pub bearer_tokens: Mutex<Vec<String>>,
}

impl Hits {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct StubState {
    config: Arc<Mutex<StubConfig>>,
    cursors: Arc<Mutex<HashMap<String, usize>>>,
    hits: Arc<Hits>,
}

pub struct StubUpstream {
    pub base_url: String,
    pub hits: Arc<Hits>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubUpstream {
    pub async fn start(config: StubConfig) -> Self {
        let hits = Arc::new(Hits::default());
        let config = Arc::new(Mutex::new(config));
        let state = StubState {
            config,
            cursors: Arc::new(Mutex::new(HashMap::new())),
            hits: hits.clone(),
        };

        let app = Router::new()
            .route("/authentication/v2/token", post(token))
            .route(
                "/construction/forms/v1/projects/:project/form-templates",
                get(templates),
            )
            .route(
                "/construction/forms/v1/projects/:project/form-templates/:template/forms",
                get(template_forms),
            )
            .route(
                "/construction/forms/v1/projects/:project/forms",
                get(alternative),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind stub upstream");
        let addr = listener.local_addr().expect("stub addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            base_url: format!("http://{addr}"),
            hits,
            shutdown: Some(tx),
        }
    }
}

impl Drop for StubUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn record_bearer(hits: &Hits, headers: &HeaderMap) {
    if let Some(value) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        hits.bearer_tokens
            .lock()
            .expect("bearer log")
            .push(value.to_string());
    }
}

async fn token(
    State(state): State<StubState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.hits.token.fetch_add(1, Ordering::SeqCst);
    state.hits.token_forms.lock().expect("token log").push(form);
    if let Some(value) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        state
            .hits
            .token_auth_headers
            .lock()
            .expect("auth log")
            .push(value.to_string());
    }
    let reply = state.config.lock().expect("stub config").token.clone();
    reply.into_response()
}

async fn templates(State(state): State<StubState>, headers: HeaderMap) -> Response {
    state.hits.templates.fetch_add(1, Ordering::SeqCst);
    record_bearer(&state.hits, &headers);
    let reply = state.config.lock().expect("stub config").templates.clone();
    reply.into_response()
}

async fn template_forms(
    State(state): State<StubState>,
    Path((_project, template)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.hits.template_forms.fetch_add(1, Ordering::SeqCst);
    let parse = |key: &str| {
        query
            .get(key)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(usize::MAX)
    };
    state
        .hits
        .pages
        .lock()
        .expect("page log")
        .push((template.clone(), parse("limit"), parse("offset")));

    let index = {
        let mut cursors = state.cursors.lock().expect("cursors");
        let cursor = cursors.entry(template.clone()).or_insert(0);
        let index = *cursor;
        *cursor += 1;
        index
    };
    let reply = state
        .config
        .lock()
        .expect("stub config")
        .template_pages
        .get(&template)
        .and_then(|pages| pages.get(index).cloned())
        .unwrap_or(Reply::Json(json!([])));
    reply.into_response()
}

async fn alternative(State(state): State<StubState>) -> Response {
    state.hits.alternative.fetch_add(1, Ordering::SeqCst);
    let reply = state.config.lock().expect("stub config").alternative.clone();
    reply.into_response()
}

/// `count` minimal form objects with ids `<prefix>-<offset + i>`.
pub fn forms_page(prefix: &str, offset: usize, count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| json!({"id": format!("{prefix}-{}", offset + i), "name": "Form"}))
            .collect(),
    )
}

pub fn template(id: &str, name: &str, template_type: &str) -> Value {
    json!({"id": id, "name": name, "templateType": template_type})
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("test http client")
}
