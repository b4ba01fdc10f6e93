use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const VALID_USERNAME: &str = "testuser";
pub const VALID_PASSWORD: &str = "testpass";
pub const VALID_BEARER_TOKEN: &str = "test-bearer-token-12345";
pub const VALID_API_KEY: &str = "test-api-key-67890";

const MAX_DELAY_SECONDS: u64 = 30;
const MAX_LARGE_BYTES: usize = 16 * 1024 * 1024;

/// Shared state: a hit counter for every request and per-path counters for
/// the flaky routes.
#[derive(Clone, Default)]
pub struct ServerState {
    hits: Arc<AtomicUsize>,
    flaky: Arc<RwLock<HashMap<String, u32>>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests served since startup, across all routes.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn app() -> Router {
    app_with_state(ServerState::new())
}

pub fn app_with_state(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/echo", any(echo))
        .route("/echo/{*path}", any(echo))
        .route("/status/{code}", any(status))
        .route("/delay/{seconds}", any(delay))
        .route("/json", get(sample_json))
        .route("/large/{bytes}", any(large))
        .route("/flaky/{failures}", any(flaky))
        .route("/auth/basic", any(auth_basic))
        .route("/auth/bearer", any(auth_bearer))
        .route("/auth/apikey", any(auth_api_key))
        .route("/auth/any", any(auth_any))
        .layer(middleware::from_fn_with_state(state.clone(), count_hits))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, ServerState::new()).await
}

pub async fn run_with_state(listener: TcpListener, state: ServerState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn count_hits(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "REST caller test server",
        "endpoints": {
            "/echo": "echo method, path, query, headers and body",
            "/status/{code}": "respond with the given status code",
            "/delay/{seconds}": "respond after a delay (max 30s)",
            "/json": "sample JSON document",
            "/large/{bytes}": "body of the given size",
            "/flaky/{failures}": "503 for the first N hits, then 200",
            "/auth/basic": "requires Basic auth",
            "/auth/bearer": "requires a Bearer token",
            "/auth/apikey": "requires an X-API-Key header",
            "/auth/any": "accepts any of the above",
        },
    }))
}

async fn echo(
    method: Method,
    uri: Uri,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let header_map: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    Json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "method": method.as_str(),
        "path": uri.path(),
        "query_params": query,
        "headers": header_map,
        "body": body,
    }))
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (
            status,
            Json(json!({ "message": format!("Returning status code {code}"), "code": code })),
        )
            .into_response(),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("invalid status code {code}") })),
        )
            .into_response(),
    }
}

async fn delay(Path(seconds): Path<u64>) -> Json<Value> {
    let seconds = seconds.min(MAX_DELAY_SECONDS);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    Json(json!({ "message": format!("Delayed for {seconds} seconds"), "delay": seconds }))
}

async fn sample_json() -> Json<Value> {
    Json(json!({
        "message": "Hello from the REST caller test server!",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": { "temperature": 23.5, "humidity": 65, "status": "ok" },
    }))
}

async fn large(Path(bytes): Path<usize>) -> Response {
    let bytes = bytes.min(MAX_LARGE_BYTES);
    ([(header::CONTENT_TYPE, "text/plain")], "x".repeat(bytes)).into_response()
}

async fn flaky(State(state): State<ServerState>, Path(failures): Path<u32>, uri: Uri) -> Response {
    let seen = {
        let mut counters = state.flaky.write().await;
        let counter = counters.entry(uri.path().to_string()).or_insert(0);
        *counter += 1;
        *counter
    };
    if seen <= failures {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
    } else {
        (StatusCode::OK, "Success").into_response()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The username when the request carries the valid Basic credential.
fn basic_user(headers: &HeaderMap) -> Option<String> {
    let encoded = header_str(headers, "authorization")?.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    (user == VALID_USERNAME && pass == VALID_PASSWORD).then(|| user.to_string())
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    header_str(headers, "authorization").and_then(|v| v.strip_prefix("Bearer ")) == Some(VALID_BEARER_TOKEN)
}

fn api_key_ok(headers: &HeaderMap) -> bool {
    header_str(headers, "x-api-key") == Some(VALID_API_KEY)
}

fn unauthorized(hint: Value) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Authentication required", "hint": hint })),
    )
        .into_response()
}

async fn auth_basic(method: Method, headers: HeaderMap) -> Response {
    match basic_user(&headers) {
        Some(username) => Json(json!({
            "message": "Basic authentication successful!",
            "username": username,
            "method": method.as_str(),
        }))
        .into_response(),
        None => {
            let mut response = unauthorized(json!(format!(
                "Use username: {VALID_USERNAME}, password: {VALID_PASSWORD}"
            )));
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic realm=\"Login Required\""),
            );
            response
        }
    }
}

async fn auth_bearer(method: Method, headers: HeaderMap) -> Response {
    if bearer_ok(&headers) {
        Json(json!({ "message": "Bearer token authentication successful!", "method": method.as_str() }))
            .into_response()
    } else {
        unauthorized(json!(format!("Use Bearer token: {VALID_BEARER_TOKEN}")))
    }
}

async fn auth_api_key(method: Method, headers: HeaderMap) -> Response {
    if api_key_ok(&headers) {
        Json(json!({ "message": "API key authentication successful!", "method": method.as_str() }))
            .into_response()
    } else {
        unauthorized(json!(format!("Use X-API-Key header: {VALID_API_KEY}")))
    }
}

async fn auth_any(method: Method, headers: HeaderMap) -> Response {
    let (auth_type, username) = if let Some(user) = basic_user(&headers) {
        ("Basic Auth", Some(user))
    } else if bearer_ok(&headers) {
        ("Bearer Token", None)
    } else if api_key_ok(&headers) {
        ("API Key", None)
    } else {
        return unauthorized(json!({
            "basic": format!("username: {VALID_USERNAME}, password: {VALID_PASSWORD}"),
            "bearer": format!("token: {VALID_BEARER_TOKEN}"),
            "apikey": format!("X-API-Key: {VALID_API_KEY}"),
        }));
    };
    let mut body = json!({
        "message": "Authentication successful!",
        "auth_type": auth_type,
        "method": method.as_str(),
    });
    if let Some(username) = username {
        body["username"] = Value::String(username);
    }
    Json(body).into_response()
}
