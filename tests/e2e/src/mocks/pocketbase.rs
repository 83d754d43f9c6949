//! In-process fake PocketBase
//!
//! Implements just enough of the admin, collection, record and backup API for
//! the bootstrap sequence, proxy round trips and backup commands. Every request
//! is recorded.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

/// Admin token handed out by the fake
pub const FAKE_TOKEN: &str = "fake-admin-token";

/// Observable state of the fake
#[derive(Debug, Default)]
pub struct FakePocketBaseState {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    /// Collection name -> stored records
    pub collections: HashMap<String, Vec<Value>>,
    /// Backup listing entries, oldest first
    pub backups: Vec<Value>,
    /// Keys passed to restore, in order
    pub restored: Vec<String>,
    /// `METHOD /path?query` of every request, in arrival order
    pub requests: Vec<String>,
}

impl FakePocketBaseState {
    /// Requests to exactly `METHOD /path`, with or without a query string
    pub fn count(&self, method_and_path: &str) -> usize {
        self.requests
            .iter()
            .filter(|r| {
                r.split_once('?').map(|(path, _)| path).unwrap_or(r.as_str()) == method_and_path
            })
            .count()
    }
}

type Shared = Arc<Mutex<FakePocketBaseState>>;

/// Handle to a running fake
pub struct FakePocketBase {
    addr: SocketAddr,
    state: Shared,
}

impl FakePocketBase {
    /// Start an empty fake on an ephemeral loopback port
    pub async fn spawn() -> Self {
        Self::spawn_with(FakePocketBaseState::default()).await
    }

    pub async fn spawn_with(initial: FakePocketBaseState) -> Self {
        let state: Shared = Arc::new(Mutex::new(initial));

        let app = Router::new()
            .route("/api/health", get(health))
            .route("/api/admins", post(create_admin))
            .route("/api/admins/auth-with-password", post(auth_with_password))
            .route("/api/collections", post(create_collection))
            .route("/api/collections/{name}", get(get_collection))
            .route(
                "/api/collections/{name}/records",
                get(list_records).post(create_record),
            )
            .route("/api/backups", get(list_backups).post(create_backup))
            .route("/api/backups/{key}/restore", post(restore_backup))
            .layer(middleware::from_fn_with_state(state.clone(), record_request))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake PocketBase");
        let addr = listener.local_addr().expect("Fake PocketBase has no address");

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> MutexGuard<'_, FakePocketBaseState> {
        self.state.lock().expect("Fake PocketBase state poisoned")
    }
}

async fn record_request(State(state): State<Shared>, req: Request, next: Next) -> Response {
    let line = format!(
        "{} {}",
        req.method(),
        req.uri()
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/")
    );
    if let Ok(mut state) = state.lock() {
        state.requests.push(line);
    }
    next.run(req).await
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(FAKE_TOKEN)
}

async fn health() -> Json<Value> {
    Json(json!({ "code": 200, "message": "API is healthy.", "data": {} }))
}

async fn create_admin(State(state): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let Ok(mut state) = state.lock() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    };
    if state.admin_email.is_some() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 400, "message": "Failed to create admin." })),
        );
    }
    state.admin_email = body["email"].as_str().map(str::to_string);
    state.admin_password = body["password"].as_str().map(str::to_string);
    (StatusCode::OK, Json(json!({ "id": "admin0", "email": body["email"] })))
}

async fn auth_with_password(
    State(state): State<Shared>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Ok(state) = state.lock() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    };
    let matches = state.admin_email.as_deref() == body["identity"].as_str()
        && state.admin_password.as_deref() == body["password"].as_str()
        && state.admin_email.is_some();

    if matches {
        (StatusCode::OK, Json(json!({ "token": FAKE_TOKEN, "admin": { "id": "admin0" } })))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 400, "message": "Failed to authenticate." })),
        )
    }
}

async fn get_collection(
    State(state): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "code": 401 })));
    }
    let exists = state
        .lock()
        .map(|s| s.collections.contains_key(&name))
        .unwrap_or(false);
    if exists {
        (StatusCode::OK, Json(json!({ "name": name, "type": "base" })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": 404, "message": "The requested resource wasn't found." })),
        )
    }
}

async fn create_collection(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let Some(name) = body["name"].as_str() else {
        return StatusCode::BAD_REQUEST;
    };
    match state.lock() {
        Ok(mut state) => {
            state.collections.entry(name.to_string()).or_default();
            StatusCode::OK
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn list_records(State(state): State<Shared>, Path(name): Path<String>) -> (StatusCode, Json<Value>) {
    let Ok(state) = state.lock() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    };
    match state.collections.get(&name) {
        Some(records) => (
            StatusCode::OK,
            Json(json!({
                "page": 1,
                "perPage": 30,
                "totalItems": records.len(),
                "items": records,
            })),
        ),
        None => (StatusCode::NOT_FOUND, Json(json!({ "code": 404 }))),
    }
}

async fn create_record(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Ok(mut state) = state.lock() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    };
    let Some(records) = state.collections.get_mut(&name) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "code": 404 })));
    };
    body["id"] = json!(format!("rec{}", records.len()));
    records.push(body.clone());
    (StatusCode::OK, Json(body))
}

async fn list_backups(State(state): State<Shared>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "code": 401 })));
    }
    match state.lock() {
        Ok(state) => (StatusCode::OK, Json(Value::Array(state.backups.clone()))),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
    }
}

async fn create_backup(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let Some(name) = body["name"].as_str() else {
        return StatusCode::BAD_REQUEST;
    };
    let Ok(mut state) = state.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR;
    };
    if state.backups.iter().any(|b| b["key"] == name) {
        return StatusCode::BAD_REQUEST;
    }
    let modified = format!("2024-01-01 00:00:{:02}.000Z", state.backups.len());
    state.backups.push(json!({ "key": name, "size": 1024, "modified": modified }));
    StatusCode::NO_CONTENT
}

async fn restore_backup(
    State(state): State<Shared>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let Ok(mut state) = state.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR;
    };
    if !state.backups.iter().any(|b| b["key"] == key.as_str()) {
        return StatusCode::BAD_REQUEST;
    }
    state.restored.push(key);
    StatusCode::NO_CONTENT
}
