//! API endpoint handlers

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use clairvoyance_core::{Ontology, StorageError};

use super::state::AppState;

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Body accepted by `POST /api/ontology`
///
/// The UI wraps the ontology in an `ontology` key; scripts tend to send it bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OntologyPayload {
    Wrapped { ontology: Ontology },
    Bare(Ontology),
}

impl OntologyPayload {
    pub fn into_ontology(self) -> Ontology {
        match self {
            OntologyPayload::Wrapped { ontology } | OntologyPayload::Bare(ontology) => ontology,
        }
    }
}

/// Return the stored ontology
pub async fn get_ontology(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.load()).await {
        Ok(Ok(ontology)) => Json(ontology).into_response(),
        Ok(Err(e)) => {
            error!("Failed to load ontology: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load ontology")
        }
        Err(e) => {
            error!("Ontology load task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load ontology")
        }
    }
}

/// Replace the stored ontology wholesale
pub async fn replace_ontology(
    State(state): State<AppState>,
    Json(payload): Json<OntologyPayload>,
) -> Response {
    let ontology = payload.into_ontology();
    let store = state.store.clone();

    match tokio::task::spawn_blocking(move || store.replace(&ontology)).await {
        Ok(Ok(summary)) => {
            info!(
                superclasses = summary.superclasses,
                subclasses = summary.subclasses,
                rules = summary.rules,
                "Ontology replaced"
            );
            Json(json!({ "success": true })).into_response()
        }
        Ok(Err(StorageError::Invalid(reason))) => {
            warn!("Rejected ontology: {}", reason);
            error_response(StatusCode::BAD_REQUEST, &reason)
        }
        Ok(Err(e)) => {
            error!("Ontology replace failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Database update failed")
        }
        Err(e) => {
            error!("Ontology replace task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Database update failed")
        }
    }
}

/// Host health: backend process, bootstrap progress and ontology size
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let backend = match &state.supervisor {
        Some(supervisor) => serde_json::to_value(supervisor.status()).unwrap_or(Value::Null),
        None => json!({ "managed": false, "url": state.backend.base_url() }),
    };
    let backend_ready = state
        .supervisor
        .as_ref()
        .map(|s| s.status().state.is_ready())
        .unwrap_or(true);

    let store = state.store.clone();
    let ontology = match tokio::task::spawn_blocking(move || store.counts()).await {
        Ok(Ok(counts)) => serde_json::to_value(counts).unwrap_or(Value::Null),
        Ok(Err(e)) => {
            warn!("Ontology counts unavailable: {}", e);
            Value::Null
        }
        Err(e) => {
            warn!("Ontology counts task failed: {}", e);
            Value::Null
        }
    };

    let status = if backend_ready && !ontology.is_null() {
        "ok"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "backend": backend,
        "bootstrap": state.bootstrap.state(),
        "ontology": ontology,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Hold requests until the one-time backend bootstrap has run
pub async fn require_bootstrap(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.bootstrap.ensure_initialized().await {
        warn!(path = %req.uri().path(), "Serving request without a bootstrapped backend");
    }
    next.run(req).await
}
