//! Reverse proxy to the embedded backend
//!
//! Everything under `/pb` is forwarded 1:1: the prefix is dropped, the rest of
//! the path and the raw query string are appended to the backend base URL.
//! Bodies are moved as bytes and never re-encoded.

use std::time::Instant;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::any,
};
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, warn};

use crate::backend::BackendClient;

/// Path prefix the proxy is mounted under
pub const PROXY_PREFIX: &str = "/pb";

/// Largest request body the proxy will buffer
pub const MAX_PROXY_BODY: usize = 64 * 1024 * 1024;

const CORS_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const CORS_HEADERS: &str = "Content-Type, Authorization";

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Proxy failure, rendered as a response for the calling client
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("request body could not be read: {0}")]
    Body(axum::Error),
    #[error("embedded backend unavailable: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ProxyError::Body(_) => (StatusCode::BAD_REQUEST, "Request body could not be read"),
            ProxyError::Upstream(_) => (StatusCode::BAD_GATEWAY, "Embedded backend unavailable"),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Clone)]
struct ProxyState {
    client: BackendClient,
}

/// Router serving `/pb`, `/pb/` and `/pb/*` for every method
///
/// With `cors` set, every proxied response carries permissive CORS headers,
/// replacing whatever the backend sent.
pub fn router(client: BackendClient, cors: bool) -> Router {
    let router = Router::new()
        .route(PROXY_PREFIX, any(forward))
        // The catch-all does not match an empty tail
        .route(&format!("{}/", PROXY_PREFIX), any(forward))
        .route(&format!("{}/{{*path}}", PROXY_PREFIX), any(forward))
        .with_state(ProxyState { client });

    if !cors {
        return router;
    }

    router.layer(
        ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(CORS_METHODS),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(CORS_HEADERS),
            )),
    )
}

/// Backend path and query for an inbound URI, with the proxy prefix removed
pub fn upstream_path(uri: &Uri, prefix: &str) -> String {
    let path = uri.path();
    let rest = path.strip_prefix(prefix).unwrap_or(path);

    let mut target = String::with_capacity(rest.len() + 1);
    if !rest.starts_with('/') {
        target.push('/');
    }
    target.push_str(rest);

    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Request headers to send upstream
///
/// `host` is dropped so the client sets the backend's own; `content-length`
/// is recomputed from the forwarded body.
pub fn forwarded_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::HOST || name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn method_has_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

async fn forward(State(state): State<ProxyState>, req: Request) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let target = upstream_path(req.uri(), PROXY_PREFIX);

    match forward_inner(&state.client, req, &target).await {
        Ok(response) => {
            debug!(
                method = %method,
                target = %target,
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Proxied request"
            );
            response
        }
        Err(e) => {
            warn!(method = %method, target = %target, "Proxy request failed: {}", e);
            e.into_response()
        }
    }
}

async fn forward_inner(
    client: &BackendClient,
    req: Request,
    target: &str,
) -> Result<Response, ProxyError> {
    let (parts, body) = req.into_parts();

    let mut outbound = client
        .http()
        .request(parts.method.clone(), client.url(target))
        .headers(forwarded_request_headers(&parts.headers));

    if method_has_body(&parts.method) {
        let bytes = axum::body::to_bytes(body, MAX_PROXY_BODY)
            .await
            .map_err(ProxyError::Body)?;
        if !bytes.is_empty() {
            outbound = outbound.body(bytes);
        }
    }

    let upstream = outbound.send().await?;
    let status = upstream.status();
    let headers = upstream.headers().clone();

    let body = if parts.method == Method::HEAD {
        Bytes::new()
    } else {
        upstream.bytes().await?
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let relayed = response.headers_mut();
    for (name, value) in &headers {
        if is_hop_by_hop(name) {
            continue;
        }
        // Length follows the buffered body, except HEAD which has none
        if name == header::CONTENT_LENGTH && parts.method != Method::HEAD {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }

    Ok(response)
}
