//! HTTP surface of the host
//!
//! One router carries the `/pb` proxy, the ontology API, host health and,
//! when configured, the built front-end.

pub mod handlers;
pub mod state;
pub mod static_files;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::proxy;
pub use state::AppState;

/// Router knobs that come from configuration
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Port the host listens on, used for the API CORS allow-list
    pub port: u16,
    pub proxy_cors: bool,
    pub static_dir: Option<PathBuf>,
}

impl From<&AppConfig> for RouterOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            port: config.port,
            proxy_cors: config.proxy_cors,
            static_dir: config.static_dir.clone(),
        }
    }
}

fn api_cors(port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
        // Vite dev server
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
    .iter()
    .filter_map(|origin| HeaderValue::from_str(origin).ok())
    .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the host router
pub fn build_router(state: AppState, options: &RouterOptions) -> Router {
    let api = Router::new()
        .route(
            "/api/ontology",
            get(handlers::get_ontology).post(handlers::replace_ontology),
        )
        .layer(
            ServiceBuilder::new()
                .concurrency_limit(50)
                .layer(api_cors(options.port)),
        )
        .with_state(state.clone());

    // Only traffic bound for the backend waits for the one-time bootstrap
    let proxied = proxy::router(state.backend.clone(), options.proxy_cors).layer(
        middleware::from_fn_with_state(state.clone(), handlers::require_bootstrap),
    );

    let health = Router::new()
        .route("/api/health", get(handlers::health_check))
        .with_state(state);

    let router = api.merge(proxied).merge(health);

    match &options.static_dir {
        Some(dir) => {
            if !dir.join("index.html").is_file() {
                warn!(dir = %dir.display(), "Static directory has no index.html");
            }
            router.fallback_service(static_files::spa_service(dir))
        }
        None => router,
    }
}

/// Serve `app` on `addr` until `shutdown` resolves
pub async fn serve<F>(app: Router, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Clairvoyance listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server shut down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
