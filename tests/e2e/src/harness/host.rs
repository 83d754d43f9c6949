//! Host assembly for router-level tests
//!
//! Wires a real ontology store, backend client and bootstrapper into the
//! host router, the same way the server binary does, minus the supervisor.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clairvoyance_core::OntologyStore;
use clairvoyance_server::config::AdminCredentials;
use clairvoyance_server::retry::RetryPolicy;
use clairvoyance_server::web::{self, AppState, RouterOptions};
use clairvoyance_server::{BackendClient, Bootstrapper};
use tempfile::TempDir;

/// A host router bound to a backend URL and a throwaway ontology database
pub struct TestHost {
    pub state: AppState,
    pub router: Router,
    _db_dir: TempDir,
}

impl TestHost {
    pub fn new(backend_url: &str) -> Self {
        Self::with_options(backend_url, RouterOptions::default())
    }

    pub fn with_options(backend_url: &str, options: RouterOptions) -> Self {
        let db_dir = TempDir::new().expect("Failed to create temp directory");
        let store = OntologyStore::open(db_dir.path().join("ontology.db"))
            .expect("Failed to open ontology store");

        let backend = BackendClient::new(backend_url).expect("Failed to build backend client");
        let bootstrap = Bootstrapper::new(backend.clone(), AdminCredentials::default())
            .with_health_policy(RetryPolicy::fixed(3, Duration::from_millis(10)));

        let state = AppState::new(Arc::new(store), None, backend, Arc::new(bootstrap));
        let router = web::build_router(state.clone(), &options);

        Self {
            state,
            router,
            _db_dir: db_dir,
        }
    }

    /// Serve the router on an ephemeral loopback port and return its URL
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test host");
        let addr = listener.local_addr().expect("Test host has no address");
        let router = self.router.clone();

        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        format!("http://{}", addr)
    }
}
