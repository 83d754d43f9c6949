//! Shared host state

use std::sync::Arc;

use clairvoyance_core::OntologyStore;

use crate::backend::BackendClient;
use crate::bootstrap::Bootstrapper;
use crate::supervisor::Supervisor;

/// Shared application state for the HTTP surface
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<OntologyStore>,
    /// None when the backend is managed outside this process
    pub supervisor: Option<Supervisor>,
    pub backend: BackendClient,
    pub bootstrap: Arc<Bootstrapper>,
}

impl AppState {
    pub fn new(
        store: Arc<OntologyStore>,
        supervisor: Option<Supervisor>,
        backend: BackendClient,
        bootstrap: Arc<Bootstrapper>,
    ) -> Self {
        Self {
            store,
            supervisor,
            backend,
            bootstrap,
        }
    }
}
