//! Backend bootstrap
//!
//! Brings a fresh PocketBase instance to a usable baseline: an admin account,
//! the collections the app depends on and a default settings record. Every
//! step is idempotent so the sequence is safe to replay against an instance
//! that was already set up.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{OnceCell, watch};
use tracing::{debug, error, info, warn};

use clairvoyance_core::InitState;

use crate::backend::BackendClient;
use crate::config::AdminCredentials;
use crate::retry::{RetryPolicy, retry};

/// Health polling used before the first step
pub const HEALTH_POLICY: RetryPolicy = RetryPolicy::fixed(5, Duration::from_secs(1));

/// Collection holding per-instance settings
pub const SETTINGS_COLLECTION: &str = "instance_settings";

/// A collection the app expects to exist
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub name: &'static str,
    /// `(field name, field type)` pairs
    pub fields: &'static [(&'static str, &'static str)],
}

impl CollectionSpec {
    /// Creation payload in the backend's collection format
    pub fn to_payload(&self) -> Value {
        let schema: Vec<Value> = self
            .fields
            .iter()
            .map(|(name, kind)| {
                json!({
                    "name": name,
                    "type": kind,
                    "required": false,
                    "options": {},
                })
            })
            .collect();

        json!({
            "name": self.name,
            "type": "base",
            "schema": schema,
        })
    }
}

pub const REQUIRED_COLLECTIONS: &[CollectionSpec] = &[CollectionSpec {
    name: SETTINGS_COLLECTION,
    fields: &[
        ("instance_name", "text"),
        ("instance_url", "text"),
        ("theme", "json"),
    ],
}];

/// Why a bootstrap run stopped
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("admin authentication rejected with status {0}")]
    AuthRejected(StatusCode),
    #[error("admin authentication response carried no token")]
    MissingToken,
    #[error("collection '{name}' check failed with status {status}")]
    Collection { name: String, status: StatusCode },
    #[error("default settings record rejected with status {0}")]
    SettingsRecord(StatusCode),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Result of the admin creation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOutcome {
    Created,
    AlreadyExists,
    /// Unexpected answer; the sequence continues and authentication decides
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordList {
    #[serde(default)]
    total_items: u64,
}

/// Runs the bootstrap sequence and tracks its lifecycle
pub struct Bootstrapper {
    client: BackendClient,
    admin: AdminCredentials,
    health_policy: RetryPolicy,
    state: watch::Sender<InitState>,
    once: OnceCell<bool>,
}

impl Bootstrapper {
    pub fn new(client: BackendClient, admin: AdminCredentials) -> Self {
        let (state, _) = watch::channel(InitState::Uninitialized);
        Self {
            client,
            admin,
            health_policy: HEALTH_POLICY,
            state,
            once: OnceCell::new(),
        }
    }

    pub fn with_health_policy(mut self, policy: RetryPolicy) -> Self {
        self.health_policy = policy;
        self
    }

    pub fn state(&self) -> InitState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<InitState> {
        self.state.subscribe()
    }

    /// Run the sequence once per process; later callers get the first outcome
    pub async fn ensure_initialized(&self) -> bool {
        *self.once.get_or_init(|| self.initialize()).await
    }

    /// Run the full sequence; failures are logged and reported as `false`
    pub async fn initialize(&self) -> bool {
        self.state.send_replace(InitState::Initializing);
        info!(backend = %self.client.base_url(), "Bootstrapping backend");

        match self.run().await {
            Ok(()) => {
                info!("Backend bootstrap complete");
                self.state.send_replace(InitState::Initialized);
                true
            }
            Err(e) => {
                error!("Backend bootstrap failed: {}", e);
                self.state.send_replace(InitState::InitFailed);
                false
            }
        }
    }

    async fn run(&self) -> Result<(), BootstrapError> {
        self.wait_for_health().await?;

        match self.create_admin().await {
            AdminOutcome::Created => info!(email = %self.admin.email, "Admin account created"),
            AdminOutcome::AlreadyExists => debug!("Admin account already exists"),
            AdminOutcome::Unknown => {}
        }

        let token = self.authenticate().await?;

        for collection in REQUIRED_COLLECTIONS {
            self.ensure_collection(&token, collection).await?;
        }

        self.ensure_settings_record(&token).await
    }

    async fn wait_for_health(&self) -> Result<(), BootstrapError> {
        retry(
            &self.health_policy,
            |attempt| {
                debug!(attempt, "Probing backend health");
                self.client.health()
            },
            |status| status.is_success(),
        )
        .await
        .map(|_| ())
        .map_err(|exhausted| BootstrapError::Unavailable(exhausted.to_string()))
    }

    /// Create the admin account; any rejection that means "exists" is fine
    pub async fn create_admin(&self) -> AdminOutcome {
        let body = json!({
            "email": self.admin.email,
            "password": self.admin.password,
            "passwordConfirm": self.admin.password,
        });

        let response = match self
            .client
            .http()
            .post(self.client.url("/api/admins"))
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Admin creation request failed: {}", e);
                return AdminOutcome::Unknown;
            }
        };

        let status = response.status();
        if status.is_success() {
            AdminOutcome::Created
        } else if matches!(
            status,
            StatusCode::BAD_REQUEST
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::CONFLICT
        ) {
            AdminOutcome::AlreadyExists
        } else {
            warn!(status = status.as_u16(), "Unexpected answer to admin creation");
            AdminOutcome::Unknown
        }
    }

    /// Authenticate as the admin and return the session token
    pub async fn authenticate(&self) -> Result<String, BootstrapError> {
        let response = self
            .client
            .http()
            .post(self.client.url("/api/admins/auth-with-password"))
            .json(&json!({
                "identity": self.admin.email,
                "password": self.admin.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::AuthRejected(status));
        }

        let auth: AuthResponse = response.json().await?;
        auth.token
            .filter(|t| !t.is_empty())
            .ok_or(BootstrapError::MissingToken)
    }

    async fn ensure_collection(
        &self,
        token: &str,
        collection: &CollectionSpec,
    ) -> Result<(), BootstrapError> {
        let http = self.client.http();
        let status = http
            .get(self.client.url(&format!("/api/collections/{}", collection.name)))
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await?
            .status();

        if status.is_success() {
            debug!(collection = collection.name, "Collection present");
            return Ok(());
        }
        if status != StatusCode::NOT_FOUND {
            return Err(BootstrapError::Collection {
                name: collection.name.to_string(),
                status,
            });
        }

        let status = http
            .post(self.client.url("/api/collections"))
            .header(reqwest::header::AUTHORIZATION, token)
            .json(&collection.to_payload())
            .send()
            .await?
            .status();

        if !status.is_success() {
            return Err(BootstrapError::Collection {
                name: collection.name.to_string(),
                status,
            });
        }

        info!(collection = collection.name, "Collection created");
        Ok(())
    }

    async fn ensure_settings_record(&self, token: &str) -> Result<(), BootstrapError> {
        let http = self.client.http();
        let records_url = self
            .client
            .url(&format!("/api/collections/{}/records", SETTINGS_COLLECTION));

        let response = http
            .get(format!("{}?perPage=1", records_url))
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::SettingsRecord(status));
        }

        let list: RecordList = response.json().await?;
        if list.total_items > 0 {
            return Ok(());
        }

        let status = http
            .post(records_url)
            .header(reqwest::header::AUTHORIZATION, token)
            .json(&json!({
                "instance_name": "Clairvoyance",
                "instance_url": "",
                "theme": {},
            }))
            .send()
            .await?
            .status();

        if !status.is_success() {
            return Err(BootstrapError::SettingsRecord(status));
        }

        info!("Default instance settings created");
        Ok(())
    }
}
