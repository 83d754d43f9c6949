//! Client handle for the embedded backend

use std::time::Duration;

use reqwest::StatusCode;

/// Health endpoint exposed by PocketBase
pub const HEALTH_PATH: &str = "/api/health";

/// HTTP client bound to the backend's base URL
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Build a client for `base_url` (trailing slashes are dropped)
    ///
    /// Only connecting is bounded; proxied uploads and downloads may take as
    /// long as they need.
    pub fn new(base_url: &str) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for a path (with optional query) on the backend
    pub fn url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url, path_and_query)
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    /// One health probe; returns the status the backend answered with
    pub async fn health(&self) -> reqwest::Result<StatusCode> {
        let resp = self
            .http
            .get(self.url(HEALTH_PATH))
            .timeout(Duration::from_secs(2))
            .send()
            .await?;
        Ok(resp.status())
    }
}
