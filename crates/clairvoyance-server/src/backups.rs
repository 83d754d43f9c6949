//! Backend backups
//!
//! Lists, creates and restores PocketBase backups through its admin API. Every
//! call needs an admin token, see [`crate::Bootstrapper::authenticate`].

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::backend::BackendClient;

/// Backup endpoint exposed by PocketBase
pub const BACKUPS_PATH: &str = "/api/backups";

/// Prefix of generated backup names
pub const BACKUP_NAME_PREFIX: &str = "auto-backup-";

/// Backup error
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup {action} rejected with status {status}")]
    Rejected {
        action: &'static str,
        status: StatusCode,
    },
    #[error("invalid backup name '{0}'")]
    InvalidName(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// One stored backup archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Archive file name, also used as the restore key
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BackupListing {
    Bare(Vec<BackupInfo>),
    Paged { items: Vec<BackupInfo> },
}

impl BackupListing {
    fn into_items(self) -> Vec<BackupInfo> {
        match self {
            BackupListing::Bare(items) | BackupListing::Paged { items } => items,
        }
    }
}

/// Name for a backup taken at `at`
pub fn backup_name(at: DateTime<Utc>) -> String {
    format!("{}{}.zip", BACKUP_NAME_PREFIX, at.timestamp_millis())
}

/// Whether `name` is an archive name the backend accepts and that is safe in
/// a URL path
pub fn is_valid_backup_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".zip") else {
        return false;
    };
    !stem.is_empty()
        && !stem.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'))
}

fn checked(name: &str) -> Result<&str, BackupError> {
    if is_valid_backup_name(name) {
        Ok(name)
    } else {
        Err(BackupError::InvalidName(name.to_string()))
    }
}

impl BackendClient {
    /// Stored backups, newest first
    pub async fn list_backups(&self, token: &str) -> Result<Vec<BackupInfo>, BackupError> {
        let response = self
            .http()
            .get(self.url(BACKUPS_PATH))
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackupError::Rejected {
                action: "listing",
                status,
            });
        }

        let mut backups = response.json::<BackupListing>().await?.into_items();
        backups.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(backups)
    }

    /// Ask the backend to write a new backup; returns the name used
    pub async fn create_backup(
        &self,
        token: &str,
        name: Option<&str>,
    ) -> Result<String, BackupError> {
        let name = match name {
            Some(name) => checked(name)?.to_string(),
            None => backup_name(Utc::now()),
        };

        let status = self
            .http()
            .post(self.url(BACKUPS_PATH))
            .header(reqwest::header::AUTHORIZATION, token)
            .json(&json!({ "name": name }))
            .send()
            .await?
            .status();

        if !status.is_success() {
            return Err(BackupError::Rejected {
                action: "creation",
                status,
            });
        }

        info!(backup = %name, "Backup created");
        Ok(name)
    }

    /// Restore the backend from the backup stored under `key`
    ///
    /// PocketBase restarts itself once the restore is applied.
    pub async fn restore_backup(&self, token: &str, key: &str) -> Result<(), BackupError> {
        let key = checked(key)?;

        let status = self
            .http()
            .post(self.url(&format!("{}/{}/restore", BACKUPS_PATH, key)))
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await?
            .status();

        if !status.is_success() {
            return Err(BackupError::Rejected {
                action: "restore",
                status,
            });
        }

        info!(backup = %key, "Backup restore requested");
        Ok(())
    }
}
