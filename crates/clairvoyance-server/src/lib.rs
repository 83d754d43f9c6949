//! Clairvoyance host library
//!
//! Supervises the embedded PocketBase process, proxies `/pb` to it, bootstraps
//! its admin account and schema, and serves the ontology API. Backup and binary
//! install helpers back the admin CLI. Shared by the `clairvoyance-server` and
//! `clairvoyance` binaries.

pub mod backend;
pub mod backups;
pub mod bootstrap;
pub mod config;
pub mod download;
pub mod proxy;
pub mod retry;
pub mod supervisor;
pub mod web;

pub use backend::BackendClient;
pub use backups::{BackupError, BackupInfo};
pub use bootstrap::Bootstrapper;
pub use config::{AppConfig, ConfigError};
pub use supervisor::{ProcessStatus, Supervisor, SupervisorConfig, SupervisorError};
