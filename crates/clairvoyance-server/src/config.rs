//! Host configuration
//!
//! Everything is read once from the environment at boot. `from_lookup` takes
//! the variable source as a closure so tests never touch the process env.

use std::path::PathBuf;
use std::time::Duration;

use crate::supervisor::SupervisorConfig;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@clairvoyance.local";
pub const DEFAULT_ADMIN_PASSWORD: &str = "securepassword123";

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Selects executable path and bind address defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => RunMode::Production,
            _ => RunMode::Development,
        }
    }

    fn default_executable(&self) -> PathBuf {
        match self {
            RunMode::Development => PathBuf::from("src/lib/pocketbase/pocketbase"),
            RunMode::Production => PathBuf::from("pocketbase/pocketbase"),
        }
    }

    fn default_bind(&self) -> &'static str {
        match self {
            RunMode::Development => "127.0.0.1:8090",
            RunMode::Production => "0.0.0.0:8090",
        }
    }
}

/// Admin credential used by the bootstrap
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

impl Default for AdminCredentials {
    fn default() -> Self {
        Self {
            email: DEFAULT_ADMIN_EMAIL.to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Embedded backend settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub executable: PathBuf,
    pub bind: String,
    pub data_dir: PathBuf,
    /// Where the host reaches the backend (proxy target and bootstrap client)
    pub base_url: String,
    /// Spawn and supervise the backend; false when it is managed elsewhere
    pub spawn: bool,
    pub ready_timeout: Duration,
}

/// Full host configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RunMode,
    pub host: String,
    pub port: u16,
    pub backend: BackendConfig,
    pub admin: AdminCredentials,
    /// Add permissive CORS headers to proxied responses
    pub proxy_cors: bool,
    pub ontology_db: PathBuf,
    pub static_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = get("CLAIRVOYANCE_ENV")
            .map(|v| RunMode::parse(&v))
            .unwrap_or(RunMode::Development);

        let port = match get("CLAIRVOYANCE_PORT") {
            Some(raw) => parse_port("CLAIRVOYANCE_PORT", &raw)?,
            None => DEFAULT_PORT,
        };

        let bind = get("POCKETBASE_BIND").unwrap_or_else(|| mode.default_bind().to_string());
        let base_url = match get("POCKETBASE_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => local_url_for_bind(&bind)?,
        };

        let ready_timeout = match get("POCKETBASE_READY_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue {
                    var: "POCKETBASE_READY_TIMEOUT_SECS",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?),
            None => Duration::from_secs(10),
        };

        let backend = BackendConfig {
            executable: get("POCKETBASE_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| mode.default_executable()),
            bind,
            data_dir: get("POCKETBASE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("pb_data")),
            base_url,
            spawn: match get("POCKETBASE_SPAWN") {
                Some(raw) => parse_bool("POCKETBASE_SPAWN", &raw)?,
                None => true,
            },
            ready_timeout,
        };

        let admin = AdminCredentials {
            email: get("POCKETBASE_ADMIN_EMAIL").unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
            password: get("POCKETBASE_ADMIN_PASSWORD")
                .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
        };

        Ok(Self {
            mode,
            host: get("CLAIRVOYANCE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            backend,
            admin,
            proxy_cors: match get("CLAIRVOYANCE_PROXY_CORS") {
                Some(raw) => parse_bool("CLAIRVOYANCE_PROXY_CORS", &raw)?,
                None => false,
            },
            ontology_db: get("ONTOLOGY_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/ontology.db")),
            static_dir: get("CLAIRVOYANCE_STATIC_DIR").map(PathBuf::from),
        })
    }

    /// Supervisor settings for the configured backend
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            executable: self.backend.executable.clone(),
            bind: self.backend.bind.clone(),
            data_dir: self.backend.data_dir.clone(),
            base_url: self.backend.base_url.clone(),
            ready_timeout: self.backend.ready_timeout,
            ..SupervisorConfig::default()
        }
    }
}

/// Loopback URL for a `host:port` bind address
///
/// Wildcard binds map to 127.0.0.1 since the host always runs beside the backend.
pub fn local_url_for_bind(bind: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        var: "POCKETBASE_BIND",
        value: bind.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = bind.rsplit_once(':').ok_or_else(|| invalid("expected host:port"))?;
    let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;

    let host = match host {
        "" | "0.0.0.0" | "[::]" | "::" => "127.0.0.1",
        other => other,
    };

    Ok(format!("http://{}:{}", host, port))
}

fn parse_port(var: &'static str, raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
