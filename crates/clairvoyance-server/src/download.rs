//! Backend binary installer
//!
//! Fetches the PocketBase release archive for this platform and installs the
//! executable at the configured path.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use tracing::info;

/// Release installed when no version is requested
pub const DEFAULT_POCKETBASE_VERSION: &str = "0.19.4";

/// Where PocketBase publishes its release archives
pub const RELEASES_URL: &str = "https://github.com/pocketbase/pocketbase/releases/download";

/// Executable inside the release archive
const ARCHIVE_ENTRY: &str = "pocketbase";

/// Download error
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("no PocketBase build for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },
    #[error("release download answered {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("release archive has no '{0}' entry")]
    MissingEntry(&'static str),
    #[error("invalid release archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Release target name for an `(os, arch)` pair as reported by `std::env::consts`
pub fn release_target(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("macos", "aarch64") => Some("darwin_arm64"),
        ("macos", "x86_64") => Some("darwin_amd64"),
        ("linux", "x86_64") => Some("linux_amd64"),
        ("linux", "aarch64") => Some("linux_arm64"),
        _ => None,
    }
}

/// Release target for the running host
pub fn current_target() -> Result<&'static str, DownloadError> {
    let (os, arch) = (std::env::consts::OS, std::env::consts::ARCH);
    release_target(os, arch).ok_or_else(|| DownloadError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    })
}

/// Archive URL for `version` (with or without a leading `v`) and `target`
pub fn release_url(base: &str, version: &str, target: &str) -> String {
    let version = version.trim().trim_start_matches('v');
    format!(
        "{}/v{}/pocketbase_{}_{}.zip",
        base.trim_end_matches('/'),
        version,
        version,
        target
    )
}

/// Download the archive at `url` and install its executable at `destination`
///
/// The destination is only replaced once the archive has been fully read and
/// the executable extracted. Returns the installed size in bytes.
pub async fn install_release(url: &str, destination: &Path) -> Result<u64, DownloadError> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    info!(url, "Downloading PocketBase");
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status,
        });
    }
    let archive = response.bytes().await?;

    let target = destination.to_path_buf();
    let installed =
        tokio::task::spawn_blocking(move || extract_executable(&archive, &target)).await??;

    info!(path = %destination.display(), bytes = installed, "PocketBase installed");
    Ok(installed)
}

fn write_error(path: &Path) -> impl FnOnce(io::Error) -> DownloadError {
    let path = path.to_path_buf();
    move |source| DownloadError::Write { path, source }
}

fn extract_executable(archive: &[u8], destination: &Path) -> Result<u64, DownloadError> {
    let mut zip = zip::ZipArchive::new(io::Cursor::new(archive))?;
    let mut entry = match zip.by_name(ARCHIVE_ENTRY) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(DownloadError::MissingEntry(ARCHIVE_ENTRY));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error(parent))?;
    }

    let staging = destination.with_extension("download");
    let mut file = std::fs::File::create(&staging).map_err(write_error(&staging))?;
    let written = io::copy(&mut entry, &mut file).map_err(write_error(&staging))?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755))
            .map_err(write_error(&staging))?;
    }

    std::fs::rename(&staging, destination).map_err(write_error(destination))?;
    Ok(written)
}
