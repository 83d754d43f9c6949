//! Front-end static file serving.
//!
//! Serves a built single-page app from disk. Paths that match no file get
//! `index.html` so client-side routing keeps working on reload.

use std::path::Path;

use tower_http::services::{ServeDir, ServeFile};

/// Service for the static directory with the SPA fallback
pub fn spa_service(dir: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(dir)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(dir.join("index.html")))
}
