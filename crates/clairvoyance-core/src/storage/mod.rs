//! Storage Module
//!
//! SQLite-based ontology store with:
//! - Versioned schema migrations
//! - Transactional replace of the full ontology
//! - Revision history of submissions

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{OntologyStore, Result, StorageError, REVISION_HISTORY};
