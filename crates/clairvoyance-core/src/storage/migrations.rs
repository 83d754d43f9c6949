//! Database Migrations
//!
//! Schema migration definitions for the ontology store.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial ontology schema",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Submission history and subclass lookup index",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
///
/// `attributes` and `relationships` hold JSON arrays as text.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS superclasses (
    id TEXT PRIMARY KEY,
    name TEXT,
    description TEXT,
    attributes TEXT NOT NULL DEFAULT '[]',
    relationships TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS subclasses (
    id TEXT PRIMARY KEY,
    superclass_id TEXT REFERENCES superclasses(id),
    name TEXT,
    description TEXT,
    attributes TEXT NOT NULL DEFAULT '[]',
    relationships TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS ontology_rules (
    id TEXT PRIMARY KEY,
    rule_text TEXT
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Submission history
const MIGRATION_V2_UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_subclasses_superclass ON subclasses(superclass_id);

CREATE TABLE IF NOT EXISTS ontology_revisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    replaced_at TEXT NOT NULL,
    superclass_count INTEGER NOT NULL,
    subclass_count INTEGER NOT NULL,
    rule_count INTEGER NOT NULL
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
