//! SQLite Ontology Store
//!
//! One writer connection behind a mutex. Every replace runs in a single
//! transaction, so readers see either the previous ontology or the new one.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::ontology::{
    rule_id, subclass_id, superclass_id, Ontology, OntologyCounts, ReplaceSummary, Subclass,
    Superclass,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Submitted ontology is malformed
    #[error("Invalid ontology: {0}")]
    Invalid(String),
    /// Invalid timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// STORE
// ============================================================================

/// Revision log entries kept after each replace
pub const REVISION_HISTORY: usize = 20;

/// Ontology store backed by a single SQLite file
///
/// All methods take `&self`, so the host shares it as `Arc<OntologyStore>`.
pub struct OntologyStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl OntologyStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Ok(())
    }

    /// Open (creating if needed) the store at `path` and apply migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        Self::configure_connection(&conn)?;
        let applied = super::migrations::apply_migrations(&conn)?;
        if applied > 0 {
            tracing::info!(path = %path.display(), applied, "Ontology store migrated");
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        super::migrations::apply_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Backing file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current schema version
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.lock()?;
        Ok(super::migrations::get_current_version(&conn)?)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Init("Connection lock poisoned".into()))
    }

    /// Replace the whole ontology with `ontology`
    ///
    /// Deletes every superclass, subclass and rule, then inserts the new set
    /// with positional ids. Any failure rolls the transaction back and the
    /// previous ontology stays in place.
    pub fn replace(&self, ontology: &Ontology) -> Result<ReplaceSummary> {
        validate(ontology)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // Subclasses first: they hold the foreign key
        tx.execute("DELETE FROM subclasses", [])?;
        tx.execute("DELETE FROM superclasses", [])?;
        tx.execute("DELETE FROM ontology_rules", [])?;

        let subclasses = insert_classes(&tx, &ontology.superclasses)?;

        for (idx, rule) in ontology.rules.iter().enumerate() {
            tx.execute(
                "INSERT INTO ontology_rules (id, rule_text) VALUES (?1, ?2)",
                params![rule_id(idx), rule],
            )?;
        }

        let replaced_at = Utc::now();
        tx.execute(
            "INSERT INTO ontology_revisions
                (replaced_at, superclass_count, subclass_count, rule_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                replaced_at.to_rfc3339(),
                ontology.superclasses.len() as i64,
                subclasses as i64,
                ontology.rules.len() as i64
            ],
        )?;
        tx.execute(
            "DELETE FROM ontology_revisions WHERE id NOT IN
                (SELECT id FROM ontology_revisions ORDER BY id DESC LIMIT ?1)",
            params![REVISION_HISTORY as i64],
        )?;

        tx.commit()?;

        Ok(ReplaceSummary {
            superclasses: ontology.superclasses.len(),
            subclasses,
            rules: ontology.rules.len(),
            replaced_at,
        })
    }

    /// Load the stored ontology in submission order
    pub fn load(&self) -> Result<Ontology> {
        let conn = self.lock()?;

        let mut superclasses: Vec<Superclass> = {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, attributes, relationships
                 FROM superclasses ORDER BY rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (id, name, description, attributes, relationships) = row?;
                out.push(Superclass {
                    id: Some(id),
                    name: name.unwrap_or_default(),
                    description,
                    attributes: decode_list(&attributes)?,
                    relationships: decode_list(&relationships)?,
                    subclasses: Vec::new(),
                });
            }
            out
        };

        {
            let mut stmt = conn.prepare(
                "SELECT id, superclass_id, name, description, attributes, relationships
                 FROM subclasses ORDER BY rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            for row in rows {
                let (id, parent, name, description, attributes, relationships) = row?;
                let subclass = Subclass {
                    id: Some(id),
                    name: name.unwrap_or_default(),
                    description,
                    attributes: decode_list(&attributes)?,
                    relationships: decode_list(&relationships)?,
                };

                match superclasses
                    .iter_mut()
                    .find(|s| s.id.as_deref() == parent.as_deref())
                {
                    Some(owner) => owner.subclasses.push(subclass),
                    None => tracing::warn!(
                        subclass = ?subclass.id,
                        "Skipping subclass without a stored superclass"
                    ),
                }
            }
        }

        let rules = {
            let mut stmt = conn.prepare("SELECT rule_text FROM ontology_rules ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?.unwrap_or_default());
            }
            out
        };

        Ok(Ontology {
            superclasses,
            rules,
        })
    }

    /// Row counts of the three ontology tables
    pub fn counts(&self) -> Result<OntologyCounts> {
        let conn = self.lock()?;

        let superclasses: i64 =
            conn.query_row("SELECT COUNT(*) FROM superclasses", [], |row| row.get(0))?;
        let subclasses: i64 =
            conn.query_row("SELECT COUNT(*) FROM subclasses", [], |row| row.get(0))?;
        let rules: i64 =
            conn.query_row("SELECT COUNT(*) FROM ontology_rules", [], |row| row.get(0))?;

        Ok(OntologyCounts {
            superclasses,
            subclasses,
            rules,
        })
    }

    /// When the ontology was last replaced, if ever
    pub fn last_replaced(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;

        let raw: Option<String> = conn
            .query_row(
                "SELECT replaced_at FROM ontology_revisions ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|ts| {
            DateTime::parse_from_rfc3339(&ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", ts, e)))
        })
        .transpose()
    }
}

fn validate(ontology: &Ontology) -> Result<()> {
    for (idx, superclass) in ontology.superclasses.iter().enumerate() {
        if superclass.name.trim().is_empty() {
            return Err(StorageError::Invalid(format!(
                "superclass {} has an empty name",
                idx
            )));
        }
        for (sub_idx, subclass) in superclass.subclasses.iter().enumerate() {
            if subclass.name.trim().is_empty() {
                return Err(StorageError::Invalid(format!(
                    "subclass {} of '{}' has an empty name",
                    sub_idx, superclass.name
                )));
            }
        }
    }
    Ok(())
}

/// Insert superclasses and their subclasses, returning the subclass count
fn insert_classes(tx: &Transaction<'_>, superclasses: &[Superclass]) -> Result<usize> {
    let mut subclasses = 0;

    for (idx, superclass) in superclasses.iter().enumerate() {
        let parent_id = superclass_id(idx);
        tx.execute(
            "INSERT INTO superclasses (id, name, description, attributes, relationships)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                parent_id,
                superclass.name,
                superclass.description,
                serde_json::to_string(&superclass.attributes)?,
                serde_json::to_string(&superclass.relationships)?
            ],
        )?;

        for (sub_idx, subclass) in superclass.subclasses.iter().enumerate() {
            tx.execute(
                "INSERT INTO subclasses
                    (id, superclass_id, name, description, attributes, relationships)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    subclass_id(idx, sub_idx),
                    parent_id,
                    subclass.name,
                    subclass.description,
                    serde_json::to_string(&subclass.attributes)?,
                    serde_json::to_string(&subclass.relationships)?
                ],
            )?;
            subclasses += 1;
        }
    }

    Ok(subclasses)
}

fn decode_list(raw: &str) -> Result<Vec<Value>> {
    Ok(serde_json::from_str(raw)?)
}
