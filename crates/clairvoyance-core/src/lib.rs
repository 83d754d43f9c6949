//! # Clairvoyance Core
//!
//! Storage and state types shared by the Clairvoyance host and its admin CLI.
//!
//! - **Ontology store**: superclasses, subclasses and rules persisted in an
//!   embedded SQL file and replaced wholesale, inside one transaction, on every
//!   submission.
//! - **Lifecycle states**: the explicit state machines the host reports for the
//!   supervised backend process and for the one-time backend bootstrap.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clairvoyance_core::{Ontology, OntologyStore};
//!
//! let store = OntologyStore::open("data/ontology.db")?;
//! let ontology: Ontology = serde_json::from_str(r#"{
//!     "superclasses": [{ "name": "Animal", "subclasses": [{ "name": "Dog" }] }],
//!     "rules": ["R1"]
//! }"#)?;
//! let summary = store.replace(&ontology)?;
//! assert_eq!(summary.superclasses, 1);
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod lifecycle;
pub mod ontology;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use lifecycle::{InitState, ProcessState};
pub use ontology::{Ontology, OntologyCounts, ReplaceSummary, Subclass, Superclass};
pub use storage::{OntologyStore, Result, StorageError};
