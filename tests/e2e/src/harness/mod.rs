//! Test harness

mod host;

pub use db_manager::TestOntologyDb;
pub use host::TestHost;
