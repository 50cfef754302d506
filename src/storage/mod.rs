//! Storage backends for organisation unit lookups.
//!
//! The resolver talks to a store through [`OrgUnitStore`]. An in-memory
//! backend is always available; a SQLite backend is built with the `sqlite`
//! feature.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use memory::InMemoryOrgUnitStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteOrgUnitStore;
pub use traits::{OrgUnitQuery, OrgUnitRow, OrgUnitStore, RowStream, StorageError};
