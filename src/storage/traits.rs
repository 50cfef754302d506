//! Abstract storage contract for organisation unit lookups.
//!
//! The resolver only ever reads. A backend answers one filtered query per
//! resolve call; connection handling, timeouts and cancellation belong to the
//! backend, not to the resolver.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::entity::OrgUnitId;
use crate::scheme::FilterColumn;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The store cannot evaluate the requested filter column.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// A returned row could not be decoded.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// SQLite error.
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Raw row projected by the batch query.
///
/// `attribute_values` holds only the attribute the query filtered on, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgUnitRow {
    pub id: OrgUnitId,
    pub uid: String,
    pub code: Option<String>,
    pub name: Option<String>,
    /// Materialized path, e.g. `/1/2/3`.
    pub path: String,
    pub hierarchy_level: u32,
    pub attribute_values: BTreeMap<String, String>,
}

impl OrgUnitRow {
    #[must_use]
    pub fn new(
        id: OrgUnitId,
        uid: impl Into<String>,
        path: impl Into<String>,
        hierarchy_level: u32,
    ) -> Self {
        Self {
            id,
            uid: uid.into(),
            code: None,
            name: None,
            path: path.into(),
            hierarchy_level,
            attribute_values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.attribute_values.insert(attribute.into(), value.into());
        self
    }
}

/// One batch lookup: every unit whose filter column is in `values`.
#[derive(Debug, Clone, Copy)]
pub struct OrgUnitQuery<'a> {
    pub filter: &'a FilterColumn,
    pub values: &'a BTreeSet<String>,
}

/// Finite, single-use sequence of rows produced by one query.
pub type RowStream = Box<dyn Iterator<Item = Result<OrgUnitRow, StorageError>> + Send>;

/// Storage trait for organisation unit lookups.
///
/// # Contract
/// - `query` runs exactly one round trip with an IN-style predicate
/// - failures are returned as-is; implementations do not retry
/// - implementations must be safe for concurrent reads
pub trait OrgUnitStore: Send + Sync {
    /// Fetch every unit matching the query.
    fn query(&self, query: &OrgUnitQuery<'_>) -> Result<RowStream, StorageError>;
}
