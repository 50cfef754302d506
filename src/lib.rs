//! # orgunit-resolver - Organisation unit resolution for batch imports
//!
//! Import records cite organisation units by some identifier scheme (uid,
//! code, name, internal id or an attribute value). This crate resolves all
//! references of a batch with a single store query and maps every record to
//! its unit, with the unit's ancestor chain rebuilt from its materialized path.
//!
//! ## Core Concepts
//!
//! - **IdScheme**: which unit property is compared against record references
//! - **SchemeColumns**: injected table from scheme to physical column
//! - **ReverseIndex**: reference → records that cited it
//! - **OrgUnit**: a resolved unit with its parent chain
//! - **OrgUnitStore**: the read-only backend answering one IN-query per batch
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use orgunit_resolver::{IdScheme, ImportRecord, InMemoryOrgUnitStore, OrgUnitResolver, OrgUnitRow};
//!
//! let store = InMemoryOrgUnitStore::new();
//! store.insert(OrgUnitRow::new(1, "ImspTQPwCqd", "/1", 1)).unwrap();
//! store.insert(OrgUnitRow::new(2, "O6uvpzGd5pu", "/1/2", 2).with_code("OU_264")).unwrap();
//!
//! let resolver = OrgUnitResolver::new(Arc::new(store));
//! let records = vec![ImportRecord::new("E1", Some("OU_264"))];
//!
//! let mapping = resolver.resolve(&IdScheme::Code, Some(&records)).unwrap();
//! assert_eq!(mapping["E1"].uid, "O6uvpzGd5pu");
//! assert_eq!(mapping["E1"].parent_id(), Some(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod entity;
pub mod error;
pub mod hierarchy;
pub mod index;
pub mod record;
pub mod resolver;
pub mod scheme;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use config::{ConfigError, LevelMismatchPolicy, ResolverConfig};
pub use entity::{OrgUnit, OrgUnitId, ParentRef};
pub use error::{ResolveError, ResolveResult, UnrecoverableError};
pub use hierarchy::{HierarchyError, MaterializedPath};
pub use index::{extract_references, ReverseIndex};
pub use record::ImportRecord;
pub use resolver::{resolve_org_units, OrgUnitMap, OrgUnitResolver, Resolution};
pub use scheme::{FilterColumn, IdScheme, SchemeColumns, SchemeKind};
pub use storage::{InMemoryOrgUnitStore, OrgUnitQuery, OrgUnitRow, OrgUnitStore, RowStream, StorageError};
#[cfg(feature = "sqlite")]
pub use storage::SqliteOrgUnitStore;
