//! In-memory storage backend.
//!
//! Thread-safe reference implementation of [`OrgUnitStore`], intended for
//! embedded usage and tests. It understands the default column names from
//! [`crate::scheme`].

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use tracing::debug;

use crate::entity::OrgUnitId;
use crate::scheme::{
    FilterColumn, COLUMN_ATTRIBUTE_VALUES, COLUMN_CODE, COLUMN_ID, COLUMN_NAME, COLUMN_UID,
};
use crate::storage::traits::{OrgUnitQuery, OrgUnitRow, OrgUnitStore, RowStream, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn check_filter(filter: &FilterColumn) -> Result<(), StorageError> {
    let known = match filter {
        FilterColumn::Column(column) => {
            [COLUMN_ID, COLUMN_UID, COLUMN_CODE, COLUMN_NAME].contains(&column.as_str())
        }
        FilterColumn::Attribute { column, .. } => column == COLUMN_ATTRIBUTE_VALUES,
    };
    if known {
        Ok(())
    } else {
        Err(StorageError::UnknownColumn(filter.column().to_string()))
    }
}

fn filter_value<'a>(row: &'a OrgUnitRow, filter: &FilterColumn) -> Option<Cow<'a, str>> {
    match filter {
        FilterColumn::Column(column) => match column.as_str() {
            COLUMN_ID => Some(Cow::Owned(row.id.to_string())),
            COLUMN_UID => Some(Cow::Borrowed(row.uid.as_str())),
            COLUMN_CODE => row.code.as_deref().map(Cow::Borrowed),
            COLUMN_NAME => row.name.as_deref().map(Cow::Borrowed),
            _ => None,
        },
        FilterColumn::Attribute { attribute, .. } => row
            .attribute_values
            .get(attribute)
            .map(|v| Cow::Borrowed(v.as_str())),
    }
}

/// Mirrors the SQL projection: attribute values only for the filtered attribute.
fn project(row: &OrgUnitRow, filter: &FilterColumn) -> OrgUnitRow {
    let attribute_values = match filter {
        FilterColumn::Attribute { attribute, .. } => row
            .attribute_values
            .get_key_value(attribute)
            .map(|(k, v)| (k.clone(), v.clone()))
            .into_iter()
            .collect(),
        FilterColumn::Column(_) => BTreeMap::new(),
    };
    OrgUnitRow {
        attribute_values,
        ..row.clone()
    }
}

#[derive(Debug, Default)]
struct OrgUnitState {
    by_id: BTreeMap<OrgUnitId, OrgUnitRow>,
    uids: HashSet<String>,
}

/// Thread-safe in-memory organisation unit store.
#[derive(Debug, Default)]
pub struct InMemoryOrgUnitStore {
    state: RwLock<OrgUnitState>,
    queries: AtomicUsize,
}

impl InMemoryOrgUnitStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit. Returns error if its id or uid already exists.
    pub fn insert(&self, row: OrgUnitRow) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("org_unit.insert"))?;
        if state.by_id.contains_key(&row.id) {
            return Err(StorageError::DuplicateKey(row.id.to_string()));
        }
        if !state.uids.insert(row.uid.clone()) {
            return Err(StorageError::DuplicateKey(row.uid));
        }
        state.by_id.insert(row.id, row);
        Ok(())
    }

    /// Number of stored units.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("org_unit.len"))?;
        Ok(state.by_id.len())
    }

    /// Returns true if the store holds no units.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Number of queries answered so far, including failed ones.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl FromIterator<OrgUnitRow> for InMemoryOrgUnitStore {
    /// Builds a store from rows; later duplicates of an id or uid are dropped.
    fn from_iter<I: IntoIterator<Item = OrgUnitRow>>(iter: I) -> Self {
        let mut state = OrgUnitState::default();
        for row in iter {
            if state.by_id.contains_key(&row.id) || !state.uids.insert(row.uid.clone()) {
                continue;
            }
            state.by_id.insert(row.id, row);
        }
        Self {
            state: RwLock::new(state),
            queries: AtomicUsize::new(0),
        }
    }
}

impl OrgUnitStore for InMemoryOrgUnitStore {
    fn query(&self, query: &OrgUnitQuery<'_>) -> Result<RowStream, StorageError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        check_filter(query.filter)?;

        let state = self.state.read().map_err(|_| lock_err("org_unit.query"))?;
        let rows: Vec<Result<OrgUnitRow, StorageError>> = state
            .by_id
            .values()
            .filter(|row| {
                filter_value(row, query.filter).is_some_and(|v| query.values.contains(&*v))
            })
            .map(|row| Ok(project(row, query.filter)))
            .collect();

        debug!(
            "In-memory org unit query on '{}' matched {} of {} values",
            query.filter.column(),
            rows.len(),
            query.values.len()
        );
        Ok(Box::new(rows.into_iter()))
    }
}
