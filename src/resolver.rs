//! Batch resolution of organisation units for import records.
//!
//! One call runs a linear pipeline:
//!
//! ```text
//! records ─► references ─(empty? return)─► reverse index
//!                                               │
//!   store.query(IN refs) ─► rows ─► link_row ─► join ─► record id → unit
//! ```
//!
//! At most one store query is issued per call. Nothing is cached between
//! calls.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, error};

use crate::config::{LevelMismatchPolicy, ResolverConfig};
use crate::entity::OrgUnit;
use crate::error::{ResolveError, ResolveResult};
use crate::hierarchy::link_row;
use crate::index::{extract_references, ReverseIndex};
use crate::record::ImportRecord;
use crate::scheme::{IdScheme, SchemeColumns};
use crate::storage::{OrgUnitQuery, OrgUnitStore, RowStream};

/// Mapping from record identifier to its resolved unit.
pub type OrgUnitMap = HashMap<String, Arc<OrgUnit>>;

/// Outcome of one resolve call.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Record identifier → resolved unit. Records sharing a reference share the `Arc`.
    pub mapping: OrgUnitMap,
    /// References cited by records but not found in the store.
    pub unmatched: BTreeSet<String>,
    /// Whether the store was queried (false on the empty fast path).
    pub store_queried: bool,
}

impl Resolution {
    /// Consumes the resolution and returns the mapping only.
    #[must_use]
    pub fn into_mapping(self) -> OrgUnitMap {
        self.mapping
    }
}

/// Resolves organisation units for import batches against one store.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use orgunit_resolver::{IdScheme, ImportRecord, InMemoryOrgUnitStore, OrgUnitResolver, OrgUnitRow};
///
/// let store = InMemoryOrgUnitStore::new();
/// store.insert(OrgUnitRow::new(5, "OU1", "/5", 1)).unwrap();
///
/// let resolver = OrgUnitResolver::new(Arc::new(store));
/// let records = vec![
///     ImportRecord::new("E1", Some("OU1")),
///     ImportRecord::new("E2", Some("OU1")),
///     ImportRecord::new("E3", None),
/// ];
/// let mapping = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap();
/// assert_eq!(mapping.len(), 2);
/// assert!(!mapping.contains_key("E3"));
/// ```
#[derive(Clone)]
pub struct OrgUnitResolver {
    store: Arc<dyn OrgUnitStore>,
    config: ResolverConfig,
}

impl std::fmt::Debug for OrgUnitResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgUnitResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrgUnitResolver {
    /// Creates a resolver with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn OrgUnitStore>) -> Self {
        Self {
            store,
            config: ResolverConfig::default(),
        }
    }

    /// Creates a resolver with an explicit, validated configuration.
    ///
    /// # Errors
    /// Returns a configuration error if a configured column is unusable.
    pub fn with_config(store: Arc<dyn OrgUnitStore>, config: ResolverConfig) -> ResolveResult<Self> {
        Ok(Self {
            store,
            config: config.validate()?,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves every record's organisation unit reference.
    ///
    /// Absent or reference-free input returns an empty mapping without
    /// touching the store. References with no matching unit are omitted.
    ///
    /// # Errors
    /// - `Config`: the scheme has no usable column
    /// - `Storage`: the query failed; passed through unchanged
    /// - `Hierarchy`: a path could not be interpreted
    /// - `Unrecoverable`: a unit lacks the value the scheme compares; the batch is aborted
    pub fn resolve(
        &self,
        scheme: &IdScheme,
        records: Option<&[ImportRecord]>,
    ) -> ResolveResult<OrgUnitMap> {
        self.resolve_detailed(scheme, records)
            .map(Resolution::into_mapping)
    }

    /// Like [`resolve`](Self::resolve), also reporting unmatched references.
    pub fn resolve_detailed(
        &self,
        scheme: &IdScheme,
        records: Option<&[ImportRecord]>,
    ) -> ResolveResult<Resolution> {
        run(
            self.store.as_ref(),
            &self.config.scheme_columns,
            self.config.level_mismatch,
            scheme,
            records,
        )
    }
}

/// One-shot resolution without keeping a resolver around.
///
/// Uses the default [`LevelMismatchPolicy`].
pub fn resolve_org_units(
    store: &dyn OrgUnitStore,
    columns: &SchemeColumns,
    scheme: &IdScheme,
    records: Option<&[ImportRecord]>,
) -> ResolveResult<OrgUnitMap> {
    run(store, columns, LevelMismatchPolicy::default(), scheme, records)
        .map(Resolution::into_mapping)
}

fn run(
    store: &dyn OrgUnitStore,
    columns: &SchemeColumns,
    policy: LevelMismatchPolicy,
    scheme: &IdScheme,
    records: Option<&[ImportRecord]>,
) -> ResolveResult<Resolution> {
    let Some(records) = records else {
        debug!("No records to resolve organisation units for");
        return Ok(Resolution::default());
    };

    let references = extract_references(records);
    if references.is_empty() {
        debug!("{} records carry no organisation unit reference", records.len());
        return Ok(Resolution::default());
    }

    let filter = columns.filter_column(scheme)?;
    let index = ReverseIndex::build(records);

    debug!(
        "Resolving {} organisation unit references for {} records by {}",
        references.len(),
        records.len(),
        scheme
    );
    let rows = store.query(&OrgUnitQuery {
        filter: &filter,
        values: &references,
    })?;

    let (mapping, matched) = assemble(rows, &index, scheme, policy)?;
    let unmatched: BTreeSet<String> = references
        .into_iter()
        .filter(|r| !matched.contains(r.as_str()))
        .collect();

    if !unmatched.is_empty() {
        debug!(
            "{} organisation unit references not found by {}: {:?}",
            unmatched.len(),
            scheme,
            unmatched
        );
    }

    Ok(Resolution {
        mapping,
        unmatched,
        store_queried: true,
    })
}

/// Joins streamed rows against the reverse index.
///
/// Returns the mapping and the set of references that found a unit. Any
/// failure aborts the join; no partial mapping escapes.
fn assemble(
    rows: RowStream,
    index: &ReverseIndex,
    scheme: &IdScheme,
    policy: LevelMismatchPolicy,
) -> ResolveResult<(OrgUnitMap, BTreeSet<String>)> {
    let mut mapping = OrgUnitMap::new();
    let mut matched = BTreeSet::new();
    let mut row_count = 0usize;

    for row in rows {
        let row = row?;
        row_count += 1;
        let entity_id = row.id;
        let unit = link_row(row, policy)
            .map_err(|source| ResolveError::Hierarchy { entity_id, source })?;

        let key = match scheme.entity_value(&unit) {
            Ok(key) => key.into_owned(),
            Err(e) => {
                error!("Aborting organisation unit resolution: {}", e);
                return Err(e.into());
            }
        };

        if !index.contains(&key) {
            debug!("Organisation unit {} ({}) matched no record", unit.id, key);
            continue;
        }

        let unit = Arc::new(unit);
        for record_id in index.records_for(&key) {
            mapping.insert(record_id.to_string(), Arc::clone(&unit));
        }
        matched.insert(key);
    }

    debug!(
        "Resolved {} records from {} organisation unit rows",
        mapping.len(),
        row_count
    );
    Ok((mapping, matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryOrgUnitStore, OrgUnitRow};

    fn store() -> Arc<InMemoryOrgUnitStore> {
        let store: InMemoryOrgUnitStore = [
            OrgUnitRow::new(1, "ImspTQPwCqd", "/1", 1).with_code("OU_525"),
            OrgUnitRow::new(2, "O6uvpzGd5pu", "/1/2", 2).with_code("OU_264"),
            OrgUnitRow::new(3, "DiszpKrYNg8", "/1/2/3", 3),
        ]
        .into_iter()
        .collect();
        Arc::new(store)
    }

    #[test]
    fn test_absent_records_skip_store() {
        let store = store();
        let resolver = OrgUnitResolver::new(store.clone());
        let resolution = resolver.resolve_detailed(&IdScheme::Uid, None).unwrap();
        assert!(resolution.mapping.is_empty());
        assert!(!resolution.store_queried);
        assert_eq!(store.query_count(), 0);
    }

    #[test]
    fn test_unmatched_references_are_reported() {
        let store = store();
        let resolver = OrgUnitResolver::new(store.clone());
        let records = vec![
            ImportRecord::new("E1", Some("O6uvpzGd5pu")),
            ImportRecord::new("E2", Some("nope")),
        ];
        let resolution = resolver
            .resolve_detailed(&IdScheme::Uid, Some(&records))
            .unwrap();
        assert_eq!(resolution.mapping.len(), 1);
        assert_eq!(resolution.mapping["E1"].parent_id(), Some(1));
        assert_eq!(
            resolution.unmatched.into_iter().collect::<Vec<_>>(),
            vec!["nope".to_string()]
        );
        assert!(resolution.store_queried);
    }

    #[test]
    fn test_reject_policy_surfaces_hierarchy_error() {
        let store = InMemoryOrgUnitStore::new();
        store
            .insert(OrgUnitRow::new(3, "DiszpKrYNg8", "/1/2/3", 2))
            .unwrap();
        let config = ResolverConfig {
            level_mismatch: LevelMismatchPolicy::Reject,
            ..ResolverConfig::default()
        };
        let resolver = OrgUnitResolver::with_config(Arc::new(store), config).unwrap();
        let records = vec![ImportRecord::new("E1", Some("DiszpKrYNg8"))];
        let err = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap_err();
        assert!(matches!(err, ResolveError::Hierarchy { entity_id: 3, .. }));
    }

    #[test]
    fn test_unmapped_scheme_is_config_error_before_query() {
        let store = store();
        let columns = SchemeColumns::default().without(crate::scheme::SchemeKind::Code);
        let records = vec![ImportRecord::new("E1", Some("OU_525"))];
        let err = resolve_org_units(&*store, &columns, &IdScheme::Code, Some(&records))
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(store.query_count(), 0);
    }

    #[test]
    fn test_with_config_rejects_invalid_columns() {
        let config = ResolverConfig {
            scheme_columns: SchemeColumns::default()
                .with_column(crate::scheme::SchemeKind::Uid, "uid;--"),
            ..ResolverConfig::default()
        };
        assert!(OrgUnitResolver::with_config(store(), config).is_err());
    }
}
