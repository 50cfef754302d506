use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use orgunit_resolver::{
    FilterColumn, IdScheme, ImportRecord, InMemoryOrgUnitStore, OrgUnitQuery, OrgUnitResolver,
    OrgUnitRow, OrgUnitStore, ResolveError, RowStream, StorageError, UnrecoverableError,
};

/// Wraps the in-memory store and remembers every query it receives.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryOrgUnitStore,
    calls: Mutex<Vec<(FilterColumn, BTreeSet<String>)>>,
}

impl RecordingStore {
    fn with_rows(rows: Vec<OrgUnitRow>) -> Self {
        Self {
            inner: rows.into_iter().collect(),
            calls: Mutex::default(),
        }
    }

    fn calls(&self) -> Vec<(FilterColumn, BTreeSet<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl OrgUnitStore for RecordingStore {
    fn query(&self, query: &OrgUnitQuery<'_>) -> Result<RowStream, StorageError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.filter.clone(), query.values.clone()));
        self.inner.query(query)
    }
}

/// Returns the same rows whatever the filter, like a store with a broken mapping.
struct FixedRowsStore(Vec<OrgUnitRow>);

impl OrgUnitStore for FixedRowsStore {
    fn query(&self, _query: &OrgUnitQuery<'_>) -> Result<RowStream, StorageError> {
        let rows: Vec<Result<OrgUnitRow, StorageError>> = self.0.iter().cloned().map(Ok).collect();
        Ok(Box::new(rows.into_iter()))
    }
}

struct UnreachableStore;

impl OrgUnitStore for UnreachableStore {
    fn query(&self, _query: &OrgUnitQuery<'_>) -> Result<RowStream, StorageError> {
        Err(StorageError::ConnectionError("connection refused".to_string()))
    }
}

/// Fails halfway through the row stream.
struct TruncatedStore;

impl OrgUnitStore for TruncatedStore {
    fn query(&self, _query: &OrgUnitQuery<'_>) -> Result<RowStream, StorageError> {
        let rows = vec![
            Ok(OrgUnitRow::new(1, "ImspTQPwCqd", "/1", 1)),
            Err(StorageError::BackendError("cursor closed".to_string())),
        ];
        Ok(Box::new(rows.into_iter()))
    }
}

fn sierra_leone() -> Vec<OrgUnitRow> {
    vec![
        OrgUnitRow::new(1, "ImspTQPwCqd", "/1", 1)
            .with_code("OU_525")
            .with_name("Sierra Leone"),
        OrgUnitRow::new(2, "O6uvpzGd5pu", "/1/2", 2)
            .with_code("OU_264")
            .with_name("Bo")
            .with_attribute("n2xYlNbsfko", "SL-BO"),
        OrgUnitRow::new(3, "DiszpKrYNg8", "/1/2/3", 3)
            .with_code("OU_559")
            .with_name("Ngelehun CHC")
            .with_attribute("n2xYlNbsfko", "SL-NGE"),
    ]
}

fn values(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn resolve_documented_example() {
    let store = Arc::new(RecordingStore::with_rows(vec![OrgUnitRow::new(5, "OU1", "/5", 1)]));
    let resolver = OrgUnitResolver::new(store.clone());

    let records = vec![
        ImportRecord::new("E1", Some("OU1")),
        ImportRecord::new("E2", Some("OU1")),
        ImportRecord::new("E3", None),
    ];
    let mapping = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap();

    assert_eq!(mapping.len(), 2);
    assert_eq!(mapping["E1"].uid, "OU1");
    assert_eq!(mapping["E2"].uid, "OU1");
    assert!(!mapping.contains_key("E3"));
    assert!(mapping["E1"].is_root());

    let calls = store.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, FilterColumn::Column("uid".to_string()));
    assert_eq!(calls[0].1, values(&["OU1"]));
}

#[test]
fn empty_inputs_never_touch_the_store() {
    let store = Arc::new(RecordingStore::with_rows(sierra_leone()));
    let resolver = OrgUnitResolver::new(store.clone());

    assert!(resolver.resolve(&IdScheme::Uid, None).unwrap().is_empty());
    assert!(resolver.resolve(&IdScheme::Uid, Some(&[])).unwrap().is_empty());

    let null_only = vec![
        ImportRecord::new("E1", None),
        ImportRecord::new("E2", Some("")),
        ImportRecord::new("E3", Some("   ")),
    ];
    assert!(resolver.resolve(&IdScheme::Code, Some(&null_only)).unwrap().is_empty());

    assert!(store.calls().is_empty());
}

#[test]
fn empty_input_skips_even_a_broken_store() {
    let resolver = OrgUnitResolver::new(Arc::new(UnreachableStore));
    let records = vec![ImportRecord::new("E1", None)];
    assert!(resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap().is_empty());
}

#[test]
fn shared_reference_maps_to_one_entity() {
    let resolver = OrgUnitResolver::new(Arc::new(RecordingStore::with_rows(sierra_leone())));
    let records: Vec<ImportRecord> = (0..5)
        .map(|i| ImportRecord::new(format!("E{i}"), Some("DiszpKrYNg8")))
        .collect();

    let mapping = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap();
    assert_eq!(mapping.len(), 5);
    let first = &mapping["E0"];
    for unit in mapping.values() {
        assert_eq!(unit.uid, "DiszpKrYNg8");
        assert!(Arc::ptr_eq(unit, first));
    }
}

#[test]
fn hierarchy_is_rebuilt_from_path() {
    let resolver = OrgUnitResolver::new(Arc::new(RecordingStore::with_rows(sierra_leone())));
    let records = vec![
        ImportRecord::new("E1", Some("DiszpKrYNg8")),
        ImportRecord::new("E2", Some("ImspTQPwCqd")),
    ];
    let mapping = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap();

    let facility = &mapping["E1"];
    assert_eq!(facility.path, vec![1, 2, 3]);
    assert_eq!(facility.hierarchy_level, 3);
    assert_eq!(facility.parent_id(), Some(2));
    assert_eq!(facility.ancestor_ids(), vec![2, 1]);

    let root = &mapping["E2"];
    assert_eq!(root.path, vec![1]);
    assert!(root.parent.is_none());
}

#[test]
fn switching_scheme_changes_column_not_shape() {
    let store = Arc::new(RecordingStore::with_rows(sierra_leone()));
    let resolver = OrgUnitResolver::new(store.clone());

    let by_uid = vec![
        ImportRecord::new("E1", Some("O6uvpzGd5pu")),
        ImportRecord::new("E2", Some("DiszpKrYNg8")),
    ];
    let by_code = vec![
        ImportRecord::new("E1", Some("OU_264")),
        ImportRecord::new("E2", Some("OU_559")),
    ];

    let uid_mapping = resolver.resolve(&IdScheme::Uid, Some(&by_uid)).unwrap();
    let code_mapping = resolver.resolve(&IdScheme::Code, Some(&by_code)).unwrap();

    let mut uid_keys: Vec<_> = uid_mapping.keys().cloned().collect();
    let mut code_keys: Vec<_> = code_mapping.keys().cloned().collect();
    uid_keys.sort();
    code_keys.sort();
    assert_eq!(uid_keys, code_keys);
    for key in &uid_keys {
        assert_eq!(uid_mapping[key].id, code_mapping[key].id);
    }

    let calls = store.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, FilterColumn::Column("uid".to_string()));
    assert_eq!(calls[1].0, FilterColumn::Column("code".to_string()));
    assert_eq!(calls[1].1, values(&["OU_264", "OU_559"]));
}

#[test]
fn resolve_by_name_id_and_attribute() {
    let resolver = OrgUnitResolver::new(Arc::new(RecordingStore::with_rows(sierra_leone())));

    let records = vec![ImportRecord::new("E1", Some("Bo"))];
    let mapping = resolver.resolve(&IdScheme::Name, Some(&records)).unwrap();
    assert_eq!(mapping["E1"].id, 2);

    let records = vec![ImportRecord::new("E1", Some("3"))];
    let mapping = resolver.resolve(&IdScheme::Id, Some(&records)).unwrap();
    assert_eq!(mapping["E1"].uid, "DiszpKrYNg8");

    let scheme: IdScheme = "ATTRIBUTE:n2xYlNbsfko".parse().unwrap();
    let records = vec![
        ImportRecord::new("E1", Some("SL-NGE")),
        ImportRecord::new("E2", Some("SL-BO")),
        ImportRecord::new("E3", Some("SL-XX")),
    ];
    let resolution = resolver.resolve_detailed(&scheme, Some(&records)).unwrap();
    assert_eq!(resolution.mapping["E1"].id, 3);
    assert_eq!(resolution.mapping["E2"].id, 2);
    assert_eq!(
        resolution.mapping["E1"].attribute_value("n2xYlNbsfko"),
        Some("SL-NGE")
    );
    assert_eq!(resolution.unmatched, values(&["SL-XX"]));
}

#[test]
fn unmatched_references_are_silently_absent() {
    let resolver = OrgUnitResolver::new(Arc::new(RecordingStore::with_rows(sierra_leone())));
    let records = vec![
        ImportRecord::new("E1", Some("ImspTQPwCqd")),
        ImportRecord::new("E2", Some("doesNotExist")),
    ];
    let mapping = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap();
    assert_eq!(mapping.len(), 1);
    assert!(mapping.contains_key("E1"));
}

#[test]
fn rows_not_cited_by_any_record_are_not_emitted() {
    let resolver = OrgUnitResolver::new(Arc::new(FixedRowsStore(sierra_leone())));
    let records = vec![ImportRecord::new("E1", Some("OU_525"))];
    let mapping = resolver.resolve(&IdScheme::Code, Some(&records)).unwrap();
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping["E1"].id, 1);
}

#[test]
fn extraction_failure_aborts_whole_batch() {
    let rows = vec![
        OrgUnitRow::new(1, "ImspTQPwCqd", "/1", 1).with_code("OU_525"),
        OrgUnitRow::new(2, "O6uvpzGd5pu", "/1/2", 2),
    ];
    let resolver = OrgUnitResolver::new(Arc::new(FixedRowsStore(rows)));
    let records = vec![
        ImportRecord::new("E1", Some("OU_525")),
        ImportRecord::new("E2", Some("OU_264")),
    ];

    let err = resolver
        .resolve(&IdScheme::Code, Some(&records))
        .unwrap_err();
    assert!(err.is_unrecoverable());
    let ResolveError::Unrecoverable(UnrecoverableError::SchemeExtraction {
        scheme, entity_id, ..
    }) = err
    else {
        panic!("expected scheme extraction failure");
    };
    assert_eq!(scheme, IdScheme::Code);
    assert_eq!(entity_id, 2);
}

#[test]
fn store_failure_propagates_unchanged() {
    let resolver = OrgUnitResolver::new(Arc::new(UnreachableStore));
    let records = vec![ImportRecord::new("E1", Some("OU1"))];
    let err = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        ResolveError::Storage(StorageError::ConnectionError(ref m)) if m == "connection refused"
    ));
}

#[test]
fn failure_mid_stream_returns_no_partial_mapping() {
    let resolver = OrgUnitResolver::new(Arc::new(TruncatedStore));
    let records = vec![
        ImportRecord::new("E1", Some("ImspTQPwCqd")),
        ImportRecord::new("E2", Some("other")),
    ];
    let err = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap_err();
    assert!(matches!(err, ResolveError::Storage(StorageError::BackendError(_))));
    assert!(!err.is_retryable());
}

#[test]
fn resolvers_run_concurrently_on_independent_batches() {
    let store = Arc::new(RecordingStore::with_rows(sierra_leone()));
    let resolver = OrgUnitResolver::new(store.clone());
    let uids = ["ImspTQPwCqd", "O6uvpzGd5pu", "DiszpKrYNg8"];

    std::thread::scope(|scope| {
        for (i, uid) in uids.iter().enumerate() {
            let resolver = resolver.clone();
            scope.spawn(move || {
                let records = vec![ImportRecord::new(format!("E{i}"), Some(uid))];
                let mapping = resolver.resolve(&IdScheme::Uid, Some(&records)).unwrap();
                assert_eq!(mapping[&format!("E{i}")].uid, *uid);
            });
        }
    });

    assert_eq!(store.calls().len(), 3);
}
