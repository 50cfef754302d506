//! Reference extraction and the reverse index.
//!
//! The reverse index maps each organisation unit reference to every record
//! that cited it, so that one batch query can satisfy the whole import.

use std::collections::{BTreeSet, HashMap};

use crate::record::ImportRecord;

/// Distinct non-blank references cited by `records`, in sorted order.
#[must_use]
pub fn extract_references(records: &[ImportRecord]) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(ImportRecord::org_unit_ref)
        .map(str::to_string)
        .collect()
}

/// Reference value → identifiers of the records citing it.
///
/// Built once per resolve call and read-only afterwards. A record listed
/// twice under the same reference is stored once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseIndex {
    by_reference: HashMap<String, BTreeSet<String>>,
}

impl ReverseIndex {
    /// Indexes every record that carries a reference.
    #[must_use]
    pub fn build(records: &[ImportRecord]) -> Self {
        let mut by_reference: HashMap<String, BTreeSet<String>> = HashMap::new();
        for record in records {
            let Some(reference) = record.org_unit_ref() else {
                continue;
            };
            by_reference
                .entry(reference.to_string())
                .or_default()
                .insert(record.id.clone());
        }
        Self { by_reference }
    }

    /// Records citing `reference`, in identifier order; empty if none did.
    pub fn records_for<'a>(&'a self, reference: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.by_reference
            .get(reference)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    /// Number of records citing `reference`.
    #[must_use]
    pub fn record_count(&self, reference: &str) -> usize {
        self.by_reference.get(reference).map_or(0, BTreeSet::len)
    }

    #[must_use]
    pub fn contains(&self, reference: &str) -> bool {
        self.by_reference.contains_key(reference)
    }

    /// Number of distinct references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }

    /// Iterates over the indexed references.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.by_reference.keys().map(String::as_str)
    }
}
