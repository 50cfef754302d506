//! Import records that cite organisation units.

use serde::{Deserialize, Serialize};

/// One record of an import batch.
///
/// # Examples
///
/// ```
/// use orgunit_resolver::ImportRecord;
///
/// let record = ImportRecord::new("E1", Some("ImspTQPwCqd"));
/// assert_eq!(record.org_unit_ref(), Some("ImspTQPwCqd"));
///
/// let blank = ImportRecord::new("E2", Some("  "));
/// assert_eq!(blank.org_unit_ref(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    /// Identifier of the record within the import.
    pub id: String,

    /// Reference to an organisation unit, in the caller's identifier scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_unit: Option<String>,
}

impl ImportRecord {
    /// Create a record citing `org_unit`, if any.
    #[must_use]
    pub fn new(id: impl Into<String>, org_unit: Option<&str>) -> Self {
        Self {
            id: id.into(),
            org_unit: org_unit.map(str::to_string),
        }
    }

    /// The organisation unit reference, treating blank values as absent.
    #[must_use]
    pub fn org_unit_ref(&self) -> Option<&str> {
        self.org_unit.as_deref().filter(|r| !r.trim().is_empty())
    }
}
