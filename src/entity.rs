//! Resolved organisation units.
//!
//! Units are transient: built from store rows for one resolve call, shared
//! with the caller through `Arc`, and never written back.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Internal numeric id of an organisation unit.
pub type OrgUnitId = i64;

/// Minimal handle to an ancestor, reconstructed from a materialized path.
///
/// Only the internal id and depth are known; no extra lookup hydrates the
/// ancestor's uid, code or name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    /// Internal id of the ancestor.
    pub id: OrgUnitId,
    /// Depth of the ancestor (root = 1).
    pub hierarchy_level: u32,
    /// The ancestor's own parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Arc<ParentRef>>,
}

impl ParentRef {
    /// Iterates from this ancestor up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &ParentRef> {
        std::iter::successors(Some(self), |current| current.parent.as_deref())
    }
}

/// An organisation unit resolved for an import batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    /// Internal id assigned by the store.
    pub id: OrgUnitId,
    /// Stable public identifier.
    pub uid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Ancestor ids, root first, self last.
    pub path: Vec<OrgUnitId>,

    /// Depth as stored alongside the unit (root = 1).
    pub hierarchy_level: u32,

    /// Attribute values projected by the query, keyed by attribute uid.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attribute_values: BTreeMap<String, String>,

    /// Immediate parent; `None` for a root unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Arc<ParentRef>>,
}

impl OrgUnit {
    /// Returns true if the unit has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Internal id of the immediate parent.
    #[must_use]
    pub fn parent_id(&self) -> Option<OrgUnitId> {
        self.parent.as_ref().map(|p| p.id)
    }

    /// Value of the attribute with the given uid.
    #[must_use]
    pub fn attribute_value(&self, attribute: &str) -> Option<&str> {
        self.attribute_values.get(attribute).map(String::as_str)
    }

    /// Ancestor ids from the immediate parent up to the root.
    #[must_use]
    pub fn ancestor_ids(&self) -> Vec<OrgUnitId> {
        self.parent
            .as_ref()
            .map(|p| p.ancestors().map(|a| a.id).collect())
            .unwrap_or_default()
    }

    /// Returns true if `other` appears in this unit's path above the unit itself.
    #[must_use]
    pub fn is_descendant_of(&self, other: OrgUnitId) -> bool {
        self.path
            .split_last()
            .is_some_and(|(_, ancestors)| ancestors.contains(&other))
    }
}
