//! Hierarchy reconstruction from materialized paths.
//!
//! A stored path such as `/1/2/3` lists ancestor ids from the root down to the
//! unit itself. Depth and the parent chain are derived from it directly, so no
//! recursive ancestor query is ever needed.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::config::LevelMismatchPolicy;
use crate::entity::{OrgUnit, OrgUnitId, ParentRef};
use crate::storage::OrgUnitRow;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

/// Errors raised while interpreting a materialized path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("path is empty")]
    EmptyPath,

    #[error("path segment '{segment}' is not a numeric id")]
    InvalidSegment {
        segment: String,
    },

    #[error("hierarchy level {level} does not match path depth {depth}")]
    LevelMismatch {
        level: u32,
        depth: usize,
    },

    #[error("path ends with {last}, expected own id {id}")]
    SelfMismatch {
        id: OrgUnitId,
        last: OrgUnitId,
    },
}

/// Parsed materialized path, root first, self last. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedPath(Vec<OrgUnitId>);

impl MaterializedPath {
    /// Parses a separator-delimited path. Leading and trailing separators are ignored.
    ///
    /// # Errors
    /// - `EmptyPath`: no segments at all
    /// - `InvalidSegment`: a segment is blank or not an integer
    pub fn parse(raw: &str) -> Result<Self, HierarchyError> {
        let trimmed = raw.trim().trim_matches(PATH_SEPARATOR);
        if trimmed.is_empty() {
            return Err(HierarchyError::EmptyPath);
        }

        let segments = trimmed
            .split(PATH_SEPARATOR)
            .map(|segment| {
                segment
                    .trim()
                    .parse::<OrgUnitId>()
                    .map_err(|_| HierarchyError::InvalidSegment {
                        segment: segment.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(segments))
    }

    #[must_use]
    pub fn segments(&self) -> &[OrgUnitId] {
        &self.0
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Second-to-last segment; `None` for a root.
    #[must_use]
    pub fn parent_id(&self) -> Option<OrgUnitId> {
        self.0.len().checked_sub(2).map(|i| self.0[i])
    }

    /// Verifies the path against the unit's own id and declared level.
    ///
    /// # Errors
    /// - `LevelMismatch`: `level` differs from the number of segments
    /// - `SelfMismatch`: the last segment is not `id`
    pub fn check(&self, id: OrgUnitId, level: u32) -> Result<(), HierarchyError> {
        if usize::try_from(level).map_or(true, |l| l != self.depth()) {
            return Err(HierarchyError::LevelMismatch {
                level,
                depth: self.depth(),
            });
        }
        match self.0.last() {
            Some(&last) if last != id => Err(HierarchyError::SelfMismatch { id, last }),
            _ => Ok(()),
        }
    }

    /// Builds the ancestor chain and returns the immediate parent.
    #[must_use]
    pub fn parent_chain(&self) -> Option<Arc<ParentRef>> {
        let (_, ancestors) = self.0.split_last()?;
        let mut parent: Option<Arc<ParentRef>> = None;
        for (depth, &id) in (1u32..).zip(ancestors) {
            parent = Some(Arc::new(ParentRef {
                id,
                hierarchy_level: depth,
                parent,
            }));
        }
        parent
    }

    #[must_use]
    pub fn into_segments(self) -> Vec<OrgUnitId> {
        self.0
    }
}

/// Turns a raw store row into an [`OrgUnit`] with its parent chain attached.
///
/// Path/level inconsistencies are handled according to `policy`; a path
/// that cannot be parsed is always an error.
///
/// # Errors
/// Returns a [`HierarchyError`] for unparseable paths, and for inconsistent
/// ones under [`LevelMismatchPolicy::Reject`].
pub fn link_row(row: OrgUnitRow, policy: LevelMismatchPolicy) -> Result<OrgUnit, HierarchyError> {
    let path = MaterializedPath::parse(&row.path)?;

    if let Err(e) = path.check(row.id, row.hierarchy_level) {
        match policy {
            LevelMismatchPolicy::Reject => return Err(e),
            LevelMismatchPolicy::Tolerate => warn!(
                "Organisation unit {} has inconsistent path '{}': {}; linking parent from path",
                row.id, row.path, e
            ),
        }
    }

    let parent = path.parent_chain();
    Ok(OrgUnit {
        id: row.id,
        uid: row.uid,
        code: row.code,
        name: row.name,
        path: path.into_segments(),
        hierarchy_level: row.hierarchy_level,
        attribute_values: row.attribute_values,
        parent,
    })
}
