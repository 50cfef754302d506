//! Error types for the resolver.
//!
//! Ordinary failures (storage, configuration, hierarchy data) and the
//! unrecoverable signal that must abort the enclosing import are separate
//! variants of [`ResolveError`], so callers can branch on them without
//! inspecting messages.

use thiserror::Error;

use crate::config::ConfigError;
use crate::entity::OrgUnitId;
use crate::hierarchy::HierarchyError;
use crate::scheme::IdScheme;
use crate::storage::StorageError;

/// Failures that invalidate the whole import batch.
#[derive(Debug, Error)]
pub enum UnrecoverableError {
    #[error("Cannot read {scheme} value of organisation unit {entity_id}: {reason}")]
    SchemeExtraction {
        scheme: IdScheme,
        entity_id: OrgUnitId,
        reason: String,
    },
}

/// Top-level error type for resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid hierarchy for organisation unit {entity_id}: {source}")]
    Hierarchy {
        entity_id: OrgUnitId,
        #[source]
        source: HierarchyError,
    },

    #[error("Unrecoverable import error: {0}")]
    Unrecoverable(#[from] UnrecoverableError),
}

impl ResolveError {
    /// Returns true if the enclosing import must be aborted.
    #[must_use]
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the same batch may succeed.
    ///
    /// Only connection-level storage failures qualify; the resolver itself
    /// never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::ConnectionError(_)))
    }
}

/// Result type alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;
