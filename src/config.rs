//! Resolver configuration.
//!
//! The configuration is injected into each resolver. Nothing here is global,
//! so independent imports can run side by side with different tables.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheme::{SchemeColumns, SchemeKind};

/// Configuration errors. These indicate a broken setup, not bad data.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown identifier scheme '{0}'")]
    InvalidScheme(String),

    #[error("No column configured for identifier scheme {0}")]
    UnmappedScheme(SchemeKind),

    #[error("Column '{0}' is not a valid identifier")]
    InvalidColumn(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What to do when a stored path disagrees with the unit's hierarchy level
/// or its own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelMismatchPolicy {
    /// Log a warning and link the parent from the path anyway.
    #[default]
    Tolerate,
    /// Fail the batch with a hierarchy error.
    Reject,
}

/// Configuration for [`crate::OrgUnitResolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Scheme-to-column table shared with the other resolvers of an import.
    pub scheme_columns: SchemeColumns,
    /// Handling of inconsistent materialized paths.
    pub level_mismatch: LevelMismatchPolicy,
}

impl ResolverConfig {
    /// Checks that every configured column is usable in a query.
    ///
    /// # Errors
    /// Returns `InvalidColumn` for the first column that is not a plain identifier.
    pub fn validate(self) -> Result<Self, ConfigError> {
        self.scheme_columns.validate()?;
        Ok(self)
    }

    /// Parses and validates a JSON configuration. Missing fields take defaults.
    ///
    /// ```
    /// use orgunit_resolver::{LevelMismatchPolicy, ResolverConfig};
    ///
    /// let config = ResolverConfig::from_json_str(r#"{"level_mismatch": "reject"}"#).unwrap();
    /// assert_eq!(config.level_mismatch, LevelMismatchPolicy::Reject);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }
}
