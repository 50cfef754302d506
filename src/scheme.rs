//! Identifier schemes and the scheme-to-column table.
//!
//! An [`IdScheme`] decides which property of an organisation unit is compared
//! against the references carried by import records. The same scheme selects
//! two things that must always agree:
//!
//! - the physical column the batch query filters on ([`SchemeColumns::filter_column`])
//! - the value read back from a resolved unit ([`IdScheme::entity_value`])
//!
//! If the two ever disagree, rows returned by the store would not find their
//! records in the reverse index.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::entity::OrgUnit;
use crate::error::UnrecoverableError;

/// Default column holding the internal numeric id.
pub const COLUMN_ID: &str = "organisationunitid";
/// Default column holding the external uid.
pub const COLUMN_UID: &str = "uid";
/// Default column holding the code.
pub const COLUMN_CODE: &str = "code";
/// Default column holding the name.
pub const COLUMN_NAME: &str = "name";
/// Default column holding the JSON attribute value document.
pub const COLUMN_ATTRIBUTE_VALUES: &str = "attributevalues";

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
static ATTRIBUTE_UID: OnceLock<Regex> = OnceLock::new();

/// Returns true if `s` can be spliced into SQL as a bare column name.
pub(crate) fn is_sql_identifier(s: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
        .is_match(s)
}

fn is_attribute_uid(s: &str) -> bool {
    ATTRIBUTE_UID
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("attribute uid pattern"))
        .is_match(s)
}

/// Table key for [`SchemeColumns`]: the scheme without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    Id,
    Uid,
    Code,
    Name,
    Attribute,
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => write!(f, "ID"),
            Self::Uid => write!(f, "UID"),
            Self::Code => write!(f, "CODE"),
            Self::Name => write!(f, "NAME"),
            Self::Attribute => write!(f, "ATTRIBUTE"),
        }
    }
}

/// Caller-selected identifier scheme for organisation unit references.
///
/// # Examples
///
/// ```
/// use orgunit_resolver::IdScheme;
///
/// let scheme: IdScheme = "code".parse().unwrap();
/// assert_eq!(scheme, IdScheme::Code);
///
/// let scheme: IdScheme = "ATTRIBUTE:n2xYlNbsfko".parse().unwrap();
/// assert_eq!(scheme, IdScheme::Attribute("n2xYlNbsfko".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdScheme {
    /// Internal numeric id.
    Id,
    /// External uid.
    #[default]
    Uid,
    /// Code.
    Code,
    /// Name.
    Name,
    /// Value of the attribute with the given uid.
    Attribute(String),
}

impl IdScheme {
    /// Returns the table key for this scheme.
    #[must_use]
    pub const fn kind(&self) -> SchemeKind {
        match self {
            Self::Id => SchemeKind::Id,
            Self::Uid => SchemeKind::Uid,
            Self::Code => SchemeKind::Code,
            Self::Name => SchemeKind::Name,
            Self::Attribute(_) => SchemeKind::Attribute,
        }
    }

    /// Reads the value this scheme compares against record references.
    ///
    /// This is the dual of [`SchemeColumns::filter_column`].
    ///
    /// # Errors
    /// Returns [`UnrecoverableError::SchemeExtraction`] when the unit has no
    /// usable value for the scheme.
    pub fn entity_value<'a>(&self, unit: &'a OrgUnit) -> Result<Cow<'a, str>, UnrecoverableError> {
        let value = match self {
            Self::Id => Some(Cow::Owned(unit.id.to_string())),
            Self::Uid => Some(Cow::Borrowed(unit.uid.as_str())),
            Self::Code => unit.code.as_deref().map(Cow::Borrowed),
            Self::Name => unit.name.as_deref().map(Cow::Borrowed),
            Self::Attribute(attribute) => unit.attribute_value(attribute).map(Cow::Borrowed),
        };

        match value {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(UnrecoverableError::SchemeExtraction {
                scheme: self.clone(),
                entity_id: unit.id,
                reason: match self {
                    Self::Attribute(attribute) => format!("attribute '{attribute}' has no value"),
                    other => format!("{} is absent", other.kind().to_string().to_lowercase()),
                },
            }),
        }
    }
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(attribute) => write!(f, "ATTRIBUTE:{attribute}"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

impl FromStr for IdScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (head, tail) = match trimmed.split_once(':') {
            Some((head, tail)) => (head, Some(tail)),
            None => (trimmed, None),
        };

        match (head.to_ascii_uppercase().as_str(), tail) {
            ("ID", None) => Ok(Self::Id),
            ("UID", None) => Ok(Self::Uid),
            ("CODE", None) => Ok(Self::Code),
            ("NAME", None) => Ok(Self::Name),
            ("ATTRIBUTE", Some(uid)) if is_attribute_uid(uid) => Ok(Self::Attribute(uid.to_string())),
            _ => Err(ConfigError::InvalidScheme(s.to_string())),
        }
    }
}

impl TryFrom<String> for IdScheme {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IdScheme> for String {
    fn from(scheme: IdScheme) -> Self {
        scheme.to_string()
    }
}

/// Column the batch query filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterColumn {
    /// A plain column of the organisation unit table.
    Column(String),
    /// A value inside the JSON attribute document stored in `column`.
    Attribute {
        /// Column holding the attribute value document.
        column: String,
        /// Uid of the attribute whose value is compared.
        attribute: String,
    },
}

impl FilterColumn {
    /// Name of the physical column involved in the filter.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Column(column) | Self::Attribute { column, .. } => column,
        }
    }
}

/// Scheme-to-column table shared by the resolvers of an import.
///
/// Passed to the resolver as configuration. A scheme missing from the table
/// is a configuration error at resolve time, never a silent fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemeColumns(BTreeMap<SchemeKind, String>);

impl Default for SchemeColumns {
    fn default() -> Self {
        Self(BTreeMap::from([
            (SchemeKind::Id, COLUMN_ID.to_string()),
            (SchemeKind::Uid, COLUMN_UID.to_string()),
            (SchemeKind::Code, COLUMN_CODE.to_string()),
            (SchemeKind::Name, COLUMN_NAME.to_string()),
            (SchemeKind::Attribute, COLUMN_ATTRIBUTE_VALUES.to_string()),
        ]))
    }
}

impl SchemeColumns {
    /// Creates an empty table. Every scheme is unmapped until configured.
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Maps `kind` to `column`, replacing any previous mapping.
    #[must_use]
    pub fn with_column(mut self, kind: SchemeKind, column: impl Into<String>) -> Self {
        self.0.insert(kind, column.into());
        self
    }

    /// Removes the mapping for `kind`.
    #[must_use]
    pub fn without(mut self, kind: SchemeKind) -> Self {
        self.0.remove(&kind);
        self
    }

    /// Returns the column mapped to `kind`, if any.
    #[must_use]
    pub fn column(&self, kind: SchemeKind) -> Option<&str> {
        self.0.get(&kind).map(String::as_str)
    }

    /// Resolves the filter column for `scheme`.
    ///
    /// # Errors
    /// - `UnmappedScheme`: the table has no column for the scheme
    /// - `InvalidColumn`: the mapped column is not a plain identifier
    pub fn filter_column(&self, scheme: &IdScheme) -> Result<FilterColumn, ConfigError> {
        let kind = scheme.kind();
        let column = self
            .column(kind)
            .ok_or(ConfigError::UnmappedScheme(kind))?;
        if !is_sql_identifier(column) {
            return Err(ConfigError::InvalidColumn(column.to_string()));
        }

        Ok(match scheme {
            IdScheme::Attribute(attribute) => FilterColumn::Attribute {
                column: column.to_string(),
                attribute: attribute.clone(),
            },
            _ => FilterColumn::Column(column.to_string()),
        })
    }

    /// Checks that every mapped column is a plain identifier.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match self.0.values().find(|column| !is_sql_identifier(column)) {
            Some(column) => Err(ConfigError::InvalidColumn(column.clone())),
            None => Ok(()),
        }
    }
}
