//! SQLite storage backend.
//!
//! Reads from an `organisationunit` table laid out like the import database:
//! plain columns for id, uid, code, name, path and hierarchy level, plus an
//! `attributevalues` JSON document of the form `{"<attr uid>": {"value": "..."}}`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Row, ToSql};
use tracing::debug;

use crate::scheme::{is_sql_identifier, FilterColumn};
use crate::storage::traits::{OrgUnitQuery, OrgUnitRow, OrgUnitStore, RowStream, StorageError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS organisationunit (
    organisationunitid INTEGER PRIMARY KEY,
    uid TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    name TEXT,
    path TEXT NOT NULL,
    hierarchylevel INTEGER NOT NULL,
    attributevalues TEXT NOT NULL DEFAULT '{}'
);
";

const PROJECTION: &str =
    "select ou.organisationunitid, ou.uid, ou.code, ou.name, ou.path, ou.hierarchylevel";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// JSON path addressing an attribute's value inside `attributevalues`.
fn attribute_json_path(attribute: &str) -> String {
    format!("$.\"{attribute}\".value")
}

/// Builds the batch statement. Parameter 1 is the attribute JSON path when
/// filtering by attribute; the IN-list values follow.
fn build_sql(filter: &FilterColumn, value_count: usize) -> Result<String, StorageError> {
    let column = filter.column();
    if !is_sql_identifier(column) {
        return Err(StorageError::UnknownColumn(column.to_string()));
    }

    let first = match filter {
        FilterColumn::Column(_) => 1,
        FilterColumn::Attribute { .. } => 2,
    };
    let placeholders = (first..first + value_count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(match filter {
        FilterColumn::Column(column) => format!(
            "{PROJECTION} from organisationunit ou where ou.{column} in ({placeholders})"
        ),
        FilterColumn::Attribute { column, .. } => format!(
            "{PROJECTION}, json_extract(ou.{column}, ?1) as attributevalue \
             from organisationunit ou where json_extract(ou.{column}, ?1) in ({placeholders})"
        ),
    })
}

fn read_row(row: &Row<'_>, attribute: Option<&str>) -> Result<OrgUnitRow, StorageError> {
    let level: i64 = row.get(5)?;
    let hierarchy_level = u32::try_from(level)
        .map_err(|_| StorageError::InvalidRow(format!("hierarchy level {level} out of range")))?;

    let mut unit = OrgUnitRow {
        id: row.get(0)?,
        uid: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        path: row.get(4)?,
        hierarchy_level,
        attribute_values: Default::default(),
    };
    if let Some(attribute) = attribute {
        if let Some(value) = row.get::<_, Option<String>>(6)? {
            unit.attribute_values.insert(attribute.to_string(), value);
        }
    }
    Ok(unit)
}

/// Organisation unit store backed by a SQLite connection.
#[derive(Debug)]
pub struct SqliteOrgUnitStore {
    conn: Mutex<Connection>,
}

impl SqliteOrgUnitStore {
    /// Wraps an existing connection.
    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StorageError::ConnectionError(format!("{}: {e}", path.as_ref().display())))?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Creates the `organisationunit` table if it does not exist.
    pub fn create_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| lock_err("sqlite.create_schema"))?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Inserts one unit, serializing its attribute values into the JSON document.
    pub fn insert(&self, row: &OrgUnitRow) -> Result<(), StorageError> {
        let attributes: serde_json::Map<String, serde_json::Value> = row
            .attribute_values
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::json!({ "value": v })))
            .collect();
        let attributes = serde_json::Value::Object(attributes).to_string();

        let conn = self.conn.lock().map_err(|_| lock_err("sqlite.insert"))?;
        conn.execute(
            "insert into organisationunit \
             (organisationunitid, uid, code, name, path, hierarchylevel, attributevalues) \
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                row.id,
                row.uid,
                row.code,
                row.name,
                row.path,
                i64::from(row.hierarchy_level),
                attributes
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::DuplicateKey(row.uid.clone())
            }
            other => StorageError::Sqlite(other),
        })?;
        Ok(())
    }
}

impl OrgUnitStore for SqliteOrgUnitStore {
    fn query(&self, query: &OrgUnitQuery<'_>) -> Result<RowStream, StorageError> {
        let sql = build_sql(query.filter, query.values.len())?;

        let (json_path, attribute) = match query.filter {
            FilterColumn::Attribute { attribute, .. } => {
                (Some(attribute_json_path(attribute)), Some(attribute.as_str()))
            }
            FilterColumn::Column(_) => (None, None),
        };
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(query.values.len() + 1);
        if let Some(json_path) = json_path.as_ref() {
            params.push(json_path as &dyn ToSql);
        }
        for value in query.values {
            params.push(value as &dyn ToSql);
        }

        debug!("Running org unit batch query with {} values: {}", query.values.len(), sql);

        let conn = self.conn.lock().map_err(|_| lock_err("sqlite.query"))?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(&*params)?;
        let mut out: Vec<Result<OrgUnitRow, StorageError>> = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(row, attribute));
        }

        Ok(Box::new(out.into_iter()))
    }
}
