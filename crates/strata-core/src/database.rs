//! Database handle traits and result types

use serde::Serialize;

use crate::error::{Error, Result};
use crate::version::Version;

/// A single cell returned by a query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A row of a result set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    pub fn get_i64(&self, idx: usize) -> Option<i64> {
        self.get(idx).and_then(Value::as_i64)
    }

    pub fn get_str(&self, idx: usize) -> Option<&str> {
        self.get(idx).and_then(Value::as_str)
    }
}

/// Rows returned by `Database::query`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Index of a column by name (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of `column` in row `row`
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }
}

/// Transactional handle the migrator and steps run against
///
/// `begin` may be called while a transaction is already open; backends
/// implement nested calls as savepoints so a step can manage its own
/// sub-transactions inside the one the migrator opened.
pub trait Database {
    /// Execute a single statement, returning the number of affected rows
    fn execute(&self, sql: &str) -> Result<usize>;

    /// Execute one or more `;`-separated statements
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Run a query and collect every row
    fn query(&self, sql: &str) -> Result<ResultSet>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Whether a table with this name exists
    fn table_exists(&self, table: &str) -> Result<bool>;
}

/// Persisted "current version" of a database schema
pub trait VersionStore {
    /// Read the current version, creating the record at 0 on first use
    fn current_version(&self) -> Result<Version>;

    /// Overwrite the stored version
    fn set_version(&self, version: Version) -> Result<()>;
}

impl<T: Database + ?Sized> Database for &T {
    fn execute(&self, sql: &str) -> Result<usize> {
        (**self).execute(sql)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        (**self).execute_batch(sql)
    }

    fn query(&self, sql: &str) -> Result<ResultSet> {
        (**self).query(sql)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        (**self).table_exists(table)
    }
}

impl<T: VersionStore + ?Sized> VersionStore for &T {
    fn current_version(&self) -> Result<Version> {
        (**self).current_version()
    }

    fn set_version(&self, version: Version) -> Result<()> {
        (**self).set_version(version)
    }
}

/// Check that `name` is a plain SQL identifier safe to interpolate
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "'{}' is not a valid table name",
            name
        )))
    }
}

/// Convert a stored version cell into a `Version`
pub fn version_from_value(value: Option<&Value>) -> Result<Version> {
    value
        .and_then(Value::as_i64)
        .and_then(|v| Version::try_from(v).ok())
        .ok_or_else(|| Error::Database("unable to retrieve current schema version".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_set_lookup() {
        let rs = ResultSet::new(
            vec!["id".into(), "name".into()],
            vec![Row(vec![Value::Integer(7), Value::Text("ada".into())])],
        );

        assert_eq!(rs.len(), 1);
        assert_eq!(rs.value(0, "NAME").and_then(Value::as_str), Some("ada"));
        assert_eq!(rs.first().and_then(|r| r.get_i64(0)), Some(7));
        assert!(rs.value(1, "id").is_none());
        assert!(rs.value(0, "missing").is_none());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("schema_info").is_ok());
        assert!(validate_identifier("_v2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("info; DROP TABLE x").is_err());
    }

    #[test]
    fn test_version_from_value() {
        assert_eq!(version_from_value(Some(&Value::Integer(4))).unwrap(), 4);
        assert!(matches!(
            version_from_value(Some(&Value::Integer(-1))),
            Err(Error::Database(_))
        ));
        assert!(version_from_value(Some(&Value::Null)).is_err());
        assert!(version_from_value(None).is_err());
    }
}
