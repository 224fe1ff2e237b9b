//! SQLite database backend

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use strata_core::database::{validate_identifier, version_from_value};
use strata_core::{Database, Error, Result, ResultSet, Row, Value, Version, VersionStore};

/// Table holding the current schema version
pub const DEFAULT_VERSION_TABLE: &str = "schema_info";

struct Inner {
    conn: Connection,
    depth: u32,
}

/// SQLite database backend
///
/// Nested `begin` calls open savepoints inside the outer transaction.
pub struct SqliteDatabase {
    inner: Mutex<Inner>,
    version_table: String,
}

impl SqliteDatabase {
    /// Open or create a SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            inner: Mutex::new(Inner { conn, depth: 0 }),
            version_table: DEFAULT_VERSION_TABLE.to_string(),
        }
    }

    /// Store the schema version in `table` instead of `schema_info`
    pub fn with_version_table(mut self, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        self.version_table = table;
        Ok(self)
    }

    pub fn version_table(&self) -> &str {
        &self.version_table
    }

    /// Number of transactions and savepoints currently open
    pub fn transaction_depth(&self) -> Result<u32> {
        Ok(self.lock()?.depth)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| Error::Database(format!("Lock error: {}", e)))
    }

    fn create_version_table(&self, conn: &Connection) -> Result<()> {
        tracing::debug!("Creating version table {}", self.version_table);

        let sql = format!(
            "SAVEPOINT strata_init;
             CREATE TABLE {table} (version INTEGER NOT NULL);
             INSERT INTO {table} (version) VALUES (0);
             RELEASE strata_init;",
            table = self.version_table
        );

        if let Err(e) = conn.execute_batch(&sql) {
            let _ = conn.execute_batch("ROLLBACK TO strata_init; RELEASE strata_init;");
            return Err(Error::Database(e.to_string()));
        }
        Ok(())
    }
}

fn savepoint(depth: u32) -> String {
    format!("strata_sp_{}", depth)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(e.to_string()))?;
    Ok(count > 0)
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}

impl Database for SqliteDatabase {
    fn execute(&self, sql: &str) -> Result<usize> {
        let inner = self.lock()?;
        inner
            .conn
            .execute(sql, [])
            .map_err(|e| Error::Database(e.to_string()))
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        let inner = self.lock()?;
        inner
            .conn
            .execute_batch(sql)
            .map_err(|e| Error::Database(e.to_string()))
    }

    fn query(&self, sql: &str) -> Result<ResultSet> {
        let inner = self.lock()?;

        let mut stmt = inner
            .conn
            .prepare(sql)
            .map_err(|e| Error::Database(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let count = columns.len();

        let mut rows = stmt.query([]).map_err(|e| Error::Database(e.to_string()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::Database(e.to_string()))? {
            let mut values = Vec::with_capacity(count);
            for idx in 0..count {
                let value = row.get_ref(idx).map_err(|e| Error::Database(e.to_string()))?;
                values.push(to_value(value));
            }
            result.push(Row(values));
        }

        Ok(ResultSet::new(columns, result))
    }

    fn begin(&self) -> Result<()> {
        let mut inner = self.lock()?;
        let sql = if inner.depth == 0 {
            "BEGIN".to_string()
        } else {
            format!("SAVEPOINT {}", savepoint(inner.depth))
        };

        inner
            .conn
            .execute_batch(&sql)
            .map_err(|e| Error::Database(e.to_string()))?;
        inner.depth += 1;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.depth == 0 {
            return Err(Error::Transaction(
                "commit without an open transaction".to_string(),
            ));
        }

        let depth = inner.depth - 1;
        let sql = if depth == 0 {
            "COMMIT".to_string()
        } else {
            format!("RELEASE {}", savepoint(depth))
        };

        inner
            .conn
            .execute_batch(&sql)
            .map_err(|e| Error::Database(e.to_string()))?;
        inner.depth = depth;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.depth == 0 {
            return Err(Error::Transaction(
                "rollback without an open transaction".to_string(),
            ));
        }

        let depth = inner.depth - 1;
        let sql = if depth == 0 {
            "ROLLBACK".to_string()
        } else {
            let name = savepoint(depth);
            format!("ROLLBACK TO {name}; RELEASE {name}")
        };

        // The transaction is closed on our side even if SQLite already
        // rolled it back on its own
        inner.depth = depth;
        inner
            .conn
            .execute_batch(&sql)
            .map_err(|e| Error::Database(e.to_string()))
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let inner = self.lock()?;
        table_exists(&inner.conn, table)
    }
}

impl VersionStore for SqliteDatabase {
    fn current_version(&self) -> Result<Version> {
        let inner = self.lock()?;

        if !table_exists(&inner.conn, &self.version_table)? {
            self.create_version_table(&inner.conn)?;
            return Ok(0);
        }

        let sql = format!("SELECT version FROM {} LIMIT 1", self.version_table);
        let result = inner
            .conn
            .query_row(&sql, [], |row| row.get_ref(0).map(to_value));

        match result {
            Ok(value) => version_from_value(Some(&value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => version_from_value(None),
            Err(e) => Err(Error::Database(e.to_string())),
        }
    }

    fn set_version(&self, version: Version) -> Result<()> {
        let inner = self.lock()?;

        let sql = format!("UPDATE {} SET version = ?1", self.version_table);
        let updated = inner
            .conn
            .execute(&sql, params![version])
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated == 0 {
            return Err(Error::Database(format!(
                "version record missing from {}",
                self.version_table
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_table_created_on_first_read() {
        let db = SqliteDatabase::in_memory().unwrap();
        assert!(!db.table_exists("schema_info").unwrap());

        assert_eq!(db.current_version().unwrap(), 0);
        assert!(db.table_exists("schema_info").unwrap());

        let rs = db.query("SELECT version FROM schema_info").unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.value(0, "version"), Some(&Value::Integer(0)));

        // Idempotent
        assert_eq!(db.current_version().unwrap(), 0);
        assert_eq!(db.query("SELECT * FROM schema_info").unwrap().len(), 1);
    }

    #[test]
    fn test_set_version() {
        let db = SqliteDatabase::in_memory().unwrap();
        db.current_version().unwrap();

        db.set_version(5).unwrap();
        assert_eq!(db.current_version().unwrap(), 5);
    }

    #[test]
    fn test_empty_version_table() {
        let db = SqliteDatabase::in_memory().unwrap();
        db.execute("CREATE TABLE schema_info (version INTEGER)").unwrap();

        let err = db.current_version().unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.to_string().contains("unable to retrieve current schema version"));
        assert!(db.set_version(1).is_err());
    }

    #[test]
    fn test_corrupt_version_value() {
        let db = SqliteDatabase::in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE schema_info (version);
             INSERT INTO schema_info (version) VALUES ('three');",
        )
        .unwrap();

        assert!(matches!(db.current_version(), Err(Error::Database(_))));
    }

    #[test]
    fn test_custom_version_table() {
        let db = SqliteDatabase::in_memory()
            .unwrap()
            .with_version_table("app_schema")
            .unwrap();

        assert_eq!(db.version_table(), "app_schema");
        db.current_version().unwrap();
        assert!(db.table_exists("app_schema").unwrap());
        assert!(!db.table_exists("schema_info").unwrap());
    }

    #[test]
    fn test_invalid_version_table() {
        let result = SqliteDatabase::in_memory()
            .unwrap()
            .with_version_table("x; DROP TABLE users");
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_query_values() {
        let db = SqliteDatabase::in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE items (id INTEGER, name TEXT, price REAL, data BLOB, note TEXT);
             INSERT INTO items VALUES (1, 'widget', 2.5, x'0102', NULL);",
        )
        .unwrap();

        let rs = db.query("SELECT id, name, price, data, note FROM items").unwrap();
        assert_eq!(rs.columns, vec!["id", "name", "price", "data", "note"]);
        let row = rs.first().unwrap();
        assert_eq!(row.get_i64(0), Some(1));
        assert_eq!(row.get_str(1), Some("widget"));
        assert_eq!(row.get(2), Some(&Value::Real(2.5)));
        assert_eq!(row.get(3), Some(&Value::Blob(vec![1, 2])));
        assert!(row.get(4).unwrap().is_null());
    }

    #[test]
    fn test_execute_returns_affected_rows() {
        let db = SqliteDatabase::in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE t (id INTEGER);
             INSERT INTO t VALUES (1), (2), (3);",
        )
        .unwrap();

        assert_eq!(db.execute("DELETE FROM t WHERE id > 1").unwrap(), 2);
    }

    #[test]
    fn test_nested_transactions_use_savepoints() {
        let db = SqliteDatabase::in_memory().unwrap();

        db.begin().unwrap();
        db.execute("CREATE TABLE outer_t (id INTEGER)").unwrap();

        db.begin().unwrap();
        db.execute("CREATE TABLE inner_t (id INTEGER)").unwrap();
        assert_eq!(db.transaction_depth().unwrap(), 2);
        db.rollback().unwrap();

        db.begin().unwrap();
        db.execute("CREATE TABLE kept_t (id INTEGER)").unwrap();
        db.commit().unwrap();

        db.commit().unwrap();
        assert_eq!(db.transaction_depth().unwrap(), 0);
        assert!(db.table_exists("outer_t").unwrap());
        assert!(!db.table_exists("inner_t").unwrap());
        assert!(db.table_exists("kept_t").unwrap());
    }

    #[test]
    fn test_rollback_discards_ddl() {
        let db = SqliteDatabase::in_memory().unwrap();
        db.begin().unwrap();
        db.execute("CREATE TABLE temp_t (id INTEGER)").unwrap();
        db.rollback().unwrap();

        assert!(!db.table_exists("temp_t").unwrap());
    }

    #[test]
    fn test_unbalanced_transactions() {
        let db = SqliteDatabase::in_memory().unwrap();
        assert!(matches!(db.commit(), Err(Error::Transaction(_))));
        assert!(matches!(db.rollback(), Err(Error::Transaction(_))));
    }

    #[test]
    fn test_version_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");

        {
            let db = SqliteDatabase::open(&path).unwrap();
            db.current_version().unwrap();
            db.set_version(2).unwrap();
        }

        let db = SqliteDatabase::open(&path).unwrap();
        assert_eq!(db.current_version().unwrap(), 2);
    }
}
