//! In-memory database backend for testing
//!
//! `MemoryDatabase` does not interpret SQL. It records every statement it is
//! given and tracks which tables exist from `CREATE TABLE` / `DROP TABLE` /
//! `ALTER TABLE ... RENAME TO` statements, which is enough to observe what a
//! migration run did. Transactions snapshot that state and nest.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use crate::database::{Database, ResultSet, VersionStore};
use crate::error::{Error, Result};
use crate::version::Version;

const VERSION_TABLE: &str = "schema_info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionRecord {
    Missing,
    Empty,
    Stored(Version),
}

#[derive(Debug, Clone)]
struct State {
    tables: BTreeSet<String>,
    version: VersionRecord,
    statements: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    state: State,
    snapshots: Vec<State>,
    fail_on: Vec<String>,
}

/// In-memory database backend
///
/// Useful for testing steps and the migrator without a real database.
#[derive(Debug)]
pub struct MemoryDatabase {
    inner: Mutex<Inner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_record(VersionRecord::Missing)
    }

    /// A database whose version table exists but holds no row
    pub fn without_version_row() -> Self {
        let db = Self::with_record(VersionRecord::Empty);
        db.lock_state().tables.insert(VERSION_TABLE.to_string());
        db
    }

    /// A database already at `version`
    pub fn at_version(version: Version) -> Self {
        let db = Self::with_record(VersionRecord::Stored(version));
        db.lock_state().tables.insert(VERSION_TABLE.to_string());
        db
    }

    /// Make every statement containing `pattern` fail
    pub fn failing_on(self, pattern: impl Into<String>) -> Self {
        self.lock().fail_on.push(pattern.into());
        self
    }

    /// Statements executed so far, excluding rolled back ones
    pub fn statements(&self) -> Vec<String> {
        self.lock().state.statements.clone()
    }

    /// Names of the tables that currently exist
    pub fn tables(&self) -> Vec<String> {
        self.lock().state.tables.iter().cloned().collect()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().state.tables.contains(&table.to_lowercase())
    }

    /// Stored version without creating the record
    pub fn stored_version(&self) -> Option<Version> {
        match self.lock().state.version {
            VersionRecord::Stored(version) => Some(version),
            _ => None,
        }
    }

    /// Number of transactions currently open
    pub fn transaction_depth(&self) -> usize {
        self.lock().snapshots.len()
    }

    fn with_record(version: VersionRecord) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State {
                    tables: BTreeSet::new(),
                    version,
                    statements: Vec::new(),
                },
                snapshots: Vec::new(),
                fail_on: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_state(&self) -> StateGuard<'_> {
        StateGuard(self.lock())
    }

    fn record(&self, sql: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(pattern) = inner.fail_on.iter().find(|p| sql.contains(p.as_str())) {
            return Err(Error::Database(format!(
                "statement matching '{}' failed: {}",
                pattern, sql
            )));
        }

        apply_ddl(&mut inner.state.tables, sql);
        inner.state.statements.push(sql.trim().to_string());
        Ok(())
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

struct StateGuard<'a>(MutexGuard<'a, Inner>);

impl std::ops::Deref for StateGuard<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        &self.0.state
    }
}

impl std::ops::DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut State {
        &mut self.0.state
    }
}

impl Database for MemoryDatabase {
    fn execute(&self, sql: &str) -> Result<usize> {
        self.record(sql)?;
        Ok(0)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.record(statement)?;
        }
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<ResultSet> {
        self.record(sql)?;
        Ok(ResultSet::default())
    }

    fn begin(&self) -> Result<()> {
        let mut inner = self.lock();
        let snapshot = inner.state.clone();
        inner.snapshots.push(snapshot);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.lock();
        inner
            .snapshots
            .pop()
            .map(|_| ())
            .ok_or_else(|| Error::Transaction("commit without an open transaction".to_string()))
    }

    fn rollback(&self) -> Result<()> {
        let mut inner = self.lock();
        let snapshot = inner
            .snapshots
            .pop()
            .ok_or_else(|| Error::Transaction("rollback without an open transaction".to_string()))?;
        inner.state = snapshot;
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.has_table(table))
    }
}

impl VersionStore for MemoryDatabase {
    fn current_version(&self) -> Result<Version> {
        let mut state = self.lock_state();
        match state.version {
            VersionRecord::Stored(version) => Ok(version),
            VersionRecord::Empty => Err(Error::Database(
                "unable to retrieve current schema version".to_string(),
            )),
            VersionRecord::Missing => {
                tracing::debug!("Creating version record at 0");
                state.tables.insert(VERSION_TABLE.to_string());
                state.version = VersionRecord::Stored(0);
                Ok(0)
            }
        }
    }

    fn set_version(&self, version: Version) -> Result<()> {
        let mut state = self.lock_state();
        match state.version {
            VersionRecord::Missing => Err(Error::Database(format!(
                "no such table: {}",
                VERSION_TABLE
            ))),
            VersionRecord::Empty => Err(Error::Database(format!(
                "version record missing from {}",
                VERSION_TABLE
            ))),
            VersionRecord::Stored(_) => {
                state.version = VersionRecord::Stored(version);
                Ok(())
            }
        }
    }
}

/// Track table creation, removal and renames
fn apply_ddl(tables: &mut BTreeSet<String>, sql: &str) {
    let tokens: Vec<String> = sql.split_whitespace().map(str::to_lowercase).collect();
    let words: Vec<&str> = tokens.iter().map(String::as_str).collect();

    match words.as_slice() {
        ["create", "table", "if", "not", "exists", name, ..] | ["create", "table", name, ..] => {
            tables.insert(table_name(name));
        }
        ["drop", "table", "if", "exists", name, ..] | ["drop", "table", name, ..] => {
            tables.remove(&table_name(name));
        }
        ["alter", "table", from, "rename", "to", to, ..] => {
            if tables.remove(&table_name(from)) {
                tables.insert(table_name(to));
            }
        }
        _ => {}
    }
}

fn table_name(token: &str) -> String {
    token
        .split('(')
        .next()
        .unwrap_or(token)
        .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']' | ';'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_database_tracks_tables() {
        let db = MemoryDatabase::new();

        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)").unwrap();
        db.execute("CREATE TABLE IF NOT EXISTS posts(id INTEGER)").unwrap();
        assert!(db.table_exists("users").unwrap());
        assert!(db.has_table("posts"));

        db.execute("ALTER TABLE posts RENAME TO articles").unwrap();
        assert!(!db.has_table("posts"));
        assert!(db.has_table("articles"));

        db.execute("DROP TABLE users").unwrap();
        assert!(!db.has_table("users"));
        assert_eq!(db.statements().len(), 4);
    }

    #[test]
    fn test_execute_batch_splits_statements() {
        let db = MemoryDatabase::new();
        db.execute_batch("CREATE TABLE a (id INTEGER);\n\nCREATE TABLE b (id INTEGER);")
            .unwrap();

        assert_eq!(db.tables(), vec!["a", "b"]);
        assert_eq!(db.statements().len(), 2);
    }

    #[test]
    fn test_nested_rollback_restores_state() {
        let db = MemoryDatabase::new();
        db.begin().unwrap();
        db.execute("CREATE TABLE kept (id INTEGER)").unwrap();

        db.begin().unwrap();
        db.execute("CREATE TABLE dropped (id INTEGER)").unwrap();
        db.rollback().unwrap();

        db.commit().unwrap();
        assert!(db.has_table("kept"));
        assert!(!db.has_table("dropped"));
        assert_eq!(db.transaction_depth(), 0);
    }

    #[test]
    fn test_unbalanced_commit_fails() {
        let db = MemoryDatabase::new();
        assert!(matches!(db.commit(), Err(Error::Transaction(_))));
        assert!(matches!(db.rollback(), Err(Error::Transaction(_))));
    }

    #[test]
    fn test_failing_statement() {
        let db = MemoryDatabase::new().failing_on("broken");
        assert!(matches!(
            db.execute("UPDATE broken SET x = 1"),
            Err(Error::Database(_))
        ));
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_version_record_initializes_once() {
        let db = MemoryDatabase::new();
        assert_eq!(db.stored_version(), None);
        assert!(db.set_version(1).is_err());

        assert_eq!(db.current_version().unwrap(), 0);
        assert_eq!(db.stored_version(), Some(0));
        assert!(db.has_table("schema_info"));

        db.set_version(2).unwrap();
        assert_eq!(db.current_version().unwrap(), 2);
    }

    #[test]
    fn test_empty_version_table_is_an_error() {
        let db = MemoryDatabase::without_version_row();
        assert!(matches!(db.current_version(), Err(Error::Database(_))));
        assert!(db.set_version(1).is_err());
    }

    #[test]
    fn test_version_rolls_back_with_transaction() {
        let db = MemoryDatabase::at_version(1);
        db.begin().unwrap();
        db.set_version(2).unwrap();
        db.rollback().unwrap();
        assert_eq!(db.current_version().unwrap(), 1);
    }
}
