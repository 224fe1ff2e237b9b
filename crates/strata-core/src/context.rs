//! Per-step migration context
//!
//! The migrator hands a `MigrationContext` to every `up`/`down` call. It
//! carries the database handle and the ordinal of the running step, plus the
//! helper operations steps are written against.

use std::cell::Cell;

use crate::database::{Database, ResultSet};
use crate::error::{Error, Result};
use crate::version::Version;

/// Callback receiving `diag` output as `(ordinal, message)`
pub type DiagHook = dyn Fn(Version, &str) + Send + Sync;

/// Capabilities available to a running migration step
pub struct MigrationContext<'a> {
    db: &'a dyn Database,
    ordinal: Version,
    diag: Option<&'a DiagHook>,
    open_transactions: Cell<u32>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(db: &'a dyn Database, ordinal: Version) -> Self {
        Self {
            db,
            ordinal,
            diag: None,
            open_transactions: Cell::new(0),
        }
    }

    pub(crate) fn with_diag(mut self, hook: Option<&'a DiagHook>) -> Self {
        self.diag = hook;
        self
    }

    /// Ordinal of the step this context was built for
    pub fn ordinal(&self) -> Version {
        self.ordinal
    }

    /// Ordinal zero-padded to three digits, as used in file names
    pub fn formatted_ordinal(&self) -> String {
        format!("{:03}", self.ordinal)
    }

    /// The underlying database handle
    pub fn database(&self) -> &'a dyn Database {
        self.db
    }

    /// Execute a statement, returning the number of affected rows
    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.db.execute(sql)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.db.execute_batch(sql)
    }

    pub fn query(&self, sql: &str) -> Result<ResultSet> {
        self.db.query(sql)
    }

    /// Open a sub-transaction nested inside the step's transaction
    pub fn begin(&self) -> Result<()> {
        self.db.begin()?;
        self.open_transactions.set(self.open_transactions.get() + 1);
        Ok(())
    }

    /// Commit the innermost sub-transaction opened by this step
    pub fn commit(&self) -> Result<()> {
        self.close_sub_transaction("commit")?;
        self.db.commit()
    }

    /// Roll back the innermost sub-transaction opened by this step
    pub fn rollback(&self) -> Result<()> {
        self.close_sub_transaction("rollback")?;
        self.db.rollback()
    }

    /// Number of sub-transactions this step opened and has not closed
    pub fn open_transactions(&self) -> u32 {
        self.open_transactions.get()
    }

    /// Emit an informational message about the running step
    pub fn diag(&self, text: &str) {
        tracing::info!(target: "strata::diag", "[{}] {}", self.formatted_ordinal(), text);
        if let Some(hook) = self.diag {
            hook(self.ordinal, text);
        }
    }

    /// Add a column to an existing table
    ///
    /// Best-effort helper: the statement is assembled by string
    /// concatenation and is neither escaped nor checked for portability
    /// across database products.
    pub fn add_column(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
        not_null: bool,
        default: Option<&str>,
    ) -> Result<usize> {
        let sql = add_column_sql(table, column, sql_type, not_null, default);
        self.execute(&sql)
    }

    fn close_sub_transaction(&self, action: &str) -> Result<()> {
        let open = self.open_transactions.get();
        if open == 0 {
            return Err(Error::Transaction(format!(
                "cannot {} in migration {}: no sub-transaction is open",
                action,
                self.formatted_ordinal()
            )));
        }
        self.open_transactions.set(open - 1);
        Ok(())
    }
}

/// Build an `ALTER TABLE ... ADD COLUMN` statement
///
/// Default values are quoted unless they look numeric.
pub fn add_column_sql(
    table: &str,
    column: &str,
    sql_type: &str,
    not_null: bool,
    default: Option<&str>,
) -> String {
    let mut sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, sql_type);
    if not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = default {
        if is_numeric_literal(default) {
            sql.push_str(&format!(" DEFAULT {}", default));
        } else {
            sql.push_str(&format!(" DEFAULT '{}'", default));
        }
    }
    sql
}

fn is_numeric_literal(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && value.parse::<f64>().is_ok()
}
