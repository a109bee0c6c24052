//! Database handle lifecycle and ad-hoc statement execution.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, OpenFlags};
use tracing::{error, info, warn};

use crate::kv::{KvStore, CREATE_DATA_TABLE};
use crate::statement::SqliteStatement;
use crate::StoreError;

/// Returned by row callbacks to keep going or stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowControl {
    Continue,
    Abort,
}

/// How a statement run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Every statement ran to completion.
    Completed,
    /// A row callback asked to stop. Rows seen before the abort were
    /// processed; later statements in the same text were not run.
    Aborted,
}

/// One result row rendered as text, the way it reaches row callbacks.
#[derive(Debug, Clone, Copy)]
pub struct TextRow<'a> {
    names: &'a [String],
    values: &'a [Option<String>],
}

impl<'a> TextRow<'a> {
    pub(crate) fn new(names: &'a [String], values: &'a [Option<String>]) -> Self {
        Self { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &'a [String] {
        self.names
    }

    pub fn values(&self) -> &'a [Option<String>] {
        self.values
    }

    /// Value at `index`; `None` for NULL or out of range.
    pub fn value(&self, index: usize) -> Option<&'a str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Value of the column called `name`.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        let index = self.names.iter().position(|n| n == name)?;
        self.value(index)
    }
}

pub(crate) fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Handle to the local database file.
///
/// Starts closed. [`Store::open`] and [`Store::close`] are both idempotent,
/// and every operation on a closed store fails with
/// [`StoreError::Unavailable`] instead of panicking.
#[derive(Debug, Default)]
pub struct Store {
    conn: Option<Connection>,
}

impl Store {
    pub fn new() -> Self {
        Self { conn: None }
    }

    /// Open the database file at `path`. No-op when already open.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, open_flags()).map_err(|source| {
            error!(
                "couldn't open database file '{}': {source}; database support will be unavailable",
                path.display()
            );
            StoreError::Open {
                path: path.display().to_string(),
                source,
            }
        })?;

        self.install(conn)?;
        info!("loaded database file {}", path.display());
        Ok(())
    }

    /// Open a private in-memory database. No-op when already open.
    pub fn open_in_memory(&mut self) -> Result<(), StoreError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let conn =
            Connection::open_in_memory_with_flags(open_flags()).map_err(|source| StoreError::Open {
                path: ":memory:".to_string(),
                source,
            })?;
        self.install(conn)
    }

    fn install(&mut self, conn: Connection) -> Result<(), StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| StoreError::statement("PRAGMA foreign_keys = ON", e))?;
        conn.execute_batch(CREATE_DATA_TABLE)
            .map_err(|e| StoreError::statement(CREATE_DATA_TABLE, e))?;

        self.conn = Some(conn);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Release cached statements and close the connection. No-op when
    /// not open.
    ///
    /// Statements handed out by [`Store::prepare`] borrow the store, so
    /// they are always gone by the time this runs.
    pub fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        conn.flush_prepared_statement_cache();
        if let Err((_conn, e)) = conn.close() {
            warn!("error while closing database: {e}");
        }
    }

    pub(crate) fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Unavailable)
    }

    /// Run `sql`, which may contain several `;`-separated statements,
    /// discarding any rows.
    pub fn execute(&self, sql: &str) -> Result<ExecOutcome, StoreError> {
        self.execute_with(sql, |_| RowControl::Continue)
    }

    /// Run `sql`, handing every result row to `on_row`.
    ///
    /// Engine errors are logged with the statement text and returned.
    /// Rows already delivered before an error or abort stay delivered.
    pub fn execute_with<F>(&self, sql: &str, mut on_row: F) -> Result<ExecOutcome, StoreError>
    where
        F: FnMut(&TextRow<'_>) -> RowControl,
    {
        let conn = self.conn()?;
        let mut batch = Batch::new(conn, sql);

        while let Some(stmt) = batch.next().map_err(|e| StoreError::statement(sql, e))? {
            let mut stmt = stmt;
            let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
            let mut rows = stmt.raw_query();

            while let Some(row) = rows.next().map_err(|e| StoreError::statement(sql, e))? {
                let mut values = Vec::with_capacity(names.len());
                for index in 0..names.len() {
                    let value = row
                        .get_ref(index)
                        .map_err(|e| StoreError::statement(sql, e))?;
                    values.push(value_to_text(value));
                }

                if on_row(&TextRow::new(&names, &values)) == RowControl::Abort {
                    return Ok(ExecOutcome::Aborted);
                }
            }
        }

        Ok(ExecOutcome::Completed)
    }

    /// Compile `sql` into a reusable statement.
    pub fn prepare(&self, sql: &str) -> Result<SqliteStatement<'_>, StoreError> {
        if sql.trim().is_empty() {
            return Err(StoreError::EmptyStatement);
        }
        let conn = self.conn()?;
        let stmt = conn
            .prepare(sql)
            .map_err(|e| StoreError::statement(sql, e))?;
        Ok(SqliteStatement::new(stmt, sql))
    }

    /// The process-scoped key/value table.
    pub fn kv(&self) -> Result<KvStore<'_>, StoreError> {
        Ok(KvStore::new(self.conn()?))
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI
}
