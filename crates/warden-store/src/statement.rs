//! Prepared statements.
//!
//! [`PreparedStatement`] is the engine-neutral surface the rest of the
//! workspace programs against; [`SqliteStatement`] is the only
//! implementation and is obtained from [`Store::prepare`](crate::Store::prepare).
//!
//! # Reuse
//!
//! A statement must be [`reset`](PreparedStatement::reset) before it is
//! reused for a new invocation. The first [`step`](PreparedStatement::step)
//! after a reset runs the statement with whatever parameters are bound at
//! that moment; binding new parameters afterwards without a reset does not
//! re-run it, and further steps keep returning the rows of the earlier run.
//! That is a caller error and is not detected.
//!
//! ```
//! use warden_store::{PreparedStatement, Step, Store};
//!
//! let mut store = Store::new();
//! store.open_in_memory().unwrap();
//! store.execute("CREATE TABLE t (x INTEGER)").unwrap();
//!
//! let mut insert = store.prepare("INSERT INTO t VALUES (?1)").unwrap();
//! for x in 0..3 {
//!     insert.bind_i32(1, x).unwrap();
//!     assert_eq!(insert.step().unwrap(), Step::Done);
//!     insert.reset(false).unwrap();
//! }
//! ```

use std::collections::VecDeque;

use rusqlite::types::{Null, Value};
use rusqlite::{Statement, ToSql};

use crate::store::{value_to_text, ExecOutcome, RowControl, TextRow};
use crate::StoreError;

/// Result of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A row is available through the column readers.
    Row,
    /// The statement has no more rows.
    Done,
}

/// A compiled, reusable statement.
///
/// Parameters are bound by 1-based position, columns are read by 0-based
/// index. Column readers coerce between storage classes the way SQLite's
/// own accessors do: NULL reads as zero for numbers and `None` for text and
/// blobs, unparseable text reads as zero.
pub trait PreparedStatement {
    fn bind_text(&mut self, index: usize, value: &str) -> Result<(), StoreError>;
    fn bind_i32(&mut self, index: usize, value: i32) -> Result<(), StoreError>;
    fn bind_i64(&mut self, index: usize, value: i64) -> Result<(), StoreError>;
    fn bind_f64(&mut self, index: usize, value: f64) -> Result<(), StoreError>;
    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<(), StoreError>;
    fn bind_null(&mut self, index: usize) -> Result<(), StoreError>;

    /// Booleans are stored as the integers 0 and 1.
    fn bind_bool(&mut self, index: usize, value: bool) -> Result<(), StoreError> {
        self.bind_i32(index, i32::from(value))
    }

    /// Advance to the next row.
    fn step(&mut self) -> Result<Step, StoreError>;

    /// Step until done, handing each row to `on_row` as text.
    ///
    /// Aborting leaves the statement positioned after the aborted row;
    /// reset it before reuse.
    fn step_all(
        &mut self,
        on_row: &mut dyn FnMut(&TextRow<'_>) -> RowControl,
    ) -> Result<ExecOutcome, StoreError> {
        let names: Vec<String> = (0..self.column_count())
            .map(|i| self.column_name(i).unwrap_or_default().to_string())
            .collect();

        while self.step()? == Step::Row {
            let values = (0..names.len())
                .map(|i| self.column_text(i))
                .collect::<Result<Vec<_>, _>>()?;
            if on_row(&TextRow::new(&names, &values)) == RowControl::Abort {
                return Ok(ExecOutcome::Aborted);
            }
        }

        Ok(ExecOutcome::Completed)
    }

    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> Option<&str>;

    fn column_text(&self, index: usize) -> Result<Option<String>, StoreError>;
    fn column_i64(&self, index: usize) -> Result<i64, StoreError>;
    fn column_f64(&self, index: usize) -> Result<f64, StoreError>;
    fn column_blob(&self, index: usize) -> Result<Option<Vec<u8>>, StoreError>;

    /// Truncates like SQLite's 32-bit accessor.
    fn column_i32(&self, index: usize) -> Result<i32, StoreError> {
        Ok(self.column_i64(index)? as i32)
    }

    fn column_bool(&self, index: usize) -> Result<bool, StoreError> {
        Ok(self.column_i64(index)? != 0)
    }

    /// Make the statement ready for a new invocation, optionally dropping
    /// every bound parameter.
    fn reset(&mut self, clear_bindings: bool) -> Result<(), StoreError>;

    /// Set every parameter back to NULL.
    fn clear_bindings(&mut self) -> Result<(), StoreError>;
}

/// SQLite-backed [`PreparedStatement`].
///
/// Borrows the [`Store`](crate::Store) it came from, so it cannot outlive
/// the connection.
pub struct SqliteStatement<'conn> {
    stmt: Statement<'conn>,
    sql: String,
    columns: Vec<String>,
    pending: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    executed: bool,
}

impl<'conn> SqliteStatement<'conn> {
    pub(crate) fn new(stmt: Statement<'conn>, sql: &str) -> Self {
        let columns = stmt.column_names().iter().map(|n| n.to_string()).collect();
        Self {
            stmt,
            sql: sql.to_string(),
            columns,
            pending: VecDeque::new(),
            current: None,
            executed: false,
        }
    }

    fn bind<T: ToSql>(&mut self, index: usize, value: T) -> Result<(), StoreError> {
        self.stmt
            .raw_bind_parameter(index, value)
            .map_err(|e| StoreError::statement(&self.sql, e))
    }

    fn run(&mut self) -> Result<(), StoreError> {
        self.executed = true;
        let width = self.columns.len();
        let mut rows = self.stmt.raw_query();

        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => return Ok(()),
                Err(e) => return Err(StoreError::statement(&self.sql, e)),
            };

            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                let value = row
                    .get_ref(index)
                    .map_err(|e| StoreError::statement(&self.sql, e))?;
                values.push(Value::from(value));
            }
            self.pending.push_back(values);
        }
    }

    fn value(&self, index: usize) -> Result<&Value, StoreError> {
        let row = self.current.as_ref().ok_or(StoreError::NoRow)?;
        row.get(index).ok_or(StoreError::ColumnOutOfRange(index))
    }
}

impl PreparedStatement for SqliteStatement<'_> {
    fn bind_text(&mut self, index: usize, value: &str) -> Result<(), StoreError> {
        self.bind(index, value)
    }

    fn bind_i32(&mut self, index: usize, value: i32) -> Result<(), StoreError> {
        self.bind(index, value)
    }

    fn bind_i64(&mut self, index: usize, value: i64) -> Result<(), StoreError> {
        self.bind(index, value)
    }

    fn bind_f64(&mut self, index: usize, value: f64) -> Result<(), StoreError> {
        self.bind(index, value)
    }

    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<(), StoreError> {
        self.bind(index, value)
    }

    fn bind_null(&mut self, index: usize) -> Result<(), StoreError> {
        self.bind(index, Null)
    }

    fn step(&mut self) -> Result<Step, StoreError> {
        if !self.executed {
            self.run()?;
        }

        self.current = self.pending.pop_front();
        Ok(if self.current.is_some() {
            Step::Row
        } else {
            Step::Done
        })
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    fn column_text(&self, index: usize) -> Result<Option<String>, StoreError> {
        Ok(value_to_text(self.value(index)?.into()))
    }

    fn column_i64(&self, index: usize) -> Result<i64, StoreError> {
        Ok(match self.value(index)? {
            Value::Null => 0,
            Value::Integer(i) => *i,
            Value::Real(f) => *f as i64,
            Value::Text(t) => t.trim().parse().unwrap_or(0),
            Value::Blob(b) => String::from_utf8_lossy(b).trim().parse().unwrap_or(0),
        })
    }

    fn column_f64(&self, index: usize) -> Result<f64, StoreError> {
        Ok(match self.value(index)? {
            Value::Null => 0.0,
            Value::Integer(i) => *i as f64,
            Value::Real(f) => *f,
            Value::Text(t) => t.trim().parse().unwrap_or(0.0),
            Value::Blob(b) => String::from_utf8_lossy(b).trim().parse().unwrap_or(0.0),
        })
    }

    fn column_blob(&self, index: usize) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(match self.value(index)? {
            Value::Null => None,
            Value::Blob(b) => Some(b.clone()),
            Value::Text(t) => Some(t.as_bytes().to_vec()),
            Value::Integer(i) => Some(i.to_string().into_bytes()),
            Value::Real(f) => Some(f.to_string().into_bytes()),
        })
    }

    fn reset(&mut self, clear_bindings: bool) -> Result<(), StoreError> {
        self.pending.clear();
        self.current = None;
        self.executed = false;
        if clear_bindings {
            self.clear_bindings()?;
        }
        Ok(())
    }

    fn clear_bindings(&mut self) -> Result<(), StoreError> {
        for index in 1..=self.stmt.parameter_count() {
            self.bind(index, Null)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .field("executed", &self.executed)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn store_with_table() -> Store {
        let mut store = Store::new();
        store.open_in_memory().unwrap();
        store
            .execute(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL, flag INTEGER, raw BLOB)",
            )
            .unwrap();
        store
    }

    #[test]
    fn test_bind_and_read_every_type() {
        let store = store_with_table();

        let mut insert = store
            .prepare("INSERT INTO t (id, name, score, flag, raw) VALUES (?1, ?2, ?3, ?4, ?5)")
            .unwrap();
        insert.bind_i64(1, 7).unwrap();
        insert.bind_text(2, "alice").unwrap();
        insert.bind_f64(3, 2.5).unwrap();
        insert.bind_bool(4, true).unwrap();
        insert.bind_blob(5, &[0xde, 0xad]).unwrap();
        assert_eq!(insert.step().unwrap(), Step::Done);

        let mut select = store
            .prepare("SELECT id, name, score, flag, raw FROM t WHERE id = ?1")
            .unwrap();
        select.bind_i32(1, 7).unwrap();
        assert_eq!(select.step().unwrap(), Step::Row);

        assert_eq!(select.column_count(), 5);
        assert_eq!(select.column_name(1), Some("name"));
        assert_eq!(select.column_i64(0).unwrap(), 7);
        assert_eq!(select.column_i32(0).unwrap(), 7);
        assert_eq!(select.column_text(1).unwrap().as_deref(), Some("alice"));
        assert_eq!(select.column_f64(2).unwrap(), 2.5);
        assert!(select.column_bool(3).unwrap());
        assert_eq!(select.column_blob(4).unwrap(), Some(vec![0xde, 0xad]));

        assert_eq!(select.step().unwrap(), Step::Done);
    }

    #[test]
    fn test_null_coercion() {
        let store = store_with_table();
        store.execute("INSERT INTO t (id) VALUES (1)").unwrap();

        let mut select = store.prepare("SELECT name, score, flag, raw FROM t").unwrap();
        assert_eq!(select.step().unwrap(), Step::Row);
        assert_eq!(select.column_text(0).unwrap(), None);
        assert_eq!(select.column_f64(1).unwrap(), 0.0);
        assert!(!select.column_bool(2).unwrap());
        assert_eq!(select.column_blob(3).unwrap(), None);
    }

    #[test]
    fn test_bind_null() {
        let store = store_with_table();
        let mut insert = store.prepare("INSERT INTO t (id, name) VALUES (1, ?1)").unwrap();
        insert.bind_null(1).unwrap();
        insert.step().unwrap();

        let mut count = store
            .prepare("SELECT COUNT(*) FROM t WHERE name IS NULL")
            .unwrap();
        count.step().unwrap();
        assert_eq!(count.column_i64(0).unwrap(), 1);
    }

    #[test]
    fn test_column_reads_need_a_row() {
        let store = store_with_table();
        let mut select = store.prepare("SELECT id FROM t").unwrap();
        assert!(matches!(select.column_i64(0), Err(StoreError::NoRow)));

        assert_eq!(select.step().unwrap(), Step::Done);
        assert!(matches!(select.column_i64(0), Err(StoreError::NoRow)));
    }

    #[test]
    fn test_column_out_of_range() {
        let store = store_with_table();
        let mut select = store.prepare("SELECT 1").unwrap();
        select.step().unwrap();
        assert!(matches!(
            select.column_i64(3),
            Err(StoreError::ColumnOutOfRange(3))
        ));
    }

    #[test]
    fn test_bad_parameter_index_is_reported() {
        let store = store_with_table();
        let mut select = store.prepare("SELECT id FROM t WHERE id = ?1").unwrap();
        assert!(matches!(
            select.bind_i32(2, 1),
            Err(StoreError::Statement { .. })
        ));
    }

    #[test]
    fn test_step_error_is_reported() {
        let store = store_with_table();
        store.execute("INSERT INTO t (id) VALUES (1)").unwrap();

        let mut insert = store.prepare("INSERT INTO t (id) VALUES (?1)").unwrap();
        insert.bind_i32(1, 1).unwrap();
        assert!(matches!(insert.step(), Err(StoreError::Statement { .. })));
    }

    #[test]
    fn test_reset_and_reuse() {
        let store = store_with_table();
        let mut insert = store.prepare("INSERT INTO t (id, name) VALUES (?1, ?2)").unwrap();
        for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            insert.bind_i32(1, id).unwrap();
            insert.bind_text(2, name).unwrap();
            assert_eq!(insert.step().unwrap(), Step::Done);
            insert.reset(false).unwrap();
        }

        let mut names = Vec::new();
        let mut select = store.prepare("SELECT name FROM t ORDER BY id").unwrap();
        let outcome = select
            .step_all(&mut |row| {
                names.push(row.value(0).unwrap_or_default().to_string());
                RowControl::Continue
            })
            .unwrap();
        assert_eq!(outcome, ExecOutcome::Completed);
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_reset_with_clear_bindings() {
        let store = store_with_table();
        store.execute("INSERT INTO t (id, name) VALUES (1, 'a')").unwrap();

        let mut select = store.prepare("SELECT COUNT(*) FROM t WHERE id = ?1").unwrap();
        select.bind_i32(1, 1).unwrap();
        select.step().unwrap();
        assert_eq!(select.column_i64(0).unwrap(), 1);

        // cleared parameter is NULL and matches nothing
        select.reset(true).unwrap();
        select.step().unwrap();
        assert_eq!(select.column_i64(0).unwrap(), 0);
    }

    #[test]
    fn test_step_all_abort() {
        let store = store_with_table();
        store
            .execute("INSERT INTO t (id) VALUES (1), (2), (3)")
            .unwrap();

        let mut seen = 0;
        let mut select = store.prepare("SELECT id FROM t").unwrap();
        let outcome = select
            .step_all(&mut |_| {
                seen += 1;
                if seen == 2 {
                    RowControl::Abort
                } else {
                    RowControl::Continue
                }
            })
            .unwrap();
        assert_eq!(outcome, ExecOutcome::Aborted);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_text_coerces_to_numbers() {
        let store = store_with_table();
        let mut select = store.prepare("SELECT '42', 'nope', 3.9").unwrap();
        select.step().unwrap();
        assert_eq!(select.column_i64(0).unwrap(), 42);
        assert_eq!(select.column_i64(1).unwrap(), 0);
        assert_eq!(select.column_i32(2).unwrap(), 3);
    }
}
