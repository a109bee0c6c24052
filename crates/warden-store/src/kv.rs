//! Process-scoped key/value table.
//!
//! Lives in the connection's `temp` schema, so it shares the store handle
//! but never reaches the database file. Values are opaque blobs.

use rusqlite::{params, Connection, OptionalExtension};

use crate::StoreError;

pub(crate) const CREATE_DATA_TABLE: &str =
    "CREATE TEMP TABLE IF NOT EXISTS data (key TEXT PRIMARY KEY NOT NULL, data BLOB NOT NULL);";

const SET: &str = "INSERT OR REPLACE INTO temp.data (key, data) VALUES (?1, ?2)";
const GET: &str = "SELECT data FROM temp.data WHERE key = ?1";
const TAKE: &str = "DELETE FROM temp.data WHERE key = ?1 RETURNING data";
const DELETE: &str = "DELETE FROM temp.data WHERE key = ?1";

/// View of the key/value table, borrowed from an open [`Store`](crate::Store).
#[derive(Debug, Clone, Copy)]
pub struct KvStore<'a> {
    conn: &'a Connection,
}

impl<'a> KvStore<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(SET)
            .map_err(|e| StoreError::statement(SET, e))?;
        stmt.execute(params![key, value])
            .map_err(|e| StoreError::statement(SET, e))?;
        Ok(())
    }

    /// Read the value under `key`.
    ///
    /// With `consume` the entry is deleted by the same statement that reads
    /// it, so a second consuming read reports `None`.
    pub fn get(&self, key: &str, consume: bool) -> Result<Option<Vec<u8>>, StoreError> {
        let sql = if consume { TAKE } else { GET };
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| StoreError::statement(sql, e))?;
        stmt.query_row(params![key], |row| row.get::<_, Vec<u8>>(0))
            .optional()
            .map_err(|e| StoreError::statement(sql, e))
    }

    /// Remove `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(DELETE)
            .map_err(|e| StoreError::statement(DELETE, e))?;
        let removed = stmt
            .execute(params![key])
            .map_err(|e| StoreError::statement(DELETE, e))?;
        Ok(removed > 0)
    }

    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(GET)
            .map_err(|e| StoreError::statement(GET, e))?;
        stmt.exists(params![key])
            .map_err(|e| StoreError::statement(GET, e))
    }
}
