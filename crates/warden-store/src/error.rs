//! Store error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store was never opened, failed to open, or has been closed.
    #[error("store is not open")]
    Unavailable,

    #[error("failed to open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// An engine error while running a statement.
    #[error("SQL error: {source} (statement: {statement})")]
    Statement {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("statement text is empty")]
    EmptyStatement,

    #[error("statement has no current row")]
    NoRow,

    #[error("column {0} is out of range")]
    ColumnOutOfRange(usize),

    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),
}

impl StoreError {
    pub(crate) fn statement(statement: &str, source: rusqlite::Error) -> Self {
        tracing::error!(
            code = ?source.sqlite_error_code(),
            statement,
            "SQL error: {source}"
        );
        Self::Statement {
            statement: statement.to_string(),
            source,
        }
    }
}
