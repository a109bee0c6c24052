//! Embedded persistent store for Warden.
//!
//! This crate provides:
//! - [`Store`]: lifecycle-managed handle to a single SQLite database file
//! - Arbitrary statement execution with per-row callbacks and early abort
//! - The [`PreparedStatement`] trait and its SQLite implementation
//! - [`KvStore`]: a process-scoped key to blob table living in the `temp`
//!   schema of the same connection
//!
//! # Threading
//!
//! The connection is opened without SQLite's internal mutex and the
//! [`Store`] is `!Sync`; all access happens from one thread. Share it
//! between workers only behind an exclusive lock.

#![forbid(unsafe_code)]

pub mod error;
pub mod kv;
pub mod statement;
pub mod store;

pub use error::StoreError;
pub use kv::KvStore;
pub use statement::{PreparedStatement, SqliteStatement, Step};
pub use store::{ExecOutcome, RowControl, Store, TextRow};
