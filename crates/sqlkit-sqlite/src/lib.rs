//! SQLite driver for sqlkit.
//!
// FFI bindings require unsafe code
#![allow(unsafe_code)]
//!
//! Thin, safe wrappers over the native engine: a [`Connection`] owning one
//! database handle, prepared [`Statement`]s that borrow it, a forward-only
//! [`ResultSet`] cursor, and [`Transaction`]s that emulate nesting with
//! savepoints.
//!
//! # Example
//!
//! ```rust
//! use sqlkit_sqlite::Connection;
//! use sqlkit_core::{ExecutionResult, TransactionKind, TransactionOutcome};
//!
//! let conn = Connection::open_memory().unwrap();
//! conn.execute("create table foo(id integer primary key, n integer)").unwrap();
//!
//! let inserted = conn
//!     .execute_with("insert into foo(n) values (?)", |p| p.bind(1, 5))
//!     .unwrap();
//! assert_eq!(
//!     inserted,
//!     ExecutionResult::Modification { last_insert_rowid: 1, changed_rows: 1 }
//! );
//!
//! conn.transaction(TransactionKind::Deferred, |tx| {
//!     tx.execute("update foo set n = n + 1")?;
//!     Ok(TransactionOutcome::Commit)
//! })
//! .unwrap();
//!
//! let mut rows = conn.query("select n from foo where id = 1").unwrap();
//! assert!(rows.next().unwrap());
//! assert_eq!(rows.int("n").unwrap(), Some(6));
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `i64` (`Value::Integer`) | INTEGER |
//! | `f64` (`Value::Real`) | REAL |
//! | `String` (`Value::Text`) | TEXT |
//! | `Vec<u8>` (`Value::Blob`) | BLOB |
//! | `Option<T>` (`Value::Null`) | NULL or T |
//!
//! # Thread Safety
//!
//! `Connection` is `Send` but not `Sync`: move it to the thread that will
//! use it. Statements, cursors and transactions borrow the connection and
//! are neither.

pub mod connection;
pub mod ffi;
pub mod params;
pub mod result_set;
pub mod statement;
pub mod transaction;
pub mod types;

pub use connection::{Connection, ConnectionConfig, JournalMode, MEMORY_PATH};
pub use params::ParameterBinder;
pub use result_set::{ColumnIndex, CursorState, ResultSet};
pub use statement::{Statement, Step};
pub use transaction::Transaction;

/// Version string of the linked SQLite library.
pub fn engine_version() -> &'static str {
    ffi::version()
}

/// Version number of the linked SQLite library (`3XXXYYY`).
pub fn engine_version_number() -> i32 {
    ffi::version_number()
}
