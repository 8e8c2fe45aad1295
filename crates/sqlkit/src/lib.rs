//! sqlkit - concurrency-safe SQLite access.
//!
//! sqlkit layers three things over the embedded engine:
//!
//! - Connections, prepared statements and row cursors with typed binding
//! - Transactions whose nesting is emulated with savepoints
//! - A dispatcher that runs every write on one dedicated thread and spreads
//!   reads over a fixed pool of reader threads
//!
//! # Quick Start
//!
//! ```rust
//! use sqlkit::prelude::*;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("heroes.db");
//! let mut dispatcher = WorkerDispatcher::create(path.to_str().unwrap(), 2).unwrap();
//!
//! // Writes always go to the single writer thread
//! let inserted = dispatcher
//!     .read_write_async(
//!         || ("Spider-Man".to_string(), 25),
//!         |ctx| {
//!             let conn = ctx.connection;
//!             conn.execute("create table hero(id integer primary key, name text, age integer)")?;
//!             conn.transaction(TransactionKind::Immediate, |tx| {
//!                 tx.execute_with("insert into hero(name, age) values (?, ?)", |p| {
//!                     p.bind(1, ctx.data.0)?;
//!                     p.bind(2, ctx.data.1)
//!                 })?;
//!                 Ok(TransactionOutcome::Commit)
//!             })
//!         },
//!     )
//!     .wait()
//!     .unwrap();
//! assert!(inserted.is_success());
//!
//! // Reads are spread over the reader threads
//! let heroes = dispatcher
//!     .read_async(|| (), |ctx| ctx.connection.query("select * from hero")?.collect_rows())
//!     .wait()
//!     .unwrap();
//! assert_eq!(heroes[0].get_named::<String>("name").unwrap(), "Spider-Man");
//!
//! dispatcher.close().unwrap();
//! ```
//!
//! # Crates
//!
//! - `sqlkit-core`: values, results, owned rows and the error type
//! - `sqlkit-sqlite`: the driver (`Connection`, `Statement`, `ResultSet`,
//!   `Transaction`)
//! - `sqlkit-pool`: `WorkerDispatcher` and `WorkerFuture`

pub use sqlkit_core::{
    ColumnError, ColumnErrorKind, ColumnInfo, ConnectionError, ConnectionErrorKind, Error,
    ExecutionResult, FromValue, QueryError, QueryErrorKind, Result, Row, TransactionKind,
    TransactionOutcome, TypeError, Value, WorkerError, WorkerErrorKind, quote_ident,
};
pub use sqlkit_pool::{DispatcherConfig, WorkerContext, WorkerDispatcher, WorkerFuture, WorkerId};
pub use sqlkit_sqlite::{
    ColumnIndex, Connection, ConnectionConfig, CursorState, JournalMode, MEMORY_PATH,
    ParameterBinder, ResultSet, Statement, Step, Transaction, engine_version,
    engine_version_number,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlkit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Connection, ConnectionConfig, Error, ExecutionResult, ParameterBinder, Result, ResultSet,
        Row, Transaction, TransactionKind, TransactionOutcome, Value, WorkerContext,
        WorkerDispatcher, WorkerFuture, WorkerId,
    };
}
