//! SQLite connection implementation.
//!
//! A [`Connection`] owns one native database handle. It is `Send` so it can
//! be moved onto the worker thread that will use it, but not `Sync`:
//! statements and result sets borrow it, so they cannot outlive it or leave
//! the thread it lives on.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::result_large_err)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::params::ParameterBinder;
use crate::result_set::ResultSet;
use crate::statement::Statement;
use crate::transaction::Transaction;
use sqlkit_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use sqlkit_core::{Error, ExecutionResult, Result, TransactionKind, TransactionOutcome};
use std::ffi::{CStr, CString, c_int};
use std::fmt;
use std::ptr;

/// Path that opens a private, transient in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Journal modes accepted by `PRAGMA journal_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    /// Write-ahead log: readers never block the writer
    Wal,
    Off,
}

impl JournalMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open with `SQLITE_OPEN_READONLY` instead of read-write + create.
    pub read_only: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Journal mode applied after opening. Ignored for read-only connections.
    pub journal_mode: Option<JournalMode>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            read_only: false,
            busy_timeout_ms: 5000,
            journal_mode: None,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Open for reading only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Set the journal mode applied on open.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = Some(mode);
        self
    }
}

/// A connection to a SQLite database.
pub struct Connection {
    db: *mut ffi::sqlite3,
    path: String,
    read_only: bool,
    open: bool,
}

// SAFETY: the handle is opened in SQLite's default serialized mode and a
// Connection is only ever used by the thread that currently owns it. It is
// deliberately not Sync.
unsafe impl Send for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a database at `path`, creating it unless `read_only` is set.
    pub fn open(path: impl Into<String>, read_only: bool) -> Result<Self> {
        Self::open_with(&ConnectionConfig::file(path).read_only(read_only))
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open_with(&ConnectionConfig::memory())
    }

    /// Open a new SQLite connection with the given configuration.
    #[tracing::instrument(level = "debug", skip(config), fields(path = %config.path, read_only = config.read_only))]
    pub fn open_with(config: &ConnectionConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Open,
                code: None,
                path: Some(config.path.clone()),
                message: "Invalid path: contains null byte".to_string(),
            })
        })?;

        let flags = if config.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        };
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid even when open failed, and must be closed
                unsafe {
                    let (_, msg) = ffi::last_error(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Open,
                code: Some(rc),
                path: Some(config.path.clone()),
                message: format!("Failed to open database: {}", message),
            }));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, ms);
            }
        }

        let conn = Self {
            db,
            path: config.path.clone(),
            read_only: config.read_only,
            open: true,
        };

        if !config.read_only {
            if let Some(mode) = config.journal_mode {
                conn.apply_journal_mode(mode)?;
            }
        }

        tracing::debug!("database opened");
        Ok(conn)
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Is an explicit transaction currently active on this connection?
    pub fn in_transaction(&self) -> bool {
        // SAFETY: db is valid while open
        self.open && unsafe { ffi::sqlite3_get_autocommit(self.db) } == 0
    }

    /// Close the connection.
    ///
    /// Closing twice is a no-op. If the engine refuses because statements
    /// are still attached (which safe code cannot cause, only a leaked
    /// `Statement` or `ResultSet` can), every attached statement is
    /// finalized and the close is retried exactly once. Dropping an open
    /// connection closes it the same way.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }

        // SAFETY: db is valid while open
        let mut rc = unsafe { ffi::sqlite3_close(self.db) };
        if sqlkit_core::error::is_busy_code(rc) {
            // SAFETY: db is still open because the close was refused
            let reclaimed = unsafe { finalize_attached(self.db) };
            tracing::warn!(
                path = %self.path,
                reclaimed,
                "finalized leaked statements before close"
            );
            // SAFETY: as above
            rc = unsafe { ffi::sqlite3_close(self.db) };
        }

        if rc != ffi::SQLITE_OK {
            // SAFETY: a refused close leaves the handle open
            let (_, message) = unsafe { ffi::last_error(self.db) };
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Close,
                code: Some(rc),
                path: Some(self.path.clone()),
                message,
            }));
        }

        self.open = false;
        self.db = ptr::null_mut();
        tracing::debug!(path = %self.path, "database closed");
        Ok(())
    }

    /// Cheap liveness probe. Never fails: every error reads as `false`.
    pub fn good_connection(&self) -> bool {
        if !self.open {
            return false;
        }
        match self.prepare("select name from sqlite_master where type='table'") {
            Ok(mut stmt) => stmt.step().is_ok(),
            Err(_) => false,
        }
    }

    /// Prepare a single statement.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        self.ensure_open()?;
        Statement::prepare(self, sql)
    }

    /// Run a statement to completion.
    pub fn execute(&self, sql: &str) -> Result<ExecutionResult> {
        self.execute_with(sql, |_| Ok(()))
    }

    /// Prepare, bind through `bind`, then run to completion.
    ///
    /// Prepare and bind problems are errors. A failure while stepping is a
    /// normal outcome and comes back as [`ExecutionResult::Failure`].
    pub fn execute_with<F>(&self, sql: &str, bind: F) -> Result<ExecutionResult>
    where
        F: FnOnce(&mut ParameterBinder<'_>) -> Result<()>,
    {
        let mut stmt = self.prepare(sql)?;
        bind(&mut stmt.parameters())?;

        // SAFETY: db is valid while open
        let before = unsafe { ffi::sqlite3_total_changes64(self.db) };
        match stmt.execute() {
            Ok(()) => {
                // SAFETY: db is valid while open
                let result = unsafe {
                    // sqlite3_changes keeps the count of the last DML statement,
                    // so only trust it when this statement moved the total.
                    let changed_rows = if ffi::sqlite3_total_changes64(self.db) == before {
                        0
                    } else {
                        u64::try_from(ffi::sqlite3_changes64(self.db)).unwrap_or(0)
                    };
                    let last_insert_rowid = ffi::sqlite3_last_insert_rowid(self.db);
                    ffi::sqlite3_set_last_insert_rowid(self.db, 0);
                    ExecutionResult::Modification {
                        last_insert_rowid,
                        changed_rows,
                    }
                };
                Ok(result)
            }
            Err(Error::Query(QueryError {
                kind: QueryErrorKind::Step,
                code,
                message,
                ..
            })) => Ok(ExecutionResult::Failure { code, message }),
            Err(e) => Err(e),
        }
    }

    /// Prepare a query and return a cursor positioned before the first row.
    pub fn query(&self, sql: &str) -> Result<ResultSet<'_>> {
        self.query_with(sql, |_| Ok(()))
    }

    /// Prepare, bind through `bind`, and return a cursor.
    pub fn query_with<F>(&self, sql: &str, bind: F) -> Result<ResultSet<'_>>
    where
        F: FnOnce(&mut ParameterBinder<'_>) -> Result<()>,
    {
        let mut stmt = self.prepare(sql)?;
        bind(&mut stmt.parameters())?;
        Ok(ResultSet::new(stmt))
    }

    /// Execute one or more `;`-separated statements without results.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        let c_sql = CString::new(sql).map_err(|_| {
            Error::Query(QueryError {
                kind: QueryErrorKind::Prepare,
                code: ffi::SQLITE_MISUSE,
                sql: Some(sql.to_string()),
                message: "SQL contains null byte".to_string(),
            })
        })?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let message = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg was allocated by sqlite3_exec
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Step,
                code: rc,
                sql: Some(sql.to_string()),
                message,
            }));
        }
        Ok(())
    }

    /// Run `body` inside `BEGIN ... TRANSACTION`.
    ///
    /// If `BEGIN` fails the body never runs and the failure is returned.
    /// Otherwise the body's decision is applied and the result of the
    /// closing `COMMIT`/`ROLLBACK` is returned. A body error rolls back and
    /// is returned unchanged; a panic rolls back while unwinding.
    pub fn transaction<F>(&self, kind: TransactionKind, body: F) -> Result<ExecutionResult>
    where
        F: FnOnce(&Transaction<'_>) -> Result<TransactionOutcome>,
    {
        match Transaction::begin(self, kind)? {
            Ok(tx) => {
                let outcome = body(&tx);
                tx.finish(outcome)
            }
            Err(failure) => Ok(failure),
        }
    }

    /// Current journal mode as reported by the engine (lowercase).
    pub fn journal_mode(&self) -> Result<String> {
        let mut rows = self.query("PRAGMA journal_mode")?;
        rows.next()?;
        Ok(rows.string(0)?.unwrap_or_default())
    }

    /// Row id of the most recent insert not yet reported by `execute`.
    pub fn last_insert_rowid(&self) -> i64 {
        if !self.open {
            return 0;
        }
        // SAFETY: db is valid while open
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> u64 {
        if !self.open {
            return 0;
        }
        // SAFETY: db is valid while open
        u64::try_from(unsafe { ffi::sqlite3_changes64(self.db) }).unwrap_or(0)
    }

    pub(crate) fn handle(&self) -> *mut ffi::sqlite3 {
        self.db
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::connection_closed(&self.path))
        }
    }

    fn apply_journal_mode(&self, mode: JournalMode) -> Result<()> {
        let mut rows = self.query(&format!("PRAGMA journal_mode={}", mode.as_str()))?;
        rows.next()?;
        // In-memory databases silently stay in "memory" mode
        let actual = rows.string(0)?.unwrap_or_default();
        tracing::debug!(requested = mode.as_str(), actual = %actual, "journal mode set");
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path, error = %e, "connection close on drop failed");
        }
    }
}

/// Finalize every statement still attached to `db`, returning how many.
///
/// # Safety
/// `db` must be a valid, open handle and no live `Statement` may refer to
/// any of its statements.
unsafe fn finalize_attached(db: *mut ffi::sqlite3) -> usize {
    let mut reclaimed = 0;
    unsafe {
        loop {
            let stmt = ffi::sqlite3_next_stmt(db, ptr::null_mut());
            if stmt.is_null() {
                break;
            }
            ffi::sqlite3_finalize(stmt);
            reclaimed += 1;
        }
    }
    reclaimed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = Connection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(conn.is_open());
        assert!(!conn.is_read_only());
    }

    #[test]
    fn test_open_failure_carries_path() {
        let err = Connection::open("/nonexistent/dir/db.sqlite", true).unwrap_err();
        match err {
            Error::Connection(e) => {
                assert_eq!(e.kind, ConnectionErrorKind::Open);
                assert!(e.code.is_some());
                assert_eq!(e.path.as_deref(), Some("/nonexistent/dir/db.sqlite"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_execute_reports_rowid_and_changes() {
        let conn = Connection::open_memory().unwrap();
        let created = conn
            .execute("create table foo(id integer primary key, n integer)")
            .unwrap();
        assert_eq!(
            created,
            ExecutionResult::Modification {
                last_insert_rowid: 0,
                changed_rows: 0
            }
        );

        let inserted = conn.execute("insert into foo(n) values (5)").unwrap();
        assert_eq!(
            inserted,
            ExecutionResult::Modification {
                last_insert_rowid: 1,
                changed_rows: 1
            }
        );

        // the rowid is reported once, then reset
        let updated = conn.execute("update foo set n = 6").unwrap();
        assert_eq!(updated.last_insert_rowid(), Some(0));
        assert_eq!(updated.changed_rows(), Some(1));
    }

    #[test]
    fn test_step_failure_is_a_result() {
        let conn = Connection::open_memory().unwrap();
        conn.execute("create table u(x integer unique)").unwrap();
        conn.execute("insert into u values (1)").unwrap();
        match conn.execute("insert into u values (1)").unwrap() {
            ExecutionResult::Failure { code, message } => {
                assert_eq!(code & 0xff, 19);
                assert!(message.contains("UNIQUE"), "{message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_failure_is_an_error() {
        let conn = Connection::open_memory().unwrap();
        let err = conn.execute("selec 1").unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Prepare);
                assert_eq!(q.sql.as_deref(), Some("selec 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_execute_batch() {
        let conn = Connection::open_memory().unwrap();
        conn.execute_batch(
            "create table a(x); create table b(y); insert into a values (1), (2);",
        )
        .unwrap();
        let mut rows = conn.query("select count(*) from a").unwrap();
        assert!(rows.next().unwrap());
        assert_eq!(rows.long(0).unwrap(), Some(2));

        let err = conn.execute_batch("create table a(x)").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_good_connection() {
        let mut conn = Connection::open_memory().unwrap();
        assert!(conn.good_connection());
        conn.close().unwrap();
        assert!(!conn.good_connection());
    }

    #[test]
    fn test_closed_connection_rejects_work() {
        let mut conn = Connection::open_memory().unwrap();
        conn.close().unwrap();
        assert!(!conn.is_open());
        assert!(conn.execute("select 1").unwrap_err().is_connection_closed());
        assert!(conn.query("select 1").unwrap_err().is_connection_closed());
        assert!(conn.prepare("select 1").unwrap_err().is_connection_closed());
        let err = conn
            .transaction(TransactionKind::Deferred, |_| Ok(TransactionOutcome::Commit))
            .unwrap_err();
        assert!(err.is_connection_closed());
        // closing again is harmless
        conn.close().unwrap();
    }

    #[test]
    fn test_close_reclaims_leaked_statement() {
        let mut conn = Connection::open_memory().unwrap();
        conn.execute("create table t(x)").unwrap();
        conn.execute("insert into t values (1), (2)").unwrap();

        let mut rows = conn.query("select x from t").unwrap();
        assert!(rows.next().unwrap());
        std::mem::forget(rows);

        conn.close().unwrap();
        assert!(!conn.is_open());
        conn.close().unwrap();
    }

    #[test]
    fn test_drop_releases_locks_held_by_leaked_statement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drop.db");
        let path = path.to_str().unwrap();

        let conn = Connection::open(path, false).unwrap();
        conn.execute_batch("create table t(x); insert into t values (1), (2);")
            .unwrap();
        let mut rows = conn.query("select x from t").unwrap();
        // mid-scan, so the statement keeps a shared lock
        assert!(rows.next().unwrap());
        std::mem::forget(rows);
        drop(conn);

        let other = Connection::open_with(&ConnectionConfig::file(path).busy_timeout(0)).unwrap();
        let begun = other.execute("BEGIN EXCLUSIVE").unwrap();
        assert!(begun.is_success(), "{begun:?}");
        other.execute("COMMIT").unwrap();
    }

    #[test]
    fn test_changes_counts_every_affected_row() {
        let conn = Connection::open_memory().unwrap();
        conn.execute_batch("create table t(x); insert into t values (1), (2), (3);")
            .unwrap();
        let updated = conn.execute("update t set x = x + 1").unwrap();
        assert_eq!(updated.changed_rows(), Some(3));
        assert_eq!(conn.changes(), 3);

        // a select leaves the previous count alone but reports no change itself
        let selected = conn.execute("select * from t").unwrap();
        assert_eq!(selected.changed_rows(), Some(0));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.db");
        let path = path.to_str().unwrap();
        {
            let conn = Connection::open(path, false).unwrap();
            conn.execute("create table t(x)").unwrap();
        }

        let conn = Connection::open(path, true).unwrap();
        assert!(conn.is_read_only());
        let result = conn.execute("insert into t values (1)").unwrap();
        match result {
            ExecutionResult::Failure { code, .. } => assert_eq!(code & 0xff, 8),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_config_journal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.db");
        let config = ConnectionConfig::file(path.to_str().unwrap())
            .busy_timeout(250)
            .journal_mode(JournalMode::Wal);
        assert_eq!(config.busy_timeout_ms, 250);

        let conn = Connection::open_with(&config).unwrap();
        assert_eq!(conn.journal_mode().unwrap(), "wal");
    }

    #[test]
    fn test_in_transaction_tracks_begin_and_commit() {
        let conn = Connection::open_memory().unwrap();
        assert!(!conn.in_transaction());
        conn.execute("BEGIN").unwrap();
        assert!(conn.in_transaction());
        conn.execute("COMMIT").unwrap();
        assert!(!conn.in_transaction());
    }
}
