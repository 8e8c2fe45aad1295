//! Prepared statements.

#![allow(clippy::cast_sign_loss)]

use crate::connection::Connection;
use crate::ffi;
use crate::params::ParameterBinder;
use sqlkit_core::error::{QueryError, QueryErrorKind};
use sqlkit_core::{Error, Result};
use std::ffi::{CString, c_int};
use std::ptr;

/// Result of a successful `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A row is available for reading
    Row,
    /// The statement ran to completion
    Done,
}

/// A compiled statement bound to the connection that prepared it.
///
/// The native handle is finalized exactly once, by [`Statement::close`] or
/// on drop, whichever comes first.
pub struct Statement<'conn> {
    stmt: *mut ffi::sqlite3_stmt,
    conn: &'conn Connection,
    sql: String,
    closed: bool,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn prepare(conn: &'conn Connection, sql: &str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| {
            query_error(
                QueryErrorKind::Prepare,
                ffi::SQLITE_MISUSE,
                sql,
                "SQL contains null byte".to_string(),
            )
        })?;

        let len = c_int::try_from(c_sql.as_bytes().len()).map_err(|_| {
            query_error(
                QueryErrorKind::Prepare,
                ffi::SQLITE_TOOBIG,
                sql,
                "SQL text is too large".to_string(),
            )
        })?;

        let db = conn.handle();
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc =
            unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut stmt, ptr::null_mut()) };

        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid
            let (code, message) = unsafe { ffi::last_error(db) };
            return Err(query_error(QueryErrorKind::Prepare, code, sql, message));
        }

        // Empty input or a lone comment compiles to nothing
        if stmt.is_null() {
            return Err(query_error(
                QueryErrorKind::Prepare,
                ffi::SQLITE_MISUSE,
                sql,
                "SQL contains no statement".to_string(),
            ));
        }

        tracing::trace!(sql, "statement prepared");
        Ok(Self {
            stmt,
            conn,
            sql: sql.to_string(),
            closed: false,
        })
    }

    /// SQL text this statement was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of result columns; 0 for statements that return no data.
    pub fn column_count(&self) -> usize {
        if self.closed {
            return 0;
        }
        // SAFETY: stmt is valid until closed
        unsafe { ffi::sqlite3_column_count(self.stmt) as usize }
    }

    /// Binder for this statement's parameters.
    pub fn parameters(&mut self) -> ParameterBinder<'_> {
        ParameterBinder::new(self)
    }

    /// Advance the statement by one step.
    ///
    /// Anything other than a row or completion (busy and locked included)
    /// is a `Step` error carrying the native code.
    pub fn step(&mut self) -> Result<Step> {
        self.ensure_open(QueryErrorKind::Step)?;

        // SAFETY: stmt is valid until closed
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => Ok(Step::Row),
            ffi::SQLITE_DONE => Ok(Step::Done),
            _ => {
                // SAFETY: the owning connection is open while we borrow it
                let (_, message) = unsafe { ffi::last_error(self.conn.handle()) };
                Err(query_error(QueryErrorKind::Step, rc, &self.sql, message))
            }
        }
    }

    /// Step until the statement reports completion, discarding rows.
    pub fn execute(&mut self) -> Result<()> {
        while self.step()? == Step::Row {}
        Ok(())
    }

    /// Rewind so the statement can be stepped again. Bindings are kept.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open(QueryErrorKind::Step)?;
        // Return code only repeats the last step error
        // SAFETY: stmt is valid until closed
        unsafe {
            ffi::sqlite3_reset(self.stmt);
        }
        Ok(())
    }

    /// Set every parameter back to NULL.
    pub fn clear_bindings(&mut self) -> Result<()> {
        self.ensure_open(QueryErrorKind::Bind)?;
        // SAFETY: stmt is valid until closed
        unsafe {
            ffi::sqlite3_clear_bindings(self.stmt);
        }
        Ok(())
    }

    /// Finalize the native statement. Calling this again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Return code only repeats the last step error
        // SAFETY: stmt is valid and is never used again
        unsafe {
            ffi::sqlite3_finalize(self.stmt);
        }
        self.stmt = ptr::null_mut();
    }

    pub(crate) fn raw(&self) -> *mut ffi::sqlite3_stmt {
        self.stmt
    }

    pub(crate) fn ensure_open(&self, kind: QueryErrorKind) -> Result<()> {
        if self.closed {
            Err(query_error(
                kind,
                ffi::SQLITE_MISUSE,
                &self.sql,
                "statement is closed".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

pub(crate) fn query_error(kind: QueryErrorKind, code: c_int, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        code,
        sql: Some(sql.to_string()),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_memory().unwrap();
        conn.execute("create table t(id integer primary key, name text)")
            .unwrap();
        conn
    }

    #[test]
    fn test_step_through_rows() {
        let conn = setup();
        conn.execute("insert into t(name) values ('a'), ('b')")
            .unwrap();

        let mut stmt = conn.prepare("select name from t order by id").unwrap();
        assert_eq!(stmt.column_count(), 1);
        assert_eq!(stmt.step().unwrap(), Step::Row);
        assert_eq!(stmt.step().unwrap(), Step::Row);
        assert_eq!(stmt.step().unwrap(), Step::Done);
    }

    #[test]
    fn test_reset_reruns_with_same_bindings() {
        let conn = setup();
        let mut stmt = conn.prepare("insert into t(name) values (?)").unwrap();
        stmt.parameters().bind(1, "x").unwrap();
        stmt.execute().unwrap();
        stmt.reset().unwrap();
        stmt.execute().unwrap();
        stmt.reset().unwrap();
        stmt.clear_bindings().unwrap();
        stmt.execute().unwrap();
        drop(stmt);

        let mut rows = conn
            .query("select count(*), count(name) from t")
            .unwrap();
        assert!(rows.next().unwrap());
        assert_eq!(rows.long(0).unwrap(), Some(3));
        assert_eq!(rows.long(1).unwrap(), Some(2));
    }

    #[test]
    fn test_close_is_idempotent() {
        let conn = setup();
        let mut stmt = conn.prepare("select 1").unwrap();
        stmt.close();
        assert!(stmt.is_closed());
        stmt.close();
        assert_eq!(stmt.column_count(), 0);

        let err = stmt.step().unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Step,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_sql_is_a_prepare_error() {
        let conn = setup();
        let err = conn.prepare("   -- nothing here").unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Prepare);
                assert_eq!(q.message, "SQL contains no statement");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_step_error_carries_code() {
        let conn = setup();
        conn.execute("create table u(x not null)").unwrap();
        let mut stmt = conn.prepare("insert into u values (null)").unwrap();
        let err = stmt.step().unwrap_err();
        assert_eq!(err.code().map(|c| c & 0xff), Some(19));
        assert_eq!(err.sql(), Some("insert into u values (null)"));
        assert!(!err.is_busy());
    }
}
