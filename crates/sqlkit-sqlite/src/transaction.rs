//! Transactions and savepoint nesting.
//!
//! SQLite only has flat transactions plus named savepoints, so nesting is
//! emulated: [`Transaction::nest`] wraps its body in `SAVEPOINT` /
//! `RELEASE SAVEPOINT` / `ROLLBACK TRANSACTION TO SAVEPOINT`. Depth lives on
//! the call stack only.

use crate::connection::Connection;
use crate::params::ParameterBinder;
use crate::result_set::ResultSet;
use sqlkit_core::{ExecutionResult, Result, TransactionKind, TransactionOutcome, quote_ident};

const COMMIT: &str = "COMMIT TRANSACTION";
const ROLLBACK: &str = "ROLLBACK TRANSACTION";

/// An active transaction on a borrowed connection.
///
/// Only ever handed out by reference from [`Connection::transaction`]. If
/// the body unwinds, dropping the transaction rolls it back.
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    active: bool,
}

impl<'conn> Transaction<'conn> {
    /// Issue `BEGIN`. The inner `Err` is the engine's failure result.
    pub(crate) fn begin(
        conn: &'conn Connection,
        kind: TransactionKind,
    ) -> Result<std::result::Result<Self, ExecutionResult>> {
        let sql = format!("BEGIN {} TRANSACTION", kind.keyword());
        match conn.execute(&sql)? {
            ExecutionResult::Modification { .. } => {
                tracing::debug!(kind = kind.keyword(), "transaction started");
                Ok(Ok(Self { conn, active: true }))
            }
            failure => {
                tracing::debug!(kind = kind.keyword(), ?failure, "transaction failed to start");
                Ok(Err(failure))
            }
        }
    }

    /// Apply the body's decision and end the transaction.
    pub(crate) fn finish(mut self, outcome: Result<TransactionOutcome>) -> Result<ExecutionResult> {
        self.active = false;
        match outcome {
            Ok(TransactionOutcome::Commit) => {
                let committed = self.conn.execute(COMMIT);
                if matches!(committed, Ok(ExecutionResult::Modification { .. })) {
                    tracing::debug!("transaction committed");
                } else {
                    tracing::warn!(result = ?committed, "commit failed, rolling back");
                    self.rollback_quietly();
                }
                committed
            }
            Ok(TransactionOutcome::Rollback) => {
                let rolled_back = self.conn.execute(ROLLBACK);
                tracing::debug!(result = ?rolled_back, "transaction rolled back");
                rolled_back
            }
            Err(e) => {
                tracing::debug!(error = %e, "transaction body failed, rolling back");
                self.rollback_quietly();
                Err(e)
            }
        }
    }

    /// Run `body` inside the savepoint `name`.
    ///
    /// `Commit` releases the savepoint; `Rollback` undoes the body's writes
    /// and leaves the outer transaction active. A body error rolls back to
    /// the savepoint and is returned. Names must be unique along the
    /// current nesting chain.
    pub fn nest<F>(&self, name: &str, body: F) -> Result<ExecutionResult>
    where
        F: FnOnce(&Transaction<'conn>) -> Result<TransactionOutcome>,
    {
        let savepoint = quote_ident(name);
        let opened = self.conn.execute(&format!("SAVEPOINT {}", savepoint))?;
        if !opened.is_success() {
            return Ok(opened);
        }
        tracing::debug!(savepoint = name, "savepoint opened");

        match body(self) {
            Ok(TransactionOutcome::Commit) => {
                self.conn.execute(&format!("RELEASE SAVEPOINT {}", savepoint))
            }
            Ok(TransactionOutcome::Rollback) => self.rollback_to(&savepoint),
            Err(e) => {
                match self.rollback_to(&savepoint) {
                    Ok(ExecutionResult::Modification { .. }) => {}
                    other => tracing::warn!(savepoint = name, result = ?other, "savepoint rollback failed"),
                }
                Err(e)
            }
        }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn execute(&self, sql: &str) -> Result<ExecutionResult> {
        self.conn.execute(sql)
    }

    pub fn execute_with<F>(&self, sql: &str, bind: F) -> Result<ExecutionResult>
    where
        F: FnOnce(&mut ParameterBinder<'_>) -> Result<()>,
    {
        self.conn.execute_with(sql, bind)
    }

    pub fn query(&self, sql: &str) -> Result<ResultSet<'conn>> {
        self.conn.query(sql)
    }

    pub fn query_with<F>(&self, sql: &str, bind: F) -> Result<ResultSet<'conn>>
    where
        F: FnOnce(&mut ParameterBinder<'_>) -> Result<()>,
    {
        self.conn.query_with(sql, bind)
    }

    fn rollback_to(&self, savepoint: &str) -> Result<ExecutionResult> {
        tracing::debug!(savepoint, "rolling back to savepoint");
        self.conn
            .execute(&format!("ROLLBACK TRANSACTION TO SAVEPOINT {}", savepoint))
    }

    /// Roll back if the engine still has a transaction open, logging any
    /// failure instead of returning it.
    fn rollback_quietly(&self) {
        if !self.conn.in_transaction() {
            return;
        }
        match self.conn.execute(ROLLBACK) {
            Ok(ExecutionResult::Modification { .. }) => {}
            other => tracing::warn!(result = ?other, "forced rollback failed"),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.active {
            tracing::debug!("transaction dropped while active, rolling back");
            self.rollback_quietly();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Connection;
    use sqlkit_core::{Error, ExecutionResult, TransactionKind, TransactionOutcome};

    fn setup() -> Connection {
        let conn = Connection::open_memory().unwrap();
        conn.execute("create table foo(bar text)").unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        let mut rows = conn.query("select count(*) from foo").unwrap();
        assert!(rows.next().unwrap());
        rows.long(0).unwrap().unwrap()
    }

    fn bars(conn: &Connection) -> Vec<String> {
        let mut rows = conn.query("select bar from foo order by rowid").unwrap();
        let mut out = Vec::new();
        while rows.next().unwrap() {
            out.push(rows.string(0).unwrap().unwrap());
        }
        out
    }

    #[test]
    fn test_commit() {
        let conn = setup();
        let result = conn
            .transaction(TransactionKind::Deferred, |tx| {
                tx.execute("insert into foo values ('a')")?;
                assert!(tx.connection().in_transaction());
                Ok(TransactionOutcome::Commit)
            })
            .unwrap();
        assert!(result.is_success());
        assert_eq!(count(&conn), 1);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_rollback_decision() {
        let conn = setup();
        conn.transaction(TransactionKind::Immediate, |tx| {
            tx.execute("insert into foo values ('a')")?;
            Ok(TransactionOutcome::Rollback)
        })
        .unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_body_error_rolls_back_and_propagates() {
        let conn = setup();
        let err = conn
            .transaction(TransactionKind::Exclusive, |tx| {
                tx.execute("insert into foo values ('a')")?;
                Err(Error::Custom("boom".to_string()))
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(count(&conn), 0);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_panic_rolls_back() {
        let conn = setup();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            conn.transaction(TransactionKind::Deferred, |tx| {
                tx.execute("insert into foo values ('a')").unwrap();
                panic!("mid-body");
            })
        }));
        assert!(caught.is_err());
        assert_eq!(count(&conn), 0);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_begin_failure_skips_body() {
        let conn = setup();
        conn.execute("BEGIN").unwrap();
        let mut ran = false;
        let result = conn
            .transaction(TransactionKind::Deferred, |_| {
                ran = true;
                Ok(TransactionOutcome::Commit)
            })
            .unwrap();
        assert!(!ran);
        assert!(matches!(result, ExecutionResult::Failure { .. }));
        conn.execute("ROLLBACK").unwrap();
    }

    #[test]
    fn test_nested_rollback_keeps_outer_writes() {
        let conn = setup();
        conn.transaction(TransactionKind::Deferred, |tx| {
            tx.execute("insert into foo values ('A')")?;
            let nested = tx.nest("a", |tx| {
                tx.execute("insert into foo values ('B')")?;
                tx.execute("insert into foo values ('C')")?;
                Ok(TransactionOutcome::Rollback)
            })?;
            assert!(nested.is_success());
            Ok(TransactionOutcome::Commit)
        })
        .unwrap();
        assert_eq!(bars(&conn), vec!["A"]);
    }

    #[test]
    fn test_two_level_nesting() {
        let conn = setup();
        conn.transaction(TransactionKind::Deferred, |tx| {
            tx.execute("insert into foo values ('A')")?;
            tx.nest("a", |tx| {
                tx.execute("insert into foo values ('B')")?;
                tx.nest("b", |tx| {
                    tx.execute("insert into foo values ('C')")?;
                    Ok(TransactionOutcome::Rollback)
                })?;
                Ok(TransactionOutcome::Commit)
            })?;
            Ok(TransactionOutcome::Commit)
        })
        .unwrap();
        assert_eq!(bars(&conn), vec!["A", "B"]);
    }

    #[test]
    fn test_nested_error_rolls_back_savepoint_only() {
        let conn = setup();
        conn.transaction(TransactionKind::Deferred, |tx| {
            tx.execute("insert into foo values ('A')")?;
            let err = tx
                .nest("odd \"name\"", |tx| {
                    tx.execute("insert into foo values ('B')")?;
                    Err(Error::Custom("inner".to_string()))
                })
                .unwrap_err();
            assert_eq!(err.to_string(), "inner");
            Ok(TransactionOutcome::Commit)
        })
        .unwrap();
        assert_eq!(bars(&conn), vec!["A"]);
    }

    #[test]
    fn test_outer_rollback_discards_released_savepoint() {
        let conn = setup();
        conn.transaction(TransactionKind::Deferred, |tx| {
            tx.nest("a", |tx| {
                tx.execute("insert into foo values ('B')")?;
                Ok(TransactionOutcome::Commit)
            })?;
            Ok(TransactionOutcome::Rollback)
        })
        .unwrap();
        assert_eq!(count(&conn), 0);
    }
}
