//! Statement and transaction outcomes.

use serde::{Deserialize, Serialize};

/// Outcome of running a statement to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionResult {
    /// The statement completed.
    Modification {
        /// Row id of the row inserted by this statement, or 0 if it inserted none
        last_insert_rowid: i64,
        /// Rows changed by this statement
        changed_rows: u64,
    },
    /// The engine reported an error while stepping the statement.
    Failure {
        /// Native result code
        code: i32,
        /// Native error message
        message: String,
    },
}

impl ExecutionResult {
    /// Did the statement complete?
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Modification { .. })
    }

    /// Rows changed, or `None` on failure.
    pub fn changed_rows(&self) -> Option<u64> {
        match self {
            ExecutionResult::Modification { changed_rows, .. } => Some(*changed_rows),
            ExecutionResult::Failure { .. } => None,
        }
    }

    /// Inserted row id, or `None` on failure.
    pub fn last_insert_rowid(&self) -> Option<i64> {
        match self {
            ExecutionResult::Modification {
                last_insert_rowid, ..
            } => Some(*last_insert_rowid),
            ExecutionResult::Failure { .. } => None,
        }
    }
}

/// Locking behaviour requested by `BEGIN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Acquire locks lazily on first read/write
    #[default]
    Deferred,
    /// Take the write lock immediately
    Immediate,
    /// Take the write lock and block other readers (rollback journal only)
    Exclusive,
}

impl TransactionKind {
    /// Keyword placed between `BEGIN` and `TRANSACTION`.
    pub const fn keyword(self) -> &'static str {
        match self {
            TransactionKind::Deferred => "DEFERRED",
            TransactionKind::Immediate => "IMMEDIATE",
            TransactionKind::Exclusive => "EXCLUSIVE",
        }
    }
}

/// Decision returned by a unit of work: keep its writes or undo them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
    Commit,
    Rollback,
}
