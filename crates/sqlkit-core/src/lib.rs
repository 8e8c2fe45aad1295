//! Core types for sqlkit.
//!
//! This crate holds the engine-independent vocabulary shared by the driver
//! and the worker pool:
//!
//! - `Value`: closed set of bindable/readable values
//! - `ExecutionResult`: `Modification` or `Failure` of a statement
//! - `TransactionKind` / `TransactionOutcome`: transaction control
//! - `Row`: an owned, thread-portable copy of a result row
//! - `Error`: the error taxonomy for every layer

pub mod error;
pub mod identifiers;
pub mod result;
pub mod row;
pub mod value;

pub use error::{
    ColumnError, ColumnErrorKind, ConnectionError, ConnectionErrorKind, Error, QueryError,
    QueryErrorKind, Result, TypeError, WorkerError, WorkerErrorKind,
};
pub use identifiers::quote_ident;
pub use result::{ExecutionResult, TransactionKind, TransactionOutcome};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
