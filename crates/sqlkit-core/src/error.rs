//! Error types for sqlkit operations.

use std::fmt;

/// Native result code reported by the engine when a statement is busy.
pub const CODE_BUSY: i32 = 5;
/// Native result code reported by the engine when a table is locked.
pub const CODE_LOCKED: i32 = 6;

/// The primary error type for all sqlkit operations.
#[derive(Debug)]
pub enum Error {
    /// Opening, closing or using a closed connection
    Connection(ConnectionError),
    /// Preparing, binding or stepping a statement
    Query(QueryError),
    /// Reading a column from a result row
    Column(ColumnError),
    /// Converting a column value to a Rust type
    Type(TypeError),
    /// Dispatching a job to a worker thread
    Worker(WorkerError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    /// Native result code, when the engine produced one
    pub code: Option<i32>,
    /// Database path the connection was opened with
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The engine could not open the database
    Open,
    /// The engine refused to close the database
    Close,
    /// The connection has already been closed
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub code: i32,
    pub sql: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// SQL failed to compile
    Prepare,
    /// A parameter could not be bound
    Bind,
    /// Stepping returned something other than a row or completion
    Step,
}

#[derive(Debug)]
pub struct ColumnError {
    pub kind: ColumnErrorKind,
    /// Requested column, by name or by index
    pub column: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnErrorKind {
    /// Index is not below the column count
    OutOfRange,
    /// No column carries the requested name
    NotFound,
    /// The cursor is not positioned on a row
    NoRow,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct WorkerError {
    pub kind: WorkerErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorKind {
    /// A worker thread could not be started
    Spawn,
    /// The job panicked while running on its worker
    JobPanicked,
    /// The worker is gone, so the job never ran or its result was lost
    Disconnected,
}

impl Error {
    /// Build the error returned by every operation on a closed connection.
    pub fn connection_closed(path: &str) -> Self {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Closed,
            code: None,
            path: Some(path.to_string()),
            message: "connection is closed".to_string(),
        })
    }

    /// Native result code carried by this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Connection(e) => e.code,
            Error::Query(e) => Some(e.code),
            _ => None,
        }
    }

    /// Is this a transient busy/locked condition that a retry may resolve?
    pub fn is_busy(&self) -> bool {
        matches!(self.code(), Some(code) if is_busy_code(code))
    }

    /// Did this error come from using a connection after it was closed?
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Error::Connection(e) if e.kind == ConnectionErrorKind::Closed)
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

/// Primary result codes are the low byte of extended codes.
pub fn is_busy_code(code: i32) -> bool {
    matches!(code & 0xff, CODE_BUSY | CODE_LOCKED)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Column(e) => write!(f, "Column error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Worker(e) => write!(f, "Worker error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = self.code {
            write!(f, " (code {})", code)?;
        }
        if let Some(path) = &self.path {
            write!(f, " at path: {}", path)?;
        }
        Ok(())
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.kind {
            QueryErrorKind::Prepare => "prepare",
            QueryErrorKind::Bind => "bind",
            QueryErrorKind::Step => "step",
        };
        write!(f, "{} failed with code {}: {}", stage, self.code, self.message)
    }
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column {}: {}", self.column, self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ColumnError> for Error {
    fn from(err: ColumnError) -> Self {
        Error::Column(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<WorkerError> for Error {
    fn from(err: WorkerError) -> Self {
        Error::Worker(err)
    }
}

/// Result type alias for sqlkit operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn step_error(code: i32) -> Error {
        Error::Query(QueryError {
            kind: QueryErrorKind::Step,
            code,
            sql: Some("SELECT 1".to_string()),
            message: "database is locked".to_string(),
        })
    }

    #[test]
    fn busy_detection_uses_primary_code() {
        assert!(step_error(CODE_BUSY).is_busy());
        assert!(step_error(CODE_LOCKED).is_busy());
        // SQLITE_BUSY_SNAPSHOT is an extended busy code
        assert!(step_error(517).is_busy());
        assert!(!step_error(19).is_busy());
        assert!(!Error::Custom("nope".to_string()).is_busy());
    }

    #[test]
    fn closed_connection_helpers() {
        let err = Error::connection_closed(":memory:");
        assert!(err.is_connection_closed());
        assert_eq!(err.code(), None);
        assert_eq!(
            err.to_string(),
            "Connection error: connection is closed at path: :memory:"
        );
    }

    #[test]
    fn query_error_display_and_sql() {
        let err = step_error(CODE_BUSY);
        assert_eq!(err.sql(), Some("SELECT 1"));
        assert_eq!(
            err.to_string(),
            "Query error: step failed with code 5: database is locked"
        );
    }
}
