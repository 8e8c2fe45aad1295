//! Worker threads for sqlkit connections.
//!
//! A [`WorkerDispatcher`] owns one read-write connection and a fixed number
//! of read-only connections, each on its own thread with its own FIFO job
//! queue. Jobs are closures that receive a [`WorkerContext`]; results come
//! back through a [`WorkerFuture`].
//!
//! ```rust
//! use sqlkit_pool::WorkerDispatcher;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("app.db");
//! let mut dispatcher = WorkerDispatcher::create(path.to_str().unwrap(), 2).unwrap();
//!
//! dispatcher
//!     .read_write_async(|| "hello".to_string(), |ctx| {
//!         ctx.connection.execute("create table greeting(text text)")?;
//!         ctx.connection
//!             .execute_with("insert into greeting values (?)", |p| p.bind(1, ctx.data))
//!     })
//!     .wait()
//!     .unwrap();
//!
//! let text = dispatcher
//!     .read_async(|| (), |ctx| {
//!         let mut rows = ctx.connection.query("select text from greeting")?;
//!         rows.next()?;
//!         rows.string(0)
//!     })
//!     .wait()
//!     .unwrap();
//! assert_eq!(text.as_deref(), Some("hello"));
//!
//! dispatcher.close().unwrap();
//! ```

pub mod dispatcher;
pub mod future;
pub mod worker;

pub use dispatcher::WorkerDispatcher;
pub use future::WorkerFuture;
pub use worker::{WorkerContext, WorkerId};

use sqlkit_sqlite::{ConnectionConfig, JournalMode, MEMORY_PATH};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Database file shared by every worker
    pub path: String,
    /// Number of read-only workers (at least 1)
    pub read_pool_size: usize,
    /// Busy timeout in milliseconds, applied to every connection
    pub busy_timeout_ms: u32,
    /// Journal mode set by the writer on open
    pub journal_mode: Option<JournalMode>,
    /// Worker threads are named `{prefix}-writer`, `{prefix}-reader-{n}`
    pub thread_name_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            read_pool_size: 2,
            busy_timeout_ms: 5000,
            journal_mode: Some(JournalMode::Wal),
            thread_name_prefix: "sqlkit".to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Create a new configuration for the database at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the number of reader threads.
    pub fn read_pool_size(mut self, n: usize) -> Self {
        self.read_pool_size = n;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Set or clear the journal mode.
    pub fn journal_mode(mut self, mode: Option<JournalMode>) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Set the worker thread name prefix.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub(crate) fn connection_config(&self, read_only: bool) -> ConnectionConfig {
        let config = ConnectionConfig::file(self.path.clone())
            .read_only(read_only)
            .busy_timeout(self.busy_timeout_ms);
        match self.journal_mode {
            Some(mode) if !read_only => config.journal_mode(mode),
            _ => config,
        }
    }

    pub(crate) fn thread_name(&self, worker: WorkerId) -> String {
        format!("{}-{}", self.thread_name_prefix, worker)
    }
}
