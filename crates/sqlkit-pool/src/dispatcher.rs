//! Routes jobs to the writer or to a reader.

use crate::DispatcherConfig;
use crate::future::WorkerFuture;
use crate::worker::{Job, Worker, WorkerContext, WorkerId};
use sqlkit_core::error::{WorkerError, WorkerErrorKind};
use sqlkit_core::{Error, Result};
use sqlkit_sqlite::Connection;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

/// One writer thread and a fixed pool of reader threads, each owning its
/// own connection to the same database.
///
/// Every write goes through the single writer, whose queue is FIFO, so at
/// most one write transaction is ever in flight. Reads are spread over the
/// readers round robin. Use a file path: an in-memory database is private
/// to each connection.
pub struct WorkerDispatcher {
    config: DispatcherConfig,
    writer: Worker,
    readers: Vec<Worker>,
    next_reader: AtomicUsize,
}

impl WorkerDispatcher {
    /// Open `path` with one writer and `read_pool_size` readers.
    pub fn create(path: impl Into<String>, read_pool_size: usize) -> Result<Self> {
        Self::with_config(DispatcherConfig::new(path).read_pool_size(read_pool_size))
    }

    /// Open connections and start one thread per connection.
    ///
    /// The writer is opened first so the database exists (and is in its
    /// configured journal mode) before the read-only connections open it.
    #[tracing::instrument(level = "debug", skip(config), fields(path = %config.path, readers = config.read_pool_size))]
    pub fn with_config(config: DispatcherConfig) -> Result<Self> {
        if config.read_pool_size == 0 {
            return Err(Error::Custom(
                "read pool size must be at least 1".to_string(),
            ));
        }

        let connection = Connection::open_with(&config.connection_config(false))?;
        let writer = Worker::spawn(
            WorkerId::Writer,
            config.thread_name(WorkerId::Writer),
            connection,
        )?;

        // Already-started workers shut down on drop if a later one fails
        let mut readers = Vec::with_capacity(config.read_pool_size);
        for i in 0..config.read_pool_size {
            let id = WorkerId::Reader(i);
            let connection = Connection::open_with(&config.connection_config(true))?;
            readers.push(Worker::spawn(id, config.thread_name(id), connection)?);
        }

        tracing::debug!("dispatcher started");
        Ok(Self {
            config,
            writer,
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    pub fn read_pool_size(&self) -> usize {
        self.readers.len()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run `job` on the writer.
    ///
    /// `producer` runs here, on the calling thread; its output moves to the
    /// writer along with the job. Returns without waiting for the job.
    pub fn read_write_async<T, R, P, F>(&self, producer: P, job: F) -> WorkerFuture<R>
    where
        P: FnOnce() -> T,
        T: Send + 'static,
        R: Send + 'static,
        F: FnOnce(WorkerContext<'_, T>) -> Result<R> + Send + 'static,
    {
        dispatch(&self.writer, producer(), job)
    }

    /// Run `job` on the next reader in round-robin order.
    pub fn read_async<T, R, P, F>(&self, producer: P, job: F) -> WorkerFuture<R>
    where
        P: FnOnce() -> T,
        T: Send + 'static,
        R: Send + 'static,
        F: FnOnce(WorkerContext<'_, T>) -> Result<R> + Send + 'static,
    {
        let index = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        dispatch(&self.readers[index], producer(), job)
    }

    /// Stop every worker and close its connection, writer first.
    ///
    /// Jobs already queued run before their worker stops. Returns the first
    /// close error; every worker is stopped regardless. Jobs submitted
    /// afterwards resolve to a `Disconnected` worker error.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for worker in std::iter::once(&mut self.writer).chain(self.readers.iter_mut()) {
            if let Err(e) = worker.shutdown() {
                tracing::warn!(worker = %worker.id(), error = %e, "worker close failed");
                first_error.get_or_insert(e);
            }
        }
        tracing::debug!(path = %self.config.path, "dispatcher closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for WorkerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerDispatcher")
            .field("path", &self.config.path)
            .field("read_pool_size", &self.readers.len())
            .finish_non_exhaustive()
    }
}

/// Wrap `job` so its result, or its panic, lands in the returned future.
fn dispatch<T, R, F>(worker: &Worker, data: T, job: F) -> WorkerFuture<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(WorkerContext<'_, T>) -> Result<R> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let erased: Job = Box::new(move |connection: &Connection, id: WorkerId| {
        let context = WorkerContext {
            connection,
            data,
            worker: id,
        };
        let result = panic::catch_unwind(AssertUnwindSafe(move || job(context)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::warn!(worker = %id, panic = %message, "job panicked");
                Err(Error::Worker(WorkerError {
                    kind: WorkerErrorKind::JobPanicked,
                    message: format!("job panicked on {}: {}", id, message),
                }))
            });
        // Nobody listening means the caller dropped the future
        let _ = sender.send(result);
    });
    worker.submit(erased);
    WorkerFuture::new(receiver, worker.id())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
