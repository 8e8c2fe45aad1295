//! Worker threads, each bound to one connection.

use sqlkit_core::error::{WorkerError, WorkerErrorKind};
use sqlkit_core::{Error, Result};
use sqlkit_sqlite::Connection;
use std::fmt;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// Identifies the worker a job ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerId {
    /// The single read-write worker
    Writer,
    /// A read-only worker, by position in the pool
    Reader(usize),
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerId::Writer => write!(f, "writer"),
            WorkerId::Reader(i) => write!(f, "reader-{}", i),
        }
    }
}

/// Everything a job gets to work with.
///
/// `connection` is the worker's long-lived connection; it is only borrowed
/// for the duration of the job.
pub struct WorkerContext<'c, T> {
    pub connection: &'c Connection,
    pub data: T,
    pub worker: WorkerId,
}

/// A type-erased job ready to run on a worker.
pub(crate) type Job = Box<dyn FnOnce(&Connection, WorkerId) + Send + 'static>;

enum Message {
    Run(Job),
    /// Close the connection, report the result, and exit.
    Shutdown(mpsc::Sender<Result<()>>),
}

/// Handle to one running worker thread.
pub(crate) struct Worker {
    id: WorkerId,
    sender: mpsc::Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Move `connection` onto a new named thread.
    pub(crate) fn spawn(id: WorkerId, name: String, connection: Connection) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(id, connection, &receiver))
            .map_err(|err| {
                Error::Worker(WorkerError {
                    kind: WorkerErrorKind::Spawn,
                    message: format!("failed to spawn {} thread: {}", id, err),
                })
            })?;
        Ok(Self {
            id,
            sender,
            handle: Some(handle),
        })
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Queue a job behind everything already submitted.
    ///
    /// If the worker has stopped the job is dropped, which disconnects the
    /// job's result channel.
    pub(crate) fn submit(&self, job: Job) {
        if self.sender.send(Message::Run(job)).is_err() {
            tracing::debug!(worker = %self.id, "worker stopped, job dropped");
        }
    }

    /// Stop the worker after its queued jobs and close its connection.
    ///
    /// Returns the connection's close result. Stopping twice is a no-op.
    /// Called from a job on this worker's own thread, it only queues the
    /// shutdown: the connection closes once the running job returns, and
    /// the thread is left to exit on its own.
    pub(crate) fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if handle.thread().id() == thread::current().id() {
            let (reply, _) = mpsc::channel();
            if self.sender.send(Message::Shutdown(reply)).is_err() {
                return Err(disconnected(self.id));
            }
            tracing::debug!(worker = %self.id, "shutdown requested from own thread");
            return Ok(());
        }

        let (reply, closed) = mpsc::channel();
        let result = match self.sender.send(Message::Shutdown(reply)) {
            Ok(()) => closed
                .recv()
                .unwrap_or_else(|_| Err(disconnected(self.id))),
            Err(_) => Err(disconnected(self.id)),
        };

        if handle.join().is_err() {
            tracing::warn!(worker = %self.id, "worker thread panicked");
        }
        result
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(worker = %self.id, error = %e, "worker shutdown failed");
        }
    }
}

pub(crate) fn disconnected(worker: WorkerId) -> Error {
    Error::Worker(WorkerError {
        kind: WorkerErrorKind::Disconnected,
        message: format!("{} is no longer running", worker),
    })
}

fn worker_loop(id: WorkerId, mut connection: Connection, receiver: &mpsc::Receiver<Message>) {
    tracing::debug!(worker = %id, path = connection.path(), "worker started");
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(job) => job(&connection, id),
            Message::Shutdown(reply) => {
                let closed = connection.close();
                if let Err(e) = &closed {
                    tracing::warn!(worker = %id, error = %e, "connection close failed");
                }
                let _ = reply.send(closed);
                tracing::debug!(worker = %id, "worker stopped");
                return;
            }
        }
    }
    // Every sender is gone; dropping the connection closes it
    tracing::debug!(worker = %id, "worker channel closed");
}
