//! One-shot handles for job results.

use crate::worker::{WorkerId, disconnected};
use sqlkit_core::Result;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// The eventual result of a job submitted to a worker.
///
/// Blocking on it is the only way a caller waits for the dispatcher.
/// Dropping it does not cancel the job; the result is discarded.
pub struct WorkerFuture<R> {
    receiver: mpsc::Receiver<Result<R>>,
    worker: WorkerId,
    ready: Option<Result<R>>,
}

impl<R> WorkerFuture<R> {
    pub(crate) fn new(receiver: mpsc::Receiver<Result<R>>, worker: WorkerId) -> Self {
        Self {
            receiver,
            worker,
            ready: None,
        }
    }

    /// The worker the job was queued on.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Has the job finished? Never blocks.
    pub fn is_ready(&mut self) -> bool {
        if self.ready.is_some() {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.ready = Some(result);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.ready = Some(Err(disconnected(self.worker)));
                true
            }
        }
    }

    /// Block until the job finishes and return its result.
    ///
    /// There is no timeout: a job that never finishes blocks forever. Use
    /// [`WorkerFuture::wait_timeout`] for a bounded wait.
    pub fn wait(self) -> Result<R> {
        if let Some(result) = self.ready {
            return result;
        }
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(disconnected(self.worker)))
    }

    /// Wait at most `timeout`. On timeout the still-pending future is
    /// handed back; the job keeps running.
    pub fn wait_timeout(mut self, timeout: Duration) -> std::result::Result<Result<R>, Self> {
        if let Some(result) = self.ready.take() {
            return Ok(result);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(disconnected(self.worker))),
        }
    }

    /// Block for the result and hand it to `f`.
    pub fn consume<U, F>(self, f: F) -> U
    where
        F: FnOnce(Result<R>) -> U,
    {
        f(self.wait())
    }
}

impl<R> fmt::Debug for WorkerFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerFuture")
            .field("worker", &self.worker)
            .field("ready", &self.ready.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlkit_core::{Error, WorkerErrorKind};

    fn is_disconnected(err: &Error) -> bool {
        matches!(err, Error::Worker(w) if w.kind == WorkerErrorKind::Disconnected)
    }

    #[test]
    fn test_ready_value() {
        let (tx, rx) = mpsc::channel();
        let mut future = WorkerFuture::new(rx, WorkerId::Writer);
        assert!(!future.is_ready());
        tx.send(Ok(7)).unwrap();
        assert!(future.is_ready());
        assert_eq!(future.wait().unwrap(), 7);
    }

    #[test]
    fn test_dropped_sender_is_disconnected() {
        let (tx, rx) = mpsc::channel::<Result<i32>>();
        drop(tx);
        let future = WorkerFuture::new(rx, WorkerId::Reader(1));
        let err = future.wait().unwrap_err();
        assert!(is_disconnected(&err));
        assert!(err.to_string().contains("reader-1"));
    }

    #[test]
    fn test_wait_timeout_returns_pending_future() {
        let (tx, rx) = mpsc::channel();
        let future = WorkerFuture::new(rx, WorkerId::Writer);
        let future = future
            .wait_timeout(Duration::from_millis(10))
            .unwrap_err();
        tx.send(Ok("done")).unwrap();
        let result = future
            .wait_timeout(Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(result, "done");
    }

    #[test]
    fn test_consume() {
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(2)).unwrap();
        let doubled = WorkerFuture::new(rx, WorkerId::Writer).consume(|r| r.unwrap() * 2);
        assert_eq!(doubled, 4);
    }
}
