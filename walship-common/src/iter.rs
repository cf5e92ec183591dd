//! Pull-based iteration over a background listing task.
//!
//! A `ListingIterator` owns one spawned fetch task. The task pushes decoded
//! entries through a single-slot channel (`Feed`) and the consumer pulls them
//! with `next()`. Cancelling the caller's token, or calling `close()`, stops
//! the task at its next checkpoint.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ReplicaError, Result};
use crate::types::{SnapshotInfo, WalSegmentInfo};

/// Producer side of a listing iterator, handed to the fetch task.
pub struct Feed<T> {
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

impl<T: Send> Feed<T> {
    /// Hand one entry to the consumer and wait until the consumer has
    /// received it.
    ///
    /// Returns false if the iterator was cancelled or dropped first. An entry
    /// still waiting for receipt when cancellation wins is discarded.
    pub async fn send(&self, item: T) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            res = self.tx.send(item) => {
                if res.is_err() {
                    return false;
                }
            }
        }

        // The channel holds a single slot, so capacity comes back only once
        // the consumer has taken the entry.
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            permit = self.tx.reserve() => permit.is_ok(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

pub struct ListingIterator<T> {
    rx: mpsc::Receiver<T>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
    current: Option<T>,
    err: Option<ReplicaError>,
}

pub type SnapshotIterator = ListingIterator<SnapshotInfo>;
pub type WalSegmentIterator = ListingIterator<WalSegmentInfo>;

impl<T: Send + 'static> ListingIterator<T> {
    /// Spawn `fetch` on the runtime and return an iterator positioned before
    /// the first entry. The task runs under a child of `parent`.
    pub fn spawn<F, Fut>(parent: &CancellationToken, fetch: F) -> Self
    where
        F: FnOnce(Feed<T>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = parent.child_token();
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(fetch(Feed {
            tx,
            cancel: cancel.clone(),
        }));

        Self {
            rx,
            cancel,
            task: Some(task),
            current: None,
            err: None,
        }
    }
}

impl<T> ListingIterator<T> {
    /// Advance to the next entry. Returns false on exhaustion, cancellation,
    /// or after an error has been recorded; check `err()` to tell them apart.
    pub async fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            item = self.rx.recv() => match item {
                Some(item) => {
                    self.current = Some(item);
                    true
                }
                None => {
                    // Channel closed: the task has finished, collect its result.
                    self.join().await;
                    false
                }
            },
        }
    }

    /// The entry captured by the last `next()` that returned true.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn err(&self) -> Option<&ReplicaError> {
        self.err.as_ref()
    }

    /// Cancel the fetch task, wait for it, and return the first error seen.
    pub async fn close(mut self) -> Result<()> {
        self.cancel.cancel();

        let task_result = match self.task.take() {
            Some(task) => flatten(task.await),
            None => Ok(()),
        };

        match self.err.take() {
            Some(err) => Err(err),
            None => task_result,
        }
    }

    /// Drain every remaining entry, then close.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while self.next().await {
            if let Some(item) = self.current.take() {
                items.push(item);
            }
        }
        self.close().await?;
        Ok(items)
    }

    async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = flatten(task.await) {
                warn!(error = %e, "Listing task failed");
                self.err = Some(e);
            }
        }
    }
}

impl SnapshotIterator {
    pub fn snapshot(&self) -> Option<&SnapshotInfo> {
        self.current()
    }
}

impl WalSegmentIterator {
    pub fn wal_segment(&self) -> Option<&WalSegmentInfo> {
        self.current()
    }
}

impl<T> Drop for ListingIterator<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn flatten(res: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match res {
        Ok(inner) => inner,
        Err(e) => Err(ReplicaError::Task(e.to_string())),
    }
}
