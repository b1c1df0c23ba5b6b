//! Bounded hand-off between a blocking reader thread and its consumer
//!
//! The in-process server must never block on channel I/O while the traced
//! program is running, but it does need to notice requests that arrive
//! between calls. [`CommandQueue`] owns a background thread that repeatedly
//! runs a *produce* function (typically "decode one request from the
//! channel") and pushes each result into a bounded FIFO. The consumer can
//! then poll cheaply with [`CommandQueue::has_data`] or wait with
//! [`CommandQueue::get_item`].
//!
//! The producer blocks once `capacity` items are waiting and resumes as soon
//! as the consumer takes one. When the produce function reports exhaustion an
//! end marker is queued, so a waiting consumer wakes up and sees `None`.
//!
//! The reader thread is never interrupted while it is blocked inside the
//! produce function. Dropping the queue detaches it; the thread notices the
//! missing consumer the next time it tries to queue an item.
//!
//! ```
//! use transport::CommandQueue;
//!
//! let mut items = vec![3, 2, 1];
//! let queue = CommandQueue::spawn(2, move || items.pop())?;
//!
//! assert_eq!(queue.get_item(), Some(1));
//! assert_eq!(queue.get_item(), Some(2));
//! assert_eq!(queue.get_item(), Some(3));
//! assert_eq!(queue.get_item(), None);
//! # Ok::<(), eyre::Error>(())
//! ```

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use eyre::{Context, Result};

/// Matches a four slot ring that keeps one slot free
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Single-producer, single-consumer bounded queue fed by a reader thread
pub struct CommandQueue<T> {
    // `None` is the end-of-stream marker
    rx: Receiver<Option<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> CommandQueue<T> {
    /// Start the reader thread
    ///
    /// `produce` returns `Some(item)` for every item and `None` once the
    /// source is exhausted, after which it is not called again.
    pub fn spawn<P>(capacity: usize, produce: P) -> Result<Self>
    where
        P: FnMut() -> Option<T> + Send + 'static,
    {
        Self::spawn_with_wakeup(capacity, produce, || {})
    }

    /// Start the reader thread, running `wakeup` after each item is queued
    pub fn spawn_with_wakeup<P, W>(capacity: usize, mut produce: P, wakeup: W) -> Result<Self>
    where
        P: FnMut() -> Option<T> + Send + 'static,
        W: Fn() + Send + 'static,
    {
        eyre::ensure!(capacity >= 1, "queue capacity must be at least one");
        let (tx, rx) = crossbeam_channel::bounded(capacity);

        let worker = thread::Builder::new()
            .name("gldb-command-reader".to_string())
            .spawn(move || {
                reader_loop(&tx, &mut produce, &wakeup);
            })
            .context("spawning command reader thread")?;

        Ok(Self {
            rx,
            worker: Some(worker),
        })
    }

    /// Whether [`get_item`](Self::get_item) would return without blocking
    ///
    /// Never blocks. Also true when only the end marker is pending.
    pub fn has_data(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Take the oldest item, blocking until one is available
    ///
    /// Returns `None` once the producer is exhausted.
    pub fn get_item(&self) -> Option<T> {
        match self.rx.recv() {
            Ok(item) => item,
            // reader thread is gone, so nothing more will arrive
            Err(_) => None,
        }
    }

    /// Join the reader thread
    ///
    /// Only call this once the producer is known to be exhausted, otherwise it
    /// blocks for as long as the reader is blocked in its produce function.
    pub fn stop(mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| eyre::eyre!("command reader thread panicked"))?;
        }
        Ok(())
    }
}

fn reader_loop<T>(tx: &Sender<Option<T>>, produce: &mut dyn FnMut() -> Option<T>, wakeup: &dyn Fn()) {
    loop {
        let item = produce();
        let exhausted = item.is_none();
        if tx.send(item).is_err() {
            tracing::debug!("command queue consumer dropped, stopping reader");
            return;
        }
        wakeup();
        if exhausted {
            tracing::debug!("command source exhausted");
            return;
        }
    }
}
