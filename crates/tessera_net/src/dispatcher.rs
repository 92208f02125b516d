//! # Main-Context Dispatcher
//!
//! Background loops never touch the [`World`](crate::world::World). They
//! package the mutation as a closure and enqueue it; the coordinator context
//! drains the queue once per tick.
//!
//! ```text
//! server loop ──┐
//! client loop ──┼──▶ [ action, action, ... ] ──▶ drain(&mut world)
//! scene code  ──┘        (FIFO, unbounded)
//! ```
//!
//! A failing action is logged and counted; the rest of the queue still runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::warn;

use crate::error::NetResult;

/// A deferred mutation of `T`.
pub type Action<T> = Box<dyn FnOnce(&mut T) -> NetResult<()> + Send>;

/// Result of one drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions that ran.
    pub executed: usize,
    /// Actions that returned an error.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    enqueued: AtomicU64,
    failed: AtomicU64,
}

/// Cloneable submit side, handed to background threads.
pub struct DispatchHandle<T> {
    sender: Sender<Action<T>>,
    counters: Arc<DispatchCounters>,
}

impl<T> Clone for DispatchHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T> DispatchHandle<T> {
    /// Queues an action. Returns false once the dispatcher is gone.
    pub fn enqueue<F>(&self, action: F) -> bool
    where
        F: FnOnce(&mut T) -> NetResult<()> + Send + 'static,
    {
        let sent = self.sender.send(Box::new(action)).is_ok();
        if sent {
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }
}

/// FIFO of actions executed in the coordinator context.
pub struct Dispatcher<T> {
    sender: Sender<Action<T>>,
    receiver: Receiver<Action<T>>,
    counters: Arc<DispatchCounters>,
}

impl<T> Dispatcher<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    /// A new submit handle.
    #[must_use]
    pub fn handle(&self) -> DispatchHandle<T> {
        DispatchHandle {
            sender: self.sender.clone(),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Actions waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Total actions ever queued.
    #[must_use]
    pub fn total_enqueued(&self) -> u64 {
        self.counters.enqueued.load(Ordering::Relaxed)
    }

    /// Total actions that failed.
    #[must_use]
    pub fn total_failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Runs every action queued before the call, in order.
    ///
    /// Actions enqueued while draining wait for the next call, so a busy
    /// producer cannot stall the tick.
    pub fn drain(&self, target: &mut T) -> DrainReport {
        let mut report = DrainReport::default();
        for _ in 0..self.receiver.len() {
            let Ok(action) = self.receiver.try_recv() else {
                break;
            };
            report.executed += 1;
            if let Err(error) = action(target) {
                report.failed += 1;
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%error, "dispatched action failed");
            }
        }
        report
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}
