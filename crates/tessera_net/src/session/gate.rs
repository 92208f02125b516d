//! Scene-ready signal.
//!
//! The session must not touch the entity table before the scene has placed
//! its entities, so `Session::start` waits on this gate.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// One-shot readiness signal, safe to share between threads.
#[derive(Debug, Default)]
pub struct SceneGate {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl SceneGate {
    /// A closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the gate and wakes every waiter.
    pub fn mark_ready(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.condvar.notify_all();
    }

    /// Whether the gate is open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.lock()
    }

    /// Blocks until the gate opens or `timeout` passes. Returns whether it
    /// opened.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut ready = self.ready.lock();
        while !*ready {
            if self.condvar.wait_until(&mut ready, deadline).timed_out() {
                return *ready;
            }
        }
        true
    }
}
