//! Cross-thread wake primitive
//!
//! A latched condition-variable signal: `notify` records the wake even
//! when nobody is waiting yet, so a waiter that arrives late returns
//! immediately instead of sleeping through the event.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

pub(crate) struct WakeSignal {
    pending: Mutex<bool>,
    condition: Condvar,
}

impl WakeSignal {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            condition: Condvar::new(),
        }
    }

    /// Record a wake and release any current waiter.
    pub(crate) fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.condition.notify_all();
    }

    /// Wait until notified or the timeout elapses. Returns whether a wake
    /// was consumed.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if *pending {
            *pending = false;
            return true;
        }
        self.condition.wait_for(&mut pending, timeout);
        let woken = *pending;
        *pending = false;
        woken
    }
}
