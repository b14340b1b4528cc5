//! Cooperative shutdown signal.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cloneable, one-shot shutdown flag that sleeping loops can wait on.
///
/// Every clone observes the same flag. Once triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the signal and wakes every waiter.
    pub fn trigger(&self) {
        let mut triggered = self.inner.triggered.lock();
        *triggered = true;
        self.inner.condvar.notify_all();
    }

    /// Returns true once the signal has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.inner.triggered.lock()
    }

    /// Sleeps for up to `timeout`, returning early if the signal fires.
    ///
    /// Returns true if the signal was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut triggered = self.inner.triggered.lock();
        if *triggered || timeout.is_zero() {
            return *triggered;
        }

        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*triggered {
                self.inner.condvar.wait(&mut triggered);
            }
            return true;
        };

        while !*triggered {
            if self
                .inner
                .condvar
                .wait_until(&mut triggered, deadline)
                .timed_out()
            {
                break;
            }
        }
        *triggered
    }
}
