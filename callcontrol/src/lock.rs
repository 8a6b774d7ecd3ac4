//! Serialized switchboard actions.
//!
//! One lock instance covers one resource class. Different subjects
//! sharing the instance serialize against each other on purpose: the
//! switchboard holding area is coarser grained than the subject ids we
//! log. Every acquire gets a random transaction id so a contention
//! timeline can be rebuilt from the logs alone.

use std::time::Instant;

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

pub struct SwitchboardLock {
    inner: Mutex<()>,
}

/// Scope of one serialized action. Dropping it releases the lock and
/// logs the hold duration, on every exit path of the guarded code.
pub struct SwitchboardLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    subject: String,
    transaction: String,
    acquired: Instant,
}

impl Default for SwitchboardLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchboardLock {
    pub fn new() -> SwitchboardLock {
        SwitchboardLock {
            inner: Mutex::new(()),
        }
    }

    /// Block until the lock is free. The holder must not re-acquire.
    pub async fn acquire(&self, subject: &str) -> SwitchboardLockGuard<'_> {
        let transaction = lark_utils::rand_string(10);
        info!(
            subject,
            transaction, "about to acquire the switchboard lock"
        );
        let start = Instant::now();
        let guard = self.inner.lock().await;
        info!(
            subject,
            transaction,
            waited = ?start.elapsed(),
            "acquired the switchboard lock"
        );
        SwitchboardLockGuard {
            _guard: guard,
            subject: subject.to_string(),
            transaction,
            acquired: Instant::now(),
        }
    }
}

impl Drop for SwitchboardLockGuard<'_> {
    fn drop(&mut self) {
        info!(
            subject = %self.subject,
            transaction = %self.transaction,
            held = ?self.acquired.elapsed(),
            "released the switchboard lock"
        );
    }
}
