//! Lamport logical clock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic scalar clock shared by every component of a node.
///
/// The clock stamps every outbound envelope and absorbs the stamp of every
/// inbound envelope before it is dispatched, so causally related messages
/// carry increasing values.
#[derive(Debug, Default)]
pub struct LamportClock {
    value: AtomicU64,
}

impl LamportClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value without advancing.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Advance for a local event and return the new value.
    pub fn tick_local(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Merge a remote stamp: the clock becomes `max(current, remote) + 1`.
    pub fn tick_remote(&self, remote: u64) -> u64 {
        let mut current = self.value.load(Ordering::SeqCst);
        loop {
            let next = current.max(remote) + 1;
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}
