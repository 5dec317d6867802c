//! Watch connection accounting.
//!
//! Tracks open watch WebSockets and enforces a process-wide limit. The count
//! is only ever released by dropping a `ConnectionGuard`, so it cannot leak on
//! panic or task cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::gauge;

/// Returned when every watch slot is taken.
#[derive(Debug, thiserror::Error)]
#[error("watch connection limit exceeded ({limit} max)")]
pub struct ConnectionLimitError {
    pub limit: usize,
}

pub struct WatchConnections {
    max: usize,
    active: AtomicUsize,
}

impl WatchConnections {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            active: AtomicUsize::new(0),
        }
    }

    /// Claim a slot. The slot is released when the guard drops.
    pub fn try_acquire(self: &Arc<Self>) -> Result<ConnectionGuard, ConnectionLimitError> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .map_err(|_| ConnectionLimitError { limit: self.max })?;
        gauge!("jobwatch_watch_connections").increment(1.0);
        Ok(ConnectionGuard {
            manager: Arc::clone(self),
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

pub struct ConnectionGuard {
    manager: Arc<WatchConnections>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.active.fetch_sub(1, Ordering::AcqRel);
        gauge!("jobwatch_watch_connections").decrement(1.0);
    }
}
