//! Cooperative cancellation for long-running computes.
//!
//! A [`CancelToken`] is cloned into a compute request and observed at the
//! coarse suspension points only: between λ-search iterations and between
//! DP stage sweeps. Cancellation is advisory — the compute returns
//! [`SolveError::Cancelled`](crate::error::SolveError::Cancelled) at the
//! next checkpoint and leaves no partial state behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; safe from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
