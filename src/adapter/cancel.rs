//! Run-scoped cancellation signal
//!
//! The engine trips a run's signal from `cancel()` or when the run is
//! abandoned. Tasks still queued on the admission gate settle as CANCELLED
//! without reaching their adapter. Running adapters see the same signal and
//! may poll it between pages or await it alongside their I/O. Whatever an
//! adapter already returned stays valid.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Signal {
    tripped: AtomicBool,
    waiters: Notify,
}

/// Shared by every task of one orchestration run; clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    signal: Arc<Signal>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.tripped.load(Ordering::Acquire)
    }

    /// Trip the signal and wake every task waiting in [`cancelled`].
    ///
    /// Returns true only for the call that actually tripped it.
    ///
    /// [`cancelled`]: CancellationToken::cancelled
    pub fn cancel(&self) -> bool {
        let first = !self.signal.tripped.swap(true, Ordering::AcqRel);
        if first {
            self.signal.waiters.notify_waiters();
        }
        first
    }

    /// Resolves once the run has been cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() cannot be missed
            let notified = self.signal.waiters.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
