//! Cooperative cancellation for a running query (spec.md §5 supplemental).
//! The core itself defines no time budget or suspension points — this is
//! an opt-in external token an embedder can thread through `loop_` between
//! callback invocations, grounded in the teacher's
//! `execution::timeout::QueryTimeout`/`CancelHandle` `Arc<AtomicBool>`
//! pattern, trimmed down to cancellation only (the teacher's own duration
//! bookkeeping and `with_timeout` helpers have no counterpart here: the
//! core never measures wall-clock time itself).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Cloning yields another handle to the same
/// underlying flag.
#[derive(Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Cancellation { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn handle(&self) -> CancelHandle {
        CancelHandle { cancelled: Arc::clone(&self.cancelled) }
    }
}

/// A handle an embedder can hold separately from the `Cancellation` used
/// inside the query, e.g. to cancel from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_cancels_the_shared_flag() {
        let c = Cancellation::new();
        let h = c.handle();
        assert!(!c.is_cancelled());
        h.cancel();
        assert!(c.is_cancelled());
    }
}
