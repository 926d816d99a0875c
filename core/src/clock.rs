//! Ledger clock
//!
//! The engines never advance time themselves. They read a monotonic counter
//! (block height or timestamp, the unit is the deployer's choice) once per
//! transaction and express every timing rule as a precondition on that value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Read-only source of the current ledger step
pub trait LedgerClock: Send + Sync {
    fn now(&self) -> u64;
}

/// Clock driven by hand. Clones share the same counter, so a test or the
/// simulator can keep one handle while the runtime holds another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Move the clock forward by `steps`. Saturates instead of wrapping.
    pub fn advance(&self, steps: u64) -> u64 {
        let mut current = self.now.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_add(steps);
            match self
                .now
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Jump to `target`. Moving backwards is ignored to keep the clock monotonic.
    pub fn set(&self, target: u64) -> u64 {
        self.now.fetch_max(target, Ordering::SeqCst).max(target)
    }
}

impl LedgerClock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
