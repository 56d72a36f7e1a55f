// src/counting/ledger.rs
//
// Single source of truth for the entered/exited counts. Both counters only
// ever increase; occupancy is derived on read and floored at zero. The
// status reporter reads snapshots from another task while the frame loop
// writes, so the pair lives behind one mutex and `snapshot()` can never
// observe a half-updated pair.

use serde::Serialize;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Counters {
    entered: u64,
    exited: u64,
}

#[derive(Debug, Default)]
pub struct OccupancyLedger {
    inner: Mutex<Counters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub entered: u64,
    pub exited: u64,
    pub occupancy: u64,
}

impl OccupancyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // A counter increment cannot leave the pair inconsistent, so a
    // poisoned lock is safe to re-enter.
    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_entry(&self) {
        self.lock().entered += 1;
    }

    /// Records the exit unconditionally for audit. Returns true when the
    /// exit exceeded recorded entries, i.e. displayed occupancy was
    /// already floored at zero.
    pub fn record_exit(&self) -> bool {
        let mut counters = self.lock();
        counters.exited += 1;
        let floored = counters.exited > counters.entered;
        if floored {
            debug!("Exit recorded with occupancy at zero (audit only)");
        }
        floored
    }

    /// Consistent (entered, exited, occupancy) triple. Occupancy is
    /// derived, never stored.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let counters = self.lock();
        LedgerSnapshot {
            entered: counters.entered,
            exited: counters.exited,
            occupancy: counters.entered.saturating_sub(counters.exited),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
