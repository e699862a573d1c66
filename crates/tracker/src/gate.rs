//! Shutdown busy-gate.
//!
//! Contract:
//! - every public entry point and every dispatched event takes a read hold;
//!   shutdown takes the write hold exactly once;
//! - `try_enter` never blocks: it fails fast once shutdown has started;
//! - permits are RAII guards, so a hold is released on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, RwLockReadGuard};

/// Read-writer gate that blocks new work during teardown.
#[derive(Debug, Default)]
pub struct BusyGate {
    closed: AtomicBool,
    lock: RwLock<()>,
}

/// Scoped read hold on the gate.
#[derive(Debug)]
pub struct BusyPermit<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

impl BusyGate {
    /// Open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a read hold, or `None` once shutdown is in progress.
    pub fn try_enter(&self) -> Option<BusyPermit<'_>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.lock
            .try_read()
            .ok()
            .map(|guard| BusyPermit { _guard: guard })
    }

    /// Close the gate and wait for in-flight read holds to drain. Only the
    /// first call waits; later calls return immediately.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _write = self.lock.write().await;
        }
    }

    /// Whether shutdown has started.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
