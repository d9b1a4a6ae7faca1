//! Counting admission gate.
//!
//! Every probe of a scan holds an [`Admission`] for its whole run. The gate
//! never hands out more admissions than its limit, and it records how many
//! are out right now and the most that were ever out at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl AdmissionGate {
    /// A gate admitting at most `limit` holders, never less than one.
    pub fn new(limit: usize) -> Arc<Self> {
        let limit = limit.max(1);
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Waits for a free slot. Returns `None` once the gate is closed.
    pub async fn admit(self: &Arc<Self>) -> Option<Admission> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);

        Some(Admission {
            _permit: permit,
            gate: Arc::clone(self),
        })
    }

    /// Stops admitting. Waiters and later callers get `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

/// Proof of admission. The slot frees when this drops.
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    gate: Arc<AdmissionGate>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        // Runs before the permit field drops, so the count never exceeds the limit.
        self.gate.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
