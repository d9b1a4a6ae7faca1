//! Collects per-request outcomes into an ordered [`ScanReport`].
//!
//! Slots are laid out in expansion order up front and start as `Timeout`, so a
//! request that never ran or never finished still shows up exactly once.

use std::collections::HashMap;
use std::time::Duration;

use netprobe_common::Target;
use netprobe_common::probe::{ProbeKind, ProbeOutcome, ProbeRequest};
use netprobe_common::report::{HaltReason, ScanEntry, ScanReport, ScanSummary};
use tracing::warn;

#[derive(Debug)]
struct Slot {
    target: Target,
    kind: ProbeKind,
    outcome: ProbeOutcome,
    attempts: u32,
}

#[derive(Debug)]
pub struct Aggregator {
    /// `None` marks a request superseded by a later duplicate.
    slots: Vec<Option<Slot>>,
    collapsed: usize,
}

impl Aggregator {
    /// Lays out one slot per request. When the same target and kind appear
    /// more than once, only the last occurrence keeps its slot.
    pub fn new(requests: &[ProbeRequest]) -> Self {
        let mut last_seen: HashMap<(Target, &ProbeKind), usize> = HashMap::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            last_seen.insert((request.target, &request.kind), index);
        }

        let slots: Vec<Option<Slot>> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                let last = last_seen.get(&(request.target, &request.kind)).copied();
                (last == Some(index)).then(|| Slot {
                    target: request.target,
                    kind: request.kind.clone(),
                    outcome: ProbeOutcome::Timeout,
                    attempts: 0,
                })
            })
            .collect();

        let collapsed = requests.len() - last_seen.len();
        if collapsed > 0 {
            warn!(collapsed, "duplicate targets collapsed; the last occurrence wins");
        }

        Self { slots, collapsed }
    }

    /// Indexes that should be dispatched, in expansion order.
    pub fn live_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| index))
            .collect()
    }

    pub fn submitted(&self) -> usize {
        self.slots.len()
    }

    /// Stores the outcome for `index`. Each slot is written at most once by the scheduler.
    pub fn record(&mut self, index: usize, outcome: ProbeOutcome, attempts: u32) {
        if let Some(Some(slot)) = self.slots.get_mut(index) {
            slot.outcome = outcome;
            slot.attempts = attempts;
        }
    }

    /// Builds the entry that `record` would produce, without storing it.
    pub fn entry(&self, index: usize, outcome: &ProbeOutcome, attempts: u32) -> Option<ScanEntry> {
        let slot = self.slots.get(index)?.as_ref()?;
        Some(ScanEntry {
            index,
            target: slot.target,
            kind: slot.kind.clone(),
            outcome: outcome.clone(),
            attempts,
        })
    }

    pub fn finish(self, halt: HaltReason, elapsed: Duration) -> ScanReport {
        let submitted = self.slots.len();
        let entries: Vec<ScanEntry> = self
            .slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.map(|slot| ScanEntry {
                    index,
                    target: slot.target,
                    kind: slot.kind,
                    outcome: slot.outcome,
                    attempts: slot.attempts,
                })
            })
            .collect();

        ScanReport {
            summary: ScanSummary::from_entries(&entries),
            entries,
            elapsed,
            halt,
            submitted,
            collapsed_duplicates: self.collapsed,
        }
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
