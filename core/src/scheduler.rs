//! # Scheduler
//!
//! Runs the requests of one [`ScanJob`] with at most `concurrency` probes in
//! flight. The scheduler task itself only ever waits on four things:
//! cancellation, the overall deadline, probe completions and the admission
//! gate. Outcomes arrive in completion order and are slotted back into
//! expansion order by the [`Aggregator`].
//!
//! Once dispatch stops, whatever is still in flight gets a bounded drain:
//! the grace period after a missed deadline, or until deadline plus grace
//! after a cooperative cancel. A forced cancel aborts everything at once.

use std::sync::Arc;
use std::time::Duration;

use netprobe_common::config::ScanSettings;
use netprobe_common::probe::{ErrorKind, ProbeOutcome, ProbeRequest};
use netprobe_common::report::{HaltReason, ScanEntry, ScanReport};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::gate::AdmissionGate;
use crate::probe::{self, Prober};

/// Ordered requests plus the limits they run under.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub requests: Vec<ProbeRequest>,
    pub concurrency: usize,
    pub deadline: Duration,
    pub grace: Duration,
    pub systemic_threshold: usize,
    pub halt_on_systemic: bool,
}

impl ScanJob {
    pub fn new(requests: Vec<ProbeRequest>, settings: &ScanSettings) -> Self {
        Self {
            requests,
            concurrency: settings.concurrency,
            deadline: settings.deadline,
            grace: settings.grace,
            systemic_threshold: settings.systemic_threshold,
            halt_on_systemic: settings.halt_on_systemic,
        }
    }
}

/// Progress of a running scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Started { total: usize },
    /// One request finished. Carries its expansion index.
    Outcome(ScanEntry),
    /// The leading outcomes all failed the same way. Emitted at most once.
    SystemicFailure { kind: ErrorKind },
    Halted(HaltReason),
}

/// Cancellation switches shared between a scan and whoever controls it.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    cancel: CancellationToken,
    force: CancellationToken,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops dispatch. With `force`, in-flight probes are aborted too.
    pub fn cancel(&self, force: bool) {
        if force {
            self.force.cancel();
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Watches the first completions for a shared failure cause.
#[derive(Debug)]
pub struct SystemicMonitor {
    threshold: usize,
    observed: usize,
    kind: Option<ErrorKind>,
    settled: bool,
}

impl SystemicMonitor {
    /// A threshold of zero never trips.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            observed: 0,
            kind: None,
            settled: threshold == 0,
        }
    }

    /// Returns the shared kind when the threshold is reached, exactly once.
    pub fn observe(&mut self, outcome: &ProbeOutcome) -> Option<ErrorKind> {
        if self.settled {
            return None;
        }
        let ProbeOutcome::Error { kind, .. } = outcome else {
            self.settled = true;
            return None;
        };
        if self.kind.is_some_and(|seen| seen != *kind) {
            self.settled = true;
            return None;
        }

        self.kind = Some(*kind);
        self.observed += 1;
        if self.observed >= self.threshold {
            self.settled = true;
            return self.kind;
        }
        None
    }
}

type Completion = Result<(usize, ProbeOutcome, u32), JoinError>;

/// Bookkeeping shared by the dispatch loop and the drain.
struct Collector {
    aggregator: Aggregator,
    monitor: SystemicMonitor,
    events: UnboundedSender<ScanEvent>,
}

impl Collector {
    fn complete(&mut self, joined: Completion) -> Option<ErrorKind> {
        let (index, outcome, attempts) = match joined {
            Ok(done) => done,
            Err(e) if e.is_cancelled() => return None,
            Err(e) => {
                warn!(error = %e, "probe task failed; its slot stays a timeout");
                return None;
            }
        };

        if let Some(entry) = self.aggregator.entry(index, &outcome, attempts) {
            let _ = self.events.send(ScanEvent::Outcome(entry));
        }
        let systemic = self.monitor.observe(&outcome);
        self.aggregator.record(index, outcome, attempts);

        if let Some(kind) = systemic {
            warn!(%kind, "every leading probe failed the same way");
            let _ = self.events.send(ScanEvent::SystemicFailure { kind });
        }
        systemic
    }
}

/// Runs `job` to completion and returns its report.
pub async fn run(
    job: ScanJob,
    prober: Arc<dyn Prober>,
    gate: Arc<AdmissionGate>,
    control: ScanControl,
    events: UnboundedSender<ScanEvent>,
) -> ScanReport {
    let start = Instant::now();
    let deadline_at = start + job.deadline;
    let deadline = sleep_until(deadline_at);
    tokio::pin!(deadline);

    let mut collector = Collector {
        aggregator: Aggregator::new(&job.requests),
        monitor: SystemicMonitor::new(job.systemic_threshold),
        events,
    };
    let mut queue = collector.aggregator.live_indices().into_iter();
    let mut next = queue.next();
    let mut tasks: JoinSet<(usize, ProbeOutcome, u32)> = JoinSet::new();

    info!(
        total = job.requests.len(),
        concurrency = gate.limit(),
        deadline_ms = job.deadline.as_millis() as u64,
        "scan started"
    );
    let _ = collector.events.send(ScanEvent::Started {
        total: collector.aggregator.submitted(),
    });

    let mut halt = loop {
        if next.is_none() && tasks.is_empty() {
            break HaltReason::Completed;
        }

        tokio::select! {
            biased;

            _ = control.cancel.cancelled() => {
                break HaltReason::Cancelled { forced: control.force.is_cancelled() };
            }
            _ = &mut deadline => break HaltReason::DeadlineExceeded,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Some(kind) = collector.complete(joined)
                    && job.halt_on_systemic
                {
                    break HaltReason::SystemicFailure { kind };
                }
            }
            admission = gate.admit(), if next.is_some() => {
                let (Some(admission), Some(index)) = (admission, next) else {
                    break HaltReason::Cancelled { forced: false };
                };
                let request = job.requests[index].clone();
                let prober = Arc::clone(&prober);
                tasks.spawn(async move {
                    let _admission = admission;
                    let (outcome, attempts) = probe::attempt(prober.as_ref(), &request).await;
                    (index, outcome, attempts)
                });
                next = queue.next();
            }
        }
    };

    // Dispatch is over; nothing may be admitted past this point.
    gate.close();

    let skipped = next.map_or(0, |_| 1) + queue.len();
    if skipped > 0 {
        debug!(skipped, %halt, "requests never dispatched");
    }

    if !matches!(halt, HaltReason::Cancelled { forced: true }) && !tasks.is_empty() {
        let drain_until = match halt {
            HaltReason::DeadlineExceeded => Instant::now() + job.grace,
            _ => deadline_at + job.grace,
        };
        let drain = sleep_until(drain_until);
        tokio::pin!(drain);

        while !tasks.is_empty() {
            tokio::select! {
                biased;

                _ = control.force.cancelled() => {
                    halt = HaltReason::Cancelled { forced: true };
                    break;
                }
                _ = &mut drain => {
                    debug!(in_flight = tasks.len(), "grace period over, aborting probes");
                    break;
                }
                Some(joined) = tasks.join_next() => {
                    collector.complete(joined);
                }
            }
        }
    }

    // Aborts whatever is left and waits for it, so every socket is closed.
    tasks.shutdown().await;

    let elapsed = start.elapsed();
    info!(%halt, elapsed_ms = elapsed.as_millis() as u64, peak = gate.peak(), "scan finished");
    let _ = collector.events.send(ScanEvent::Halted(halt));
    collector.aggregator.finish(halt, elapsed)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
