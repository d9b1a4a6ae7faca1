//! # Reports
//!
//! Immutable results handed back to callers once a job finishes: scan
//! reports with their summaries, traceroute reports, ping reports and the
//! connectivity verdict.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::network::target::Target;
use crate::probe::{ErrorKind, OutcomeClass, ProbeKind, ProbeOutcome};

/// One reported target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Position in the expansion.
    pub index: usize,
    pub target: Target,
    pub kind: ProbeKind,
    pub outcome: ProbeOutcome,
    /// Attempts actually made. Zero when the probe never ran.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub success: usize,
    pub refused_or_closed: usize,
    pub timeout: usize,
    pub unreachable: usize,
    pub error: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, class: OutcomeClass) {
        match class {
            OutcomeClass::Success => self.success += 1,
            OutcomeClass::RefusedOrClosed => self.refused_or_closed += 1,
            OutcomeClass::Timeout => self.timeout += 1,
            OutcomeClass::Unreachable => self.unreachable += 1,
            OutcomeClass::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.refused_or_closed + self.timeout + self.unreachable + self.error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
}

impl LatencyStats {
    /// Returns `None` for an empty sample set.
    pub fn from_samples(samples: impl IntoIterator<Item = Duration>) -> Option<Self> {
        let mut count: u32 = 0;
        let mut sum = Duration::ZERO;
        let mut min = Duration::MAX;
        let mut max = Duration::ZERO;

        for sample in samples {
            count += 1;
            sum += sample;
            min = min.min(sample);
            max = max.max(sample);
        }

        (count > 0).then(|| Self {
            min,
            avg: sum / count,
            max,
        })
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        write!(
            f,
            "min {:.1} ms / avg {:.1} ms / max {:.1} ms",
            ms(self.min),
            ms(self.avg),
            ms(self.max)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub totals: OutcomeCounts,
    /// Counts grouped by [`ProbeKind::label`].
    pub by_kind: BTreeMap<&'static str, OutcomeCounts>,
    /// Computed over successful outcomes only.
    pub latency: Option<LatencyStats>,
    /// Distinct addresses with at least one success.
    pub reachable_hosts: usize,
}

impl ScanSummary {
    pub fn from_entries(entries: &[ScanEntry]) -> Self {
        let mut summary = ScanSummary::default();
        let mut reachable: HashSet<IpAddr> = HashSet::new();

        for entry in entries {
            let class = entry.outcome.class();
            summary.totals.record(class);
            summary
                .by_kind
                .entry(entry.kind.label())
                .or_default()
                .record(class);
            if entry.outcome.is_success() {
                reachable.insert(entry.target.addr);
            }
        }

        summary.latency =
            LatencyStats::from_samples(entries.iter().filter_map(|e| e.outcome.latency()));
        summary.reachable_hosts = reachable.len();
        summary
    }
}

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    Completed,
    Cancelled { forced: bool },
    DeadlineExceeded,
    SystemicFailure { kind: ErrorKind },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::Completed => f.write_str("completed"),
            HaltReason::Cancelled { forced: false } => f.write_str("cancelled"),
            HaltReason::Cancelled { forced: true } => f.write_str("cancelled (forced)"),
            HaltReason::DeadlineExceeded => f.write_str("deadline exceeded"),
            HaltReason::SystemicFailure { kind } => write!(f, "systemic failure: {kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// One entry per distinct submitted target, in expansion order.
    pub entries: Vec<ScanEntry>,
    pub summary: ScanSummary,
    pub elapsed: Duration,
    pub halt: HaltReason,
    /// Requests produced by the expansion, duplicates included.
    pub submitted: usize,
    pub collapsed_duplicates: usize,
}

impl ScanReport {
    pub fn successes(&self) -> impl Iterator<Item = &ScanEntry> {
        self.entries.iter().filter(|e| e.outcome.is_success())
    }

    pub fn outcome_for(&self, target: &Target) -> Option<&ProbeOutcome> {
        self.entries
            .iter()
            .find(|e| e.target == *target)
            .map(|e| &e.outcome)
    }
}

/// A single TTL step of a traceroute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHop {
    pub ttl: u8,
    pub responder: Option<IpAddr>,
    /// Round-trip samples in send order, at most three.
    pub rtts: Vec<Duration>,
    /// Set on the last hop of a finished trace, whatever ended it.
    pub terminal: bool,
}

impl TraceHop {
    pub fn silent(ttl: u8) -> Self {
        Self {
            ttl,
            responder: None,
            rtts: Vec::new(),
            terminal: false,
        }
    }

    pub fn best_rtt(&self) -> Option<Duration> {
        self.rtts.iter().min().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEnd {
    DestinationReached,
    MaxHopsExceeded,
    /// Heuristic early exit after too many silent hops in a row.
    NoResponseStreak,
    Cancelled,
    /// Every probe of a hop failed locally, so no later hop can succeed either.
    Failed(ErrorKind),
}

impl fmt::Display for TraceEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEnd::DestinationReached => f.write_str("destination reached"),
            TraceEnd::MaxHopsExceeded => f.write_str("maximum hops exceeded"),
            TraceEnd::NoResponseStreak => f.write_str("too many silent hops"),
            TraceEnd::Cancelled => f.write_str("cancelled"),
            TraceEnd::Failed(kind) => write!(f, "failed: {kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceReport {
    pub destination: IpAddr,
    pub hops: Vec<TraceHop>,
    pub end: TraceEnd,
    pub elapsed: Duration,
}

impl TraceReport {
    pub fn reached(&self) -> bool {
        self.end == TraceEnd::DestinationReached
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingSample {
    pub seq: u16,
    pub outcome: ProbeOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingVerdict {
    /// Every request was answered.
    Alive,
    /// Some requests were lost.
    Partial,
    /// The session stopped after `after` consecutive timeouts.
    HostDown { after: u32 },
    /// Nothing answered, or the network reported the host unreachable.
    Unreachable,
}

impl fmt::Display for PingVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PingVerdict::Alive => f.write_str("alive"),
            PingVerdict::Partial => f.write_str("partial loss"),
            PingVerdict::HostDown { after } => {
                write!(f, "host down ({after} consecutive timeouts)")
            }
            PingVerdict::Unreachable => f.write_str("unreachable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReport {
    pub target: IpAddr,
    pub samples: Vec<PingSample>,
    pub sent: u32,
    pub received: u32,
    pub latency: Option<LatencyStats>,
    pub verdict: PingVerdict,
    pub elapsed: Duration,
}

impl PingReport {
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        f64::from(self.sent - self.received) * 100.0 / f64::from(self.sent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityVerdict {
    Online,
    /// Some checks passed.
    Degraded,
    Offline,
}

impl fmt::Display for ConnectivityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityVerdict::Online => f.write_str("online"),
            ConnectivityVerdict::Degraded => f.write_str("degraded"),
            ConnectivityVerdict::Offline => f.write_str("offline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityCheck {
    /// Human-readable name of what was checked, such as `1.1.1.1:53` or `A github.com`.
    pub label: String,
    pub outcome: ProbeOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityReport {
    pub checks: Vec<ConnectivityCheck>,
    pub verdict: ConnectivityVerdict,
    pub elapsed: Duration,
}

impl ConnectivityReport {
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.outcome.is_success()).count()
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn entry(index: usize, last_octet: u8, port: u16, outcome: ProbeOutcome) -> ScanEntry {
        ScanEntry {
            index,
            target: Target::new(
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)),
                Some(port),
            ),
            kind: ProbeKind::TcpConnect,
            outcome,
            attempts: 1,
        }
    }

    #[test]
    fn summary_counts_and_latency_use_successes_only() {
        let ms = Duration::from_millis;
        let entries = vec![
            entry(0, 1, 22, ProbeOutcome::success(ms(10))),
            entry(1, 1, 80, ProbeOutcome::success(ms(30))),
            entry(2, 2, 22, ProbeOutcome::RefusedOrClosed),
            entry(3, 3, 22, ProbeOutcome::Timeout),
            entry(4, 4, 22, ProbeOutcome::error(ErrorKind::Io, "boom")),
        ];

        let summary = ScanSummary::from_entries(&entries);
        assert_eq!(summary.totals.success, 2);
        assert_eq!(summary.totals.refused_or_closed, 1);
        assert_eq!(summary.totals.timeout, 1);
        assert_eq!(summary.totals.error, 1);
        assert_eq!(summary.totals.total(), 5);
        assert_eq!(summary.by_kind["tcp-connect"].total(), 5);
        assert_eq!(summary.reachable_hosts, 1);

        let latency = summary.latency.unwrap();
        assert_eq!(latency.min, ms(10));
        assert_eq!(latency.avg, ms(20));
        assert_eq!(latency.max, ms(30));
    }

    #[test]
    fn no_successes_means_no_latency() {
        let entries = vec![entry(0, 1, 22, ProbeOutcome::Timeout)];
        assert_eq!(ScanSummary::from_entries(&entries).latency, None);
        assert_eq!(LatencyStats::from_samples(Vec::new()), None);
    }

    #[test]
    fn ping_loss() {
        let report = PingReport {
            target: IpAddr::V4(Ipv4Addr::LOCALHOST),
            samples: Vec::new(),
            sent: 4,
            received: 3,
            latency: None,
            verdict: PingVerdict::Partial,
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.loss_percent(), 25.0);
    }

    #[test]
    fn best_rtt_is_the_minimum() {
        let hop = TraceHop {
            ttl: 3,
            responder: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            rtts: vec![Duration::from_millis(7), Duration::from_millis(4)],
            terminal: false,
        };
        assert_eq!(hop.best_rtt(), Some(Duration::from_millis(4)));
        assert_eq!(TraceHop::silent(4).best_rtt(), None);
    }
}
