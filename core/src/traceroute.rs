//! # Traceroute
//!
//! A sequential controller over TTL-limited probes. [`TraceMachine`] holds
//! all of the decisions and no I/O, so it can be driven by hand; [`run`]
//! feeds it outcomes from a [`Prober`].
//!
//! Termination, in order of precedence: the destination answered, too many
//! silent hops in a row, the hop limit ran out.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use netprobe_common::Target;
use netprobe_common::config::TraceSettings;
use netprobe_common::probe::{ErrorKind, Metadata, ProbeKind, ProbeOutcome, ProbeRequest};
use netprobe_common::report::{TraceEnd, TraceHop, TraceReport};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::probe::{self, Prober};

const MAX_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    /// Waiting for the outcomes of this TTL.
    Probing(u8),
    /// The hop for this TTL is recorded; the next step is undecided.
    HopRecorded(u8),
    Done(TraceEnd),
}

#[derive(Debug)]
pub struct TraceMachine {
    destination: IpAddr,
    max_hops: u8,
    no_response_limit: u8,
    silent_streak: u8,
    reached: bool,
    hops: Vec<TraceHop>,
    state: TraceState,
}

impl TraceMachine {
    pub fn new(destination: IpAddr, settings: &TraceSettings) -> Self {
        let state = if settings.max_hops == 0 {
            TraceState::Done(TraceEnd::MaxHopsExceeded)
        } else {
            TraceState::Probing(1)
        };
        Self {
            destination,
            max_hops: settings.max_hops,
            no_response_limit: settings.no_response_limit,
            silent_streak: 0,
            reached: false,
            hops: Vec::new(),
            state,
        }
    }

    pub fn state(&self) -> TraceState {
        self.state
    }

    pub fn hops(&self) -> &[TraceHop] {
        &self.hops
    }

    /// Records the outcomes of the probes sent at the current TTL.
    ///
    /// The responder with the best latency becomes the hop. Returns `None`
    /// when the machine is not waiting for outcomes.
    pub fn record(&mut self, outcomes: &[ProbeOutcome]) -> Option<&TraceHop> {
        let TraceState::Probing(ttl) = self.state else {
            return None;
        };

        let mut hop = TraceHop::silent(ttl);
        let mut best: Option<Duration> = None;
        for outcome in outcomes {
            let ProbeOutcome::Success {
                latency,
                meta: Metadata::Hop { responder, reached },
            } = outcome
            else {
                continue;
            };
            if hop.rtts.len() < MAX_SAMPLES {
                hop.rtts.push(*latency);
            }
            if best.is_none_or(|b| *latency < b) {
                best = Some(*latency);
                hop.responder = Some(*responder);
            }
            if *reached || *responder == self.destination {
                hop.terminal = true;
            }
        }

        // The destination wins even when another responder was faster.
        if hop.terminal {
            hop.responder = Some(self.destination);
            self.reached = true;
        }

        let failed = local_failure(outcomes);
        if hop.responder.is_some() {
            self.silent_streak = 0;
        } else {
            self.silent_streak = self.silent_streak.saturating_add(1);
        }

        self.hops.push(hop);
        match failed {
            Some(kind) => self.conclude(TraceEnd::Failed(kind)),
            None => self.state = TraceState::HopRecorded(ttl),
        }
        self.hops.last()
    }

    /// Decides what follows a recorded hop.
    pub fn advance(&mut self) -> TraceState {
        let TraceState::HopRecorded(ttl) = self.state else {
            return self.state;
        };
        if self.reached {
            self.conclude(TraceEnd::DestinationReached);
        } else if self.no_response_limit > 0 && self.silent_streak >= self.no_response_limit {
            self.conclude(TraceEnd::NoResponseStreak);
        } else if ttl >= self.max_hops {
            self.conclude(TraceEnd::MaxHopsExceeded);
        } else {
            self.state = TraceState::Probing(ttl + 1);
        }
        self.state
    }

    pub fn cancel(&mut self) {
        if !matches!(self.state, TraceState::Done(_)) {
            self.conclude(TraceEnd::Cancelled);
        }
    }

    /// Enters `Done(end)`. The last recorded hop becomes the terminal one.
    fn conclude(&mut self, end: TraceEnd) {
        if let Some(last) = self.hops.last_mut() {
            last.terminal = true;
        }
        self.state = TraceState::Done(end);
    }

    pub fn finish(self, elapsed: Duration) -> TraceReport {
        let end = match self.state {
            TraceState::Done(end) => end,
            _ => TraceEnd::Cancelled,
        };
        TraceReport {
            destination: self.destination,
            hops: self.hops,
            end,
            elapsed,
        }
    }
}

/// A shared error kind when every outcome is a local error.
fn local_failure(outcomes: &[ProbeOutcome]) -> Option<ErrorKind> {
    let mut kinds = outcomes.iter().map(|outcome| match outcome {
        ProbeOutcome::Error { kind, .. } => Some(*kind),
        _ => None,
    });
    let first = kinds.next()??;
    kinds.all(|kind| kind == Some(first)).then_some(first)
}

/// Traces the path to `destination`, streaming each hop as it is recorded.
pub async fn run(
    prober: Arc<dyn Prober>,
    destination: IpAddr,
    settings: TraceSettings,
    hops: UnboundedSender<TraceHop>,
    cancel: CancellationToken,
) -> TraceReport {
    let start = Instant::now();
    let mut machine = TraceMachine::new(destination, &settings);
    info!(%destination, max_hops = settings.max_hops, "trace started");

    while let TraceState::Probing(ttl) = machine.state() {
        let mut outcomes = Vec::with_capacity(usize::from(settings.probes()));
        for _ in 0..settings.probes() {
            let request = ProbeRequest::new(
                Target::host(destination),
                ProbeKind::TraceHop { ttl },
                settings.per_hop_timeout,
            );
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = probe::race(request.timeout, prober.execute(&request)) => Some(outcome),
            };
            match outcome {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }

        if cancel.is_cancelled() {
            machine.cancel();
            break;
        }

        if machine.record(&outcomes).is_none() {
            break;
        }
        // Streamed after `advance` so the last hop already carries its terminal flag.
        machine.advance();
        if let Some(hop) = machine.hops().last() {
            debug!(ttl, responder = ?hop.responder, terminal = hop.terminal, "hop recorded");
            let _ = hops.send(hop.clone());
        }
    }

    let report = machine.finish(start.elapsed());
    info!(end = %report.end, hops = report.hops.len(), "trace finished");
    report
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

    const DEST: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));

    fn hop(last_octet: u8, ms: u64) -> ProbeOutcome {
        let responder = IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet));
        ProbeOutcome::Success {
            latency: Duration::from_millis(ms),
            meta: Metadata::Hop { responder, reached: false },
        }
    }

    fn arrival(ms: u64) -> ProbeOutcome {
        ProbeOutcome::Success {
            latency: Duration::from_millis(ms),
            meta: Metadata::Hop { responder: DEST, reached: true },
        }
    }

    fn step(machine: &mut TraceMachine, outcomes: &[ProbeOutcome]) -> TraceState {
        machine.record(outcomes);
        machine.advance()
    }

    #[test]
    fn best_latency_responder_wins() {
        let mut machine = TraceMachine::new(DEST, &TraceSettings::default());
        let recorded = machine
            .record(&[hop(1, 9), hop(2, 3), ProbeOutcome::Timeout])
            .cloned()
            .unwrap();

        assert_eq!(recorded.responder, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
        assert_eq!(recorded.rtts.len(), 2);
        assert_eq!(machine.state(), TraceState::HopRecorded(1));
        assert_eq!(machine.advance(), TraceState::Probing(2));
    }

    #[test]
    fn destination_ends_the_trace() {
        let mut machine = TraceMachine::new(DEST, &TraceSettings::default());
        assert_eq!(step(&mut machine, &[hop(1, 1)]), TraceState::Probing(2));
        assert_eq!(
            step(&mut machine, &[arrival(5)]),
            TraceState::Done(TraceEnd::DestinationReached)
        );
        assert!(machine.hops()[1].terminal);
        assert_eq!(machine.record(&[hop(3, 1)]), None, "done is terminal");
    }

    #[test]
    fn silent_streak_stops_early() {
        let settings = TraceSettings {
            no_response_limit: 2,
            ..TraceSettings::default()
        };
        let mut machine = TraceMachine::new(DEST, &settings);
        step(&mut machine, &[hop(1, 1)]);
        assert_eq!(step(&mut machine, &[ProbeOutcome::Timeout]), TraceState::Probing(3));
        assert_eq!(
            step(&mut machine, &[ProbeOutcome::Timeout, ProbeOutcome::Timeout]),
            TraceState::Done(TraceEnd::NoResponseStreak)
        );
        assert_eq!(machine.hops().len(), 3);
        assert_eq!(machine.hops()[2].responder, None);
        assert!(machine.hops()[2].terminal);
        assert!(!machine.hops()[1].terminal);
    }

    #[test]
    fn a_response_resets_the_streak() {
        let settings = TraceSettings {
            no_response_limit: 2,
            max_hops: 4,
            ..TraceSettings::default()
        };
        let mut machine = TraceMachine::new(DEST, &settings);
        step(&mut machine, &[ProbeOutcome::Timeout]);
        step(&mut machine, &[hop(2, 1)]);
        step(&mut machine, &[ProbeOutcome::Timeout]);
        assert_eq!(
            step(&mut machine, &[hop(4, 1)]),
            TraceState::Done(TraceEnd::MaxHopsExceeded)
        );
        let terminal: Vec<bool> = machine.hops().iter().map(|hop| hop.terminal).collect();
        assert_eq!(terminal, vec![false, false, false, true]);
    }

    #[test]
    fn destination_beats_hop_limit() {
        let settings = TraceSettings {
            max_hops: 1,
            ..TraceSettings::default()
        };
        let mut machine = TraceMachine::new(DEST, &settings);
        assert_eq!(
            step(&mut machine, &[arrival(1)]),
            TraceState::Done(TraceEnd::DestinationReached)
        );
    }

    #[test]
    fn local_errors_fail_the_trace() {
        let mut machine = TraceMachine::new(DEST, &TraceSettings::default());
        let denied = ProbeOutcome::error(ErrorKind::PermissionDenied, "raw socket");
        machine.record(&[denied.clone(), denied]);
        assert_eq!(
            machine.state(),
            TraceState::Done(TraceEnd::Failed(ErrorKind::PermissionDenied))
        );

        assert!(machine.hops()[0].terminal);

        let mut mixed = TraceMachine::new(DEST, &TraceSettings::default());
        mixed.record(&[ProbeOutcome::error(ErrorKind::Io, ""), ProbeOutcome::Timeout]);
        assert_eq!(mixed.state(), TraceState::HopRecorded(1));
    }

    #[test]
    fn differing_error_kinds_do_not_fail_the_trace() {
        let mut machine = TraceMachine::new(DEST, &TraceSettings::default());
        machine.record(&[
            ProbeOutcome::error(ErrorKind::PermissionDenied, "raw socket"),
            ProbeOutcome::error(ErrorKind::Io, "send"),
        ]);
        assert_eq!(machine.state(), TraceState::HopRecorded(1));
        assert_eq!(machine.advance(), TraceState::Probing(2));
    }

    #[test]
    fn cancel_is_terminal() {
        let mut machine = TraceMachine::new(DEST, &TraceSettings::default());
        machine.cancel();
        let report = machine.finish(Duration::ZERO);
        assert_eq!(report.end, TraceEnd::Cancelled);
        assert!(report.hops.is_empty());
    }
}
