//! # Ping Session
//!
//! A sequential echo series against one host. Samples are streamed as they
//! complete, except that timeouts are held back while a streak builds: if the
//! streak reaches `down_after`, the session stops and reports one `HostDown`
//! verdict instead of a run of individual failures.

use std::net::IpAddr;
use std::sync::Arc;

use netprobe_common::Target;
use netprobe_common::config::PingSettings;
use netprobe_common::probe::{ProbeKind, ProbeRequest};
use netprobe_common::report::{LatencyStats, PingReport, PingSample, PingVerdict};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::probe::{self, Prober};

pub const MAX_COUNT: u32 = 1000;

/// Tracks consecutive timeouts and the samples withheld while they accrue.
#[derive(Debug)]
struct Streak {
    limit: Option<u32>,
    held: Vec<PingSample>,
}

impl Streak {
    /// Takes a timeout. Returns `true` once the host should be declared down.
    fn hold(&mut self, sample: PingSample) -> bool {
        self.held.push(sample);
        self.limit.is_some_and(|limit| self.held.len() as u32 >= limit)
    }

    fn release(&mut self) -> Vec<PingSample> {
        std::mem::take(&mut self.held)
    }
}

/// Pings `target` `settings.count` times and summarises the series.
pub async fn run(
    prober: Arc<dyn Prober>,
    target: IpAddr,
    settings: PingSettings,
    samples_tx: UnboundedSender<PingSample>,
    cancel: CancellationToken,
) -> PingReport {
    let start = Instant::now();
    let count = settings.count.clamp(1, MAX_COUNT);
    let mut streak = Streak {
        limit: settings.down_after.filter(|n| *n > 0),
        held: Vec::new(),
    };
    let mut samples: Vec<PingSample> = Vec::with_capacity(count as usize);
    let mut host_down = None;
    info!(%target, count, "ping started");

    for i in 0..count {
        if i > 0 {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(settings.interval) => {}
            }
        }

        let seq = i as u16;
        let request = ProbeRequest::new(Target::host(target), ProbeKind::IcmpEcho { seq }, settings.timeout);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = probe::race(request.timeout, prober.execute(&request)) => outcome,
        };
        let sample = PingSample { seq, outcome };
        samples.push(sample.clone());

        if sample.outcome.is_timeout() && streak.limit.is_some() {
            if streak.hold(sample) {
                let after = streak.held.len() as u32;
                debug!(%target, after, "consecutive timeouts, host declared down");
                host_down = Some(after);
                break;
            }
            continue;
        }

        for held in streak.release() {
            let _ = samples_tx.send(held);
        }
        let _ = samples_tx.send(sample);
    }

    // Timeouts that never completed a streak are still real samples.
    if host_down.is_none() {
        for held in streak.release() {
            let _ = samples_tx.send(held);
        }
    }

    let sent = samples.len() as u32;
    let received = samples.iter().filter(|s| s.outcome.is_success()).count() as u32;
    let verdict = match host_down {
        Some(after) => PingVerdict::HostDown { after },
        None if sent > 0 && received == sent => PingVerdict::Alive,
        None if received == 0 => PingVerdict::Unreachable,
        None => PingVerdict::Partial,
    };

    let report = PingReport {
        target,
        latency: LatencyStats::from_samples(samples.iter().filter_map(|s| s.outcome.latency())),
        samples,
        sent,
        received,
        verdict,
        elapsed: start.elapsed(),
    };
    info!(%target, sent, received, %verdict, "ping finished");
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
    use async_trait::async_trait;
    use netprobe_common::probe::{ErrorKind, ProbeOutcome};
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));

    /// Answers sequence numbers listed in `answers`, hangs on the rest.
    struct Script {
        answers: Vec<u16>,
    }

    #[async_trait]
    impl Prober for Script {
        async fn execute(&self, request: &ProbeRequest) -> ProbeOutcome {
            let ProbeKind::IcmpEcho { seq } = request.kind else {
                return ProbeOutcome::error(ErrorKind::Unsupported, "");
            };
            if self.answers.contains(&seq) {
                return ProbeOutcome::success(Duration::from_millis(u64::from(seq) + 1));
            }
            std::future::pending().await
        }
    }

    fn settings(count: u32, down_after: Option<u32>) -> PingSettings {
        PingSettings {
            count,
            interval: Duration::from_millis(200),
            timeout: Duration::from_millis(100),
            down_after,
        }
    }

    async fn ping(answers: Vec<u16>, settings: PingSettings) -> (PingReport, Vec<PingSample>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = run(Arc::new(Script { answers }), HOST, settings, tx, CancellationToken::new()).await;
        let mut streamed = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            streamed.push(sample);
        }
        (report, streamed)
    }

    #[tokio::test(start_paused = true)]
    async fn all_answered_is_alive() {
        let (report, streamed) = ping(vec![0, 1, 2, 3], settings(4, Some(3))).await;
        assert_eq!(report.verdict, PingVerdict::Alive);
        assert_eq!((report.sent, report.received), (4, 4));
        assert_eq!(streamed.len(), 4);
        assert_eq!(report.latency.map(|l| l.max), Some(Duration::from_millis(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn three_timeouts_mean_host_down() {
        let (report, streamed) = ping(vec![0], settings(10, Some(3))).await;
        assert_eq!(report.verdict, PingVerdict::HostDown { after: 3 });
        assert_eq!(report.sent, 4);
        assert_eq!(streamed.len(), 1, "the failing run is not streamed");
        assert!(streamed[0].outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn a_reply_breaks_the_streak() {
        let (report, streamed) = ping(vec![2, 5], settings(6, Some(3))).await;
        assert_eq!(report.verdict, PingVerdict::Partial);
        assert_eq!(report.sent, 6);
        assert_eq!(report.received, 2);
        assert_eq!(streamed.len(), 6);
        let order: Vec<u16> = streamed.iter().map(|s| s.seq).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
        assert!((report.loss_percent() - 66.666).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_policy_reports_every_attempt() {
        let (report, streamed) = ping(vec![], settings(5, None)).await;
        assert_eq!(report.verdict, PingVerdict::Unreachable);
        assert_eq!(streamed.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_series() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            stopper.cancel();
        });
        let report = run(
            Arc::new(Script { answers: (0..100).collect() }),
            HOST,
            settings(100, Some(3)),
            tx,
            cancel,
        )
        .await;
        assert_eq!(report.sent, 2);
        assert_eq!(report.verdict, PingVerdict::Alive);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_count_still_sends_one() {
        let (report, _) = ping(vec![0], settings(0, Some(3))).await;
        assert_eq!(report.sent, 1);
    }
}
