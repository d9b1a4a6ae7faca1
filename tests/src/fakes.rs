use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::Target;
use netprobe_common::probe::{Metadata, ProbeKind, ProbeOutcome, ProbeRequest};
use netprobe_core::Prober;

/// Address DNS requests are sent to in these tests. Nothing listens there.
pub const RESOLVER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 53)), 53);

pub fn target(addr: &str, port: u16) -> Target {
    Target::new(addr.parse().expect("address literal"), Some(port))
}

/// Answers from a fixed table after a fixed delay. Unknown targets get the fallback.
///
/// Tracks how many calls were made and how many ran at once.
pub struct Scripted {
    delay: Duration,
    fallback: ProbeOutcome,
    answers: HashMap<Target, ProbeOutcome>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Scripted {
    pub fn new(delay: Duration, fallback: ProbeOutcome) -> Self {
        Self {
            delay,
            fallback,
            answers: HashMap::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn answer(mut self, target: Target, outcome: ProbeOutcome) -> Self {
        self.answers.insert(target, outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count even when the probe future is dropped.
struct Flight<'a>(&'a AtomicUsize);

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Prober for Scripted {
    async fn execute(&self, request: &ProbeRequest) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _flight = Flight(&self.in_flight);

        tokio::time::sleep(self.delay).await;
        self.answers
            .get(&request.target)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// A path of `length` routers; the last one is the destination itself.
///
/// Router `n` answers from `10.0.n.1`. TTLs at or beyond `length` reach the
/// destination.
pub struct Route {
    pub length: u8,
    pub rtt: Duration,
}

#[async_trait]
impl Prober for Route {
    async fn execute(&self, request: &ProbeRequest) -> ProbeOutcome {
        let ProbeKind::TraceHop { ttl } = request.kind else {
            return ProbeOutcome::RefusedOrClosed;
        };
        tokio::time::sleep(self.rtt).await;

        let (responder, reached) = if ttl >= self.length {
            (request.target.addr, true)
        } else {
            (IpAddr::V4(Ipv4Addr::new(10, 0, ttl, 1)), false)
        };
        ProbeOutcome::Success {
            latency: self.rtt,
            meta: Metadata::Hop { responder, reached },
        }
    }
}
