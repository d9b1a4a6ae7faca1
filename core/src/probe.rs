//! # Probes
//!
//! [`Prober`] is the single capability the scheduler, the traceroute and the
//! ping session depend on. [`NetworkProber`] is the real implementation;
//! tests substitute their own.
//!
//! Every attempt is raced against its timeout in [`race`], so a prober that
//! forgets to bound its own I/O still cannot stall a scan.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::config::DnsSettings;
use netprobe_common::network::ports::DISCOVERY_PORTS;
use netprobe_common::probe::{ErrorKind, Metadata, ProbeKind, ProbeOutcome, ProbeRequest};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::network::{dns, echo, tcp, trace::UdpTracer};

/// Port assumed when a TCP request carries none.
const DEFAULT_TCP_PORT: u16 = 80;

#[async_trait]
pub trait Prober: Send + Sync {
    /// Runs one attempt of `request`. Never fails; every failure is an outcome.
    async fn execute(&self, request: &ProbeRequest) -> ProbeOutcome;
}

#[async_trait]
impl<P: Prober + ?Sized> Prober for Arc<P> {
    async fn execute(&self, request: &ProbeRequest) -> ProbeOutcome {
        (**self).execute(request).await
    }
}

/// Runs `probe` until it finishes or `limit` passes, whichever comes first.
///
/// The losing future is dropped, releasing whatever socket it held.
pub async fn race<F>(limit: Duration, probe: F) -> ProbeOutcome
where
    F: Future<Output = ProbeOutcome>,
{
    tokio::time::timeout(limit, probe)
        .await
        .unwrap_or(ProbeOutcome::Timeout)
}

/// Attempts `request` until it yields something other than a timeout or the
/// retry budget runs out. Returns the last outcome and the attempts made.
pub async fn attempt<P>(prober: &P, request: &ProbeRequest) -> (ProbeOutcome, u32)
where
    P: Prober + ?Sized,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let outcome = race(request.timeout, prober.execute(request)).await;
        if outcome.is_timeout() && attempts <= request.retries {
            trace!(probe = %request.target, attempts, "retrying after timeout");
            continue;
        }
        return (outcome, attempts);
    }
}

/// Probes the real network.
pub struct NetworkProber {
    resolver: SocketAddr,
    tracer: OnceCell<UdpTracer>,
}

impl NetworkProber {
    pub fn new(dns: &DnsSettings) -> Self {
        Self {
            resolver: dns.server.unwrap_or_else(dns::system_resolver),
            tracer: OnceCell::new(),
        }
    }

    /// Resolver used for DNS requests whose target carries no port.
    pub fn resolver(&self) -> SocketAddr {
        self.resolver
    }

    async fn trace_hop(&self, addr: IpAddr, ttl: u8, limit: Duration) -> ProbeOutcome {
        let IpAddr::V4(destination) = addr else {
            return ProbeOutcome::error(ErrorKind::Unsupported, "traceroute supports IPv4 only");
        };

        let tracer = match self.tracer.get_or_try_init(|| async { UdpTracer::new() }).await {
            Ok(tracer) => tracer,
            Err(e) => {
                let kind = if is_root::is_root() {
                    ErrorKind::Io
                } else {
                    ErrorKind::PermissionDenied
                };
                return ProbeOutcome::error(kind, format!("{e:#}"));
            }
        };

        tracer.probe(destination, ttl, limit).await
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn execute(&self, request: &ProbeRequest) -> ProbeOutcome {
        let target = request.target;
        match &request.kind {
            ProbeKind::TcpConnect => {
                tcp::handshake_probe(target.socket_addr(DEFAULT_TCP_PORT), request.timeout).await
            }
            ProbeKind::TcpBanner => {
                tcp::banner_probe(target.socket_addr(DEFAULT_TCP_PORT), request.timeout).await
            }
            ProbeKind::IcmpEcho { seq } => echo::echo_probe(target.addr, *seq, request.timeout).await,
            ProbeKind::DnsQuery(question) => {
                let server = match target.port {
                    Some(port) => SocketAddr::new(target.addr, port),
                    None => self.resolver,
                };
                dns::query_probe(server, question, request.timeout).await
            }
            ProbeKind::TraceHop { ttl } => self.trace_hop(target.addr, *ttl, request.timeout).await,
            ProbeKind::HostDiscovery => discover_host(target.addr, request.timeout).await,
        }
    }
}

/// Handshakes on the discovery ports in parallel, then falls back to echo.
///
/// Half of the budget goes to TCP and half to echo. A refused connection
/// proves the host is up as much as an accepted one does.
async fn discover_host(addr: IpAddr, limit: Duration) -> ProbeOutcome {
    let tcp_budget = limit / 2;
    let mut handshakes: JoinSet<(u16, ProbeOutcome)> = JoinSet::new();
    for &port in DISCOVERY_PORTS {
        handshakes.spawn(async move {
            let outcome = tcp::handshake_probe(SocketAddr::new(addr, port), tcp_budget).await;
            (port, outcome)
        });
    }

    while let Some(joined) = handshakes.join_next().await {
        let Ok((port, outcome)) = joined else { continue };
        let latency = match outcome {
            ProbeOutcome::Success { latency, .. } => latency,
            ProbeOutcome::RefusedOrClosed => tcp_budget,
            _ => continue,
        };
        debug!(%addr, port, "host answered on tcp");
        return ProbeOutcome::Success {
            latency,
            meta: Metadata::Alive { port: Some(port) },
        };
    }

    match echo::echo_probe(addr, 0, limit - tcp_budget).await {
        ProbeOutcome::Success { latency, .. } => ProbeOutcome::Success {
            latency,
            meta: Metadata::Alive { port: None },
        },
        other => other,
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
    use netprobe_common::Target;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Times out `timeouts` times, then succeeds.
    struct Flaky {
        timeouts: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Prober for Flaky {
        async fn execute(&self, _request: &ProbeRequest) -> ProbeOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.timeouts {
                std::future::pending::<()>().await;
            }
            ProbeOutcome::success(Duration::from_millis(1))
        }
    }

    fn request(retries: u32) -> ProbeRequest {
        let target = Target::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), Some(22));
        ProbeRequest::new(target, ProbeKind::TcpConnect, Duration::from_millis(50))
            .with_retries(retries)
    }

    #[tokio::test(start_paused = true)]
    async fn race_turns_hangs_into_timeouts() {
        let outcome = race(Duration::from_secs(1), std::future::pending::<ProbeOutcome>()).await;
        assert_eq!(outcome, ProbeOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_only_after_timeouts() {
        let prober = Flaky { timeouts: 2, calls: AtomicU32::new(0) };
        let (outcome, attempts) = attempt(&prober, &request(2)).await;
        assert!(outcome.is_success());
        assert_eq!(attempts, 3);

        let prober = Flaky { timeouts: 2, calls: AtomicU32::new(0) };
        let (outcome, attempts) = attempt(&prober, &request(1)).await;
        assert_eq!(outcome, ProbeOutcome::Timeout);
        assert_eq!(attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn definite_outcomes_are_not_retried() {
        struct Refusing;

        #[async_trait]
        impl Prober for Refusing {
            async fn execute(&self, _request: &ProbeRequest) -> ProbeOutcome {
                ProbeOutcome::RefusedOrClosed
            }
        }

        let (outcome, attempts) = attempt(&Refusing, &request(5)).await;
        assert_eq!(outcome, ProbeOutcome::RefusedOrClosed);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn tcp_requests_reach_the_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let prober = NetworkProber::new(&DnsSettings::default());

        let request = ProbeRequest::new(Target::from(addr), ProbeKind::TcpConnect, Duration::from_secs(2));
        assert!(prober.execute(&request).await.is_success());
    }

    #[tokio::test]
    async fn trace_rejects_ipv6() {
        let prober = NetworkProber::new(&DnsSettings::default());
        let request = ProbeRequest::new(
            Target::host("::1".parse().unwrap()),
            ProbeKind::TraceHop { ttl: 1 },
            Duration::from_millis(100),
        );
        assert!(matches!(
            prober.execute(&request).await,
            ProbeOutcome::Error { kind: ErrorKind::Unsupported, .. }
        ));
    }
}
