//! # Connectivity Check
//!
//! One scan job against a fixed set of public endpoints: TCP handshakes to
//! well-known resolvers and web front ends, echo requests to public
//! resolvers and the default gateway, `A` lookups through the configured
//! resolver, and optionally an echo to a host of the user's choosing. The
//! verdict depends only on how many checks passed.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use netprobe_common::Target;
use netprobe_common::config::ScanSettings;
use netprobe_common::network::interface;
use netprobe_common::probe::{DnsQuestion, ErrorKind, ProbeKind, ProbeOutcome, ProbeRequest, RecordType};
use netprobe_common::report::{ConnectivityCheck, ConnectivityReport, ConnectivityVerdict};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::gate::AdmissionGate;
use crate::network::dns;
use crate::probe::Prober;
use crate::scheduler::{self, ScanControl, ScanJob};

/// Endpoints that should accept a TCP handshake from any connected host.
pub const TCP_ENDPOINTS: &[(&str, u16)] = &[
    ("8.8.8.8", 53),
    ("8.8.4.4", 53),
    ("1.1.1.1", 53),
    ("www.google.com", 80),
    ("www.cloudflare.com", 443),
];

/// Hosts that answer echo requests.
pub const ECHO_HOSTS: &[&str] = &["8.8.8.8", "1.1.1.1"];

/// Names looked up through the resolver.
pub const DNS_NAMES: &[&str] = &["www.google.com", "www.cloudflare.com", "github.com"];

/// A check that is either already decided or waiting on a request.
#[derive(Debug)]
enum Planned {
    Decided(ProbeOutcome),
    Request(usize),
}

/// Labels, decisions and the requests the scan job has to run.
#[derive(Debug, Default)]
struct Plan {
    checks: Vec<(String, Planned)>,
    requests: Vec<ProbeRequest>,
}

impl Plan {
    /// Identical requests are sent once and share their outcome.
    fn push_request(&mut self, label: String, request: ProbeRequest) {
        let index = match self.requests.iter().position(|planned| *planned == request) {
            Some(index) => index,
            None => {
                self.requests.push(request);
                self.requests.len() - 1
            }
        };
        self.checks.push((label, Planned::Request(index)));
    }

    fn push_echo(&mut self, label: String, addr: IpAddr, timeout: Duration) {
        let request = ProbeRequest::new(Target::new(addr, None), ProbeKind::IcmpEcho { seq: 0 }, timeout);
        self.push_request(label, request);
    }
}

/// Addresses gathered before the checks run.
#[derive(Debug, Default)]
struct Endpoints {
    /// Named TCP endpoints that resolved.
    resolved: HashMap<&'static str, IpAddr>,
    gateway: Option<IpAddr>,
    /// The extra host asked for, with its address when it resolved.
    host: Option<(String, Option<IpAddr>)>,
}

fn plan(endpoints: &Endpoints, resolver: SocketAddr, settings: &ScanSettings) -> Plan {
    let mut plan = Plan::default();

    for &(host, port) in TCP_ENDPOINTS {
        let label = format!("{host}:{port}");
        let addr = host.parse::<IpAddr>().ok().or_else(|| endpoints.resolved.get(host).copied());
        match addr {
            Some(addr) => {
                let target = Target::new(addr, Some(port));
                plan.push_request(label, ProbeRequest::new(target, ProbeKind::TcpConnect, settings.timeout));
            }
            None => {
                let failed = ProbeOutcome::error(ErrorKind::Resolve, format!("could not resolve {host}"));
                plan.checks.push((label, Planned::Decided(failed)));
            }
        }
    }

    for host in ECHO_HOSTS {
        if let Ok(addr) = host.parse::<IpAddr>() {
            plan.push_echo(format!("echo {host}"), addr, settings.timeout);
        }
    }

    if let Some(gateway) = endpoints.gateway {
        plan.push_echo(format!("gateway {gateway}"), gateway, settings.timeout);
    }

    for name in DNS_NAMES {
        let question = DnsQuestion::new(*name, RecordType::A);
        let request = ProbeRequest::new(
            Target::from(resolver),
            ProbeKind::DnsQuery(question),
            settings.dns.timeout,
        );
        plan.push_request(format!("A {name}"), request);
    }

    match &endpoints.host {
        Some((name, Some(addr))) => plan.push_echo(format!("host {name}"), *addr, settings.timeout),
        Some((name, None)) => {
            let failed = ProbeOutcome::error(ErrorKind::Resolve, format!("could not resolve {name}"));
            plan.checks.push((format!("host {name}"), Planned::Decided(failed)));
        }
        None => {}
    }

    plan
}

/// Online when every check passed, offline when none did.
pub fn verdict(checks: &[ConnectivityCheck]) -> ConnectivityVerdict {
    let passed = checks.iter().filter(|c| c.outcome.is_success()).count();
    match passed {
        0 => ConnectivityVerdict::Offline,
        n if n == checks.len() => ConnectivityVerdict::Online,
        _ => ConnectivityVerdict::Degraded,
    }
}

/// One system lookup of `name`, bounded by the DNS timeout. Literals skip the lookup.
async fn lookup(name: &str, settings: &ScanSettings) -> Option<IpAddr> {
    if let Ok(addr) = name.parse::<IpAddr>() {
        return Some(addr);
    }
    match tokio::time::timeout(settings.dns.timeout, dns::resolve_names(&[name])).await {
        Ok(Ok(mut addrs)) => addrs.remove(name),
        Ok(Err(e)) => {
            debug!(error = %e, "endpoint did not resolve");
            None
        }
        Err(_) => {
            debug!(name, "endpoint lookup timed out");
            None
        }
    }
}

/// Resolves the named endpoints and the extra host, and reads the default gateway.
async fn gather_endpoints(host: Option<&str>, settings: &ScanSettings) -> Endpoints {
    let mut endpoints = Endpoints::default();
    for &(name, _) in TCP_ENDPOINTS {
        if name.parse::<IpAddr>().is_ok() {
            continue;
        }
        if let Some(addr) = lookup(name, settings).await {
            endpoints.resolved.insert(name, addr);
        }
    }

    endpoints.gateway = interface::default_gateway().map(IpAddr::V4);
    if endpoints.gateway.is_none() {
        warn!("default gateway unknown, skipping its check");
    }

    if let Some(name) = host.map(str::trim).filter(|name| !name.is_empty()) {
        endpoints.host = Some((name.to_string(), lookup(name, settings).await));
    }
    endpoints
}

/// Runs every check and builds the report. `host` adds an echo check for that host.
pub async fn run(
    prober: Arc<dyn Prober>,
    resolver: SocketAddr,
    settings: &ScanSettings,
    host: Option<&str>,
) -> ConnectivityReport {
    let start = Instant::now();
    let endpoints = gather_endpoints(host, settings).await;
    let mut report = check(prober, &endpoints, resolver, settings).await;
    report.elapsed = start.elapsed();
    info!(verdict = %report.verdict, passed = report.passed(), total = report.checks.len(), "connectivity checked");
    report
}

/// Runs the checks against already gathered endpoints.
async fn check(
    prober: Arc<dyn Prober>,
    endpoints: &Endpoints,
    resolver: SocketAddr,
    settings: &ScanSettings,
) -> ConnectivityReport {
    let start = Instant::now();
    let Plan { checks, requests } = plan(endpoints, resolver, settings);

    let job = ScanJob {
        systemic_threshold: 0,
        halt_on_systemic: false,
        ..ScanJob::new(requests, settings)
    };
    let gate = AdmissionGate::new(job.concurrency);
    let (events, _) = mpsc::unbounded_channel();
    let scan = scheduler::run(job, prober, gate, ScanControl::new(), events).await;

    let outcomes: HashMap<usize, ProbeOutcome> = scan
        .entries
        .into_iter()
        .map(|entry| (entry.index, entry.outcome))
        .collect();

    let checks: Vec<ConnectivityCheck> = checks
        .into_iter()
        .map(|(label, planned)| {
            let outcome = match planned {
                Planned::Decided(outcome) => outcome,
                Planned::Request(index) => outcomes.get(&index).cloned().unwrap_or(ProbeOutcome::Timeout),
            };
            ConnectivityCheck { label, outcome }
        })
        .collect();

    ConnectivityReport {
        verdict: verdict(&checks),
        checks,
        elapsed: start.elapsed(),
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
