//! # Engine
//!
//! The public face of the crate. Every operation validates its input before
//! touching the network, then runs as a background task behind a handle that
//! streams progress and resolves to a final report.
//!
//! ```no_run
//! # async fn demo() -> Result<(), netprobe_core::EngineError> {
//! use netprobe_common::config::{DnsSettings, ScanSettings};
//! use netprobe_core::{Engine, ScanKind, ScanSpec};
//!
//! let engine = Engine::new(&DnsSettings::default());
//! let spec = ScanSpec::new("192.168.1.0/24", Some("22,80,443"));
//! let handle = engine.start_scan(&spec, ScanKind::TcpConnect, &ScanSettings::default()).await?;
//! let report = handle.wait().await?;
//! println!("{} open", report.successes().count());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use netprobe_common::config::{DnsSettings, PingSettings, ScanSettings, TraceSettings};
use netprobe_common::network::expander::{HostSet, TargetSet};
use netprobe_common::network::mac::parse_mac;
use netprobe_common::network::ports::PortList;
use netprobe_common::network::target::{HostSpec, single_addr};
use netprobe_common::probe::{DnsQuestion, ProbeKind, ProbeRequest, RecordType};
use netprobe_common::report::{ConnectivityReport, PingReport, PingSample, ScanReport, TraceHop, TraceReport};
use netprobe_common::{SpecError, Target};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::gate::AdmissionGate;
use crate::network::dns;
use crate::probe::{NetworkProber, Prober};
use crate::scheduler::{self, ScanControl, ScanEvent, ScanJob};
use crate::{connectivity, ping, traceroute, wol};

/// What a scan sends to every expanded target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Full handshake on every host and port. Requires a port list.
    TcpConnect,
    /// Like `TcpConnect`, also reading a banner from open ports.
    TcpBanner,
    /// One echo request per host.
    IcmpEcho,
    /// TCP on well-known ports with an echo fallback, one probe per host.
    HostDiscovery,
    /// A PTR query per host. Requests keep the host as their target and
    /// carry no port, so the prober sends them to its own resolver.
    ReverseDns,
}

/// Raw host and port specifications as the user typed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSpec {
    pub hosts: String,
    pub ports: Option<String>,
}

impl ScanSpec {
    pub fn new(hosts: impl Into<String>, ports: Option<&str>) -> Self {
        Self {
            hosts: hosts.into(),
            ports: ports.map(str::to_string),
        }
    }
}

/// Expands `spec` into ordered requests. No I/O beyond LAN interface discovery.
///
/// Hostnames in `spec` must already be present in `resolved`.
pub fn plan_scan(
    spec: &ScanSpec,
    kind: ScanKind,
    settings: &ScanSettings,
    resolved: &HashMap<String, IpAddr>,
) -> Result<Vec<ProbeRequest>, SpecError> {
    let host_spec: HostSpec = spec.hosts.parse()?;
    let ports = match &spec.ports {
        Some(ports) => ports.parse::<PortList>()?,
        None => PortList::default(),
    };

    let ports = match kind {
        ScanKind::TcpConnect | ScanKind::TcpBanner if ports.is_empty() => {
            return Err(SpecError::invalid(&spec.hosts, "a TCP scan needs a port list"));
        }
        ScanKind::TcpConnect | ScanKind::TcpBanner => ports,
        // Host-level probes ignore ports.
        _ => PortList::default(),
    };

    let hosts = HostSet::from_spec(&host_spec, resolved, settings.include_bounds)?;
    let targets = TargetSet::new(hosts, ports).limited(settings.max_targets, &spec.hosts)?;

    let requests = targets
        .iter()
        .map(|target| {
            let (target, probe) = match kind {
                ScanKind::TcpConnect => (target, ProbeKind::TcpConnect),
                ScanKind::TcpBanner => (target, ProbeKind::TcpBanner),
                ScanKind::IcmpEcho => (target, ProbeKind::IcmpEcho { seq: 0 }),
                ScanKind::HostDiscovery => (target, ProbeKind::HostDiscovery),
                ScanKind::ReverseDns => (
                    Target::new(target.addr, None),
                    ProbeKind::DnsQuery(DnsQuestion::reverse(target.addr)),
                ),
            };
            let timeout = match kind {
                ScanKind::ReverseDns => settings.dns.timeout,
                _ => settings.timeout,
            };
            ProbeRequest::new(target, probe, timeout).with_retries(settings.retries)
        })
        .collect();
    Ok(requests)
}

/// A running scan.
#[derive(Debug)]
pub struct ScanHandle {
    total: usize,
    control: ScanControl,
    gate: Arc<AdmissionGate>,
    events: UnboundedReceiver<ScanEvent>,
    task: JoinHandle<ScanReport>,
}

impl ScanHandle {
    /// Requests submitted, duplicates included.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Stops dispatch. With `force`, in-flight probes are aborted as well.
    pub fn cancel(&self, force: bool) {
        self.control.cancel(force);
    }

    /// A detached copy of the cancellation switches, for input listeners.
    pub fn control(&self) -> ScanControl {
        self.control.clone()
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Next progress event. `None` once the scan has halted and the stream is drained.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    pub async fn wait(self) -> Result<ScanReport, EngineError> {
        self.task.await.map_err(|e| EngineError::Join(e.to_string()))
    }
}

/// Same as [`ScanHandle::cancel`].
pub fn cancel_scan(handle: &ScanHandle, force: bool) {
    handle.cancel(force);
}

/// A running traceroute.
#[derive(Debug)]
pub struct TraceHandle {
    destination: IpAddr,
    cancel: CancellationToken,
    hops: UnboundedReceiver<TraceHop>,
    task: JoinHandle<TraceReport>,
}

impl TraceHandle {
    pub fn destination(&self) -> IpAddr {
        self.destination
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn next_hop(&mut self) -> Option<TraceHop> {
        self.hops.recv().await
    }

    pub async fn wait(self) -> Result<TraceReport, EngineError> {
        self.task.await.map_err(|e| EngineError::Join(e.to_string()))
    }
}

/// A running ping session.
#[derive(Debug)]
pub struct PingHandle {
    target: IpAddr,
    cancel: CancellationToken,
    samples: UnboundedReceiver<PingSample>,
    task: JoinHandle<PingReport>,
}

impl PingHandle {
    pub fn target(&self) -> IpAddr {
        self.target
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn next_sample(&mut self) -> Option<PingSample> {
        self.samples.recv().await
    }

    pub async fn wait(self) -> Result<PingReport, EngineError> {
        self.task.await.map_err(|e| EngineError::Join(e.to_string()))
    }
}

/// Entry point for every probing operation.
#[derive(Clone)]
pub struct Engine {
    prober: Arc<dyn Prober>,
    resolver: SocketAddr,
}

impl Engine {
    /// An engine probing the real network.
    pub fn new(dns: &DnsSettings) -> Self {
        let prober = NetworkProber::new(dns);
        let resolver = prober.resolver();
        debug!(%resolver, "engine ready");
        Self {
            prober: Arc::new(prober),
            resolver,
        }
    }

    /// An engine driven by `prober`. DNS requests are addressed to `resolver`.
    pub fn with_prober(prober: Arc<dyn Prober>, resolver: SocketAddr) -> Self {
        Self { prober, resolver }
    }

    pub fn resolver(&self) -> SocketAddr {
        self.resolver
    }

    /// Validates and expands `spec`, then starts the scan in the background.
    ///
    /// Specification errors and unresolvable hostnames are returned here,
    /// before any probe is sent.
    pub async fn start_scan(
        &self,
        spec: &ScanSpec,
        kind: ScanKind,
        settings: &ScanSettings,
    ) -> Result<ScanHandle, EngineError> {
        let host_spec: HostSpec = spec.hosts.parse()?;
        let names = host_spec.hostnames();
        let resolved = if names.is_empty() {
            HashMap::new()
        } else {
            dns::resolve_names(&names).await?
        };

        let requests = plan_scan(spec, kind, settings, &resolved)?;
        info!(spec = %spec.hosts, ?kind, targets = requests.len(), "scan planned");
        Ok(self.start_job(ScanJob::new(requests, settings)))
    }

    /// Starts an already planned job.
    pub fn start_job(&self, job: ScanJob) -> ScanHandle {
        let total = job.requests.len();
        let control = ScanControl::new();
        let gate = AdmissionGate::new(job.concurrency);
        let (tx, events) = mpsc::unbounded_channel();

        let task = tokio::spawn(scheduler::run(
            job,
            Arc::clone(&self.prober),
            Arc::clone(&gate),
            control.clone(),
            tx,
        ));

        ScanHandle {
            total,
            control,
            gate,
            events,
            task,
        }
    }

    /// Resolves a single host given as an address or a hostname.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, EngineError> {
        let spec: HostSpec = host.parse()?;
        if let Some(addr) = single_addr(&spec) {
            return Ok(addr);
        }
        let HostSpec::Name { name } = &spec else {
            return Err(SpecError::invalid(host, "expected a single host").into());
        };
        let mut resolved = dns::resolve_names(&[name.as_str()]).await?;
        resolved
            .remove(name)
            .ok_or_else(|| SpecError::Unresolvable { name: name.clone() }.into())
    }

    pub async fn start_traceroute(
        &self,
        destination: &str,
        settings: TraceSettings,
    ) -> Result<TraceHandle, EngineError> {
        let destination = self.resolve(destination).await?;
        if destination.is_ipv6() {
            return Err(EngineError::Unsupported("IPv6 traceroute".to_string()));
        }

        let cancel = CancellationToken::new();
        let (tx, hops) = mpsc::unbounded_channel();
        let task = tokio::spawn(traceroute::run(
            Arc::clone(&self.prober),
            destination,
            settings,
            tx,
            cancel.clone(),
        ));

        Ok(TraceHandle {
            destination,
            cancel,
            hops,
            task,
        })
    }

    pub async fn start_ping(&self, target: &str, settings: PingSettings) -> Result<PingHandle, EngineError> {
        let target = self.resolve(target).await?;
        let cancel = CancellationToken::new();
        let (tx, samples) = mpsc::unbounded_channel();
        let task = tokio::spawn(ping::run(
            Arc::clone(&self.prober),
            target,
            settings,
            tx,
            cancel.clone(),
        ));

        Ok(PingHandle {
            target,
            cancel,
            samples,
            task,
        })
    }

    /// Queries the resolver for `query`. An IP address is looked up in reverse.
    ///
    /// Each record type becomes one request of a small scan job, so the
    /// answers come back in the order the types were given.
    pub async fn lookup(
        &self,
        query: &str,
        records: &[RecordType],
        timeout: Duration,
    ) -> Result<ScanReport, EngineError> {
        let query = query.trim();
        let questions: Vec<DnsQuestion> = match query.parse::<IpAddr>() {
            Ok(addr) => vec![DnsQuestion::reverse(addr)],
            Err(_) if query.is_empty() => {
                return Err(SpecError::invalid(query, "nothing to look up").into());
            }
            Err(_) if records.is_empty() => vec![DnsQuestion::new(query, RecordType::A)],
            Err(_) => records.iter().map(|r| DnsQuestion::new(query, *r)).collect(),
        };

        let requests = questions
            .into_iter()
            .map(|q| ProbeRequest::new(Target::from(self.resolver), ProbeKind::DnsQuery(q), timeout))
            .collect();
        let settings = ScanSettings {
            timeout,
            systemic_threshold: 0,
            ..ScanSettings::default()
        };
        self.start_job(ScanJob::new(requests, &settings)).wait().await
    }

    /// Checks the well-known endpoints, the default gateway and `host` when given.
    pub async fn check_connectivity(&self, settings: &ScanSettings, host: Option<&str>) -> ConnectivityReport {
        connectivity::run(Arc::clone(&self.prober), self.resolver, settings, host).await
    }

    /// Parses `mac` and broadcasts one magic packet to `broadcast`.
    pub async fn send_wake_on_lan(&self, mac: &str, broadcast: SocketAddr) -> Result<(), EngineError> {
        let mac = parse_mac(mac)?;
        wol::send_magic_packet(mac, broadcast).await?;
        info!(%mac, %broadcast, "wake-on-lan packet sent");
        Ok(())
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
