//! Probe requests and their typed outcomes.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SpecError;
use crate::network::target::Target;

/// DNS record types a query probe can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Txt,
    Ptr,
    Soa,
}

impl RecordType {
    pub const ALL: [RecordType; 6] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Mx,
        RecordType::Ns,
        RecordType::Txt,
        RecordType::Soa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Txt => "TXT",
            RecordType::Ptr => "PTR",
            RecordType::Soa => "SOA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "MX" => Ok(RecordType::Mx),
            "NS" => Ok(RecordType::Ns),
            "TXT" => Ok(RecordType::Txt),
            "PTR" => Ok(RecordType::Ptr),
            "SOA" => Ok(RecordType::Soa),
            _ => Err(SpecError::invalid(s, "unknown record type")),
        }
    }
}

/// A DNS question: name plus record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DnsQuestion {
    pub name: String,
    pub record: RecordType,
}

impl DnsQuestion {
    pub fn new(name: impl Into<String>, record: RecordType) -> Self {
        Self {
            name: name.into(),
            record,
        }
    }

    /// Reverse lookup question for `addr`.
    pub fn reverse(addr: IpAddr) -> Self {
        Self::new(reverse_pointer_name(&addr), RecordType::Ptr)
    }
}

impl fmt::Display for DnsQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.record, self.name)
    }
}

/// Builds the `in-addr.arpa` / `ip6.arpa` name for a reverse lookup.
pub fn reverse_pointer_name(addr: &IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{d}.{c}.{b}.{a}.in-addr.arpa")
        }
        IpAddr::V6(v6) => {
            let mut labels: Vec<String> = Vec::with_capacity(34);
            for byte in v6.octets().iter().rev() {
                labels.push(format!("{:x}", byte & 0x0f));
                labels.push(format!("{:x}", byte >> 4));
            }
            labels.push("ip6.arpa".to_string());
            labels.join(".")
        }
    }
}

/// The closed set of probe kinds the engine knows how to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProbeKind {
    /// Full TCP handshake against `target`.
    TcpConnect,
    /// Handshake, then read the service's first line.
    TcpBanner,
    /// One ICMP echo request carrying `seq`.
    IcmpEcho { seq: u16 },
    /// A DNS question. A `target` with a port names the resolver to ask;
    /// without one the prober's own resolver is used and `target` is the
    /// host the question is about.
    DnsQuery(DnsQuestion),
    /// One UDP datagram towards `target` with the given TTL.
    TraceHop { ttl: u8 },
    /// Liveness check: TCP handshakes on well-known ports, falling back to echo.
    HostDiscovery,
}

impl ProbeKind {
    /// Stable label used to group outcomes in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            ProbeKind::TcpConnect => "tcp-connect",
            ProbeKind::TcpBanner => "tcp-banner",
            ProbeKind::IcmpEcho { .. } => "icmp-echo",
            ProbeKind::DnsQuery(_) => "dns-query",
            ProbeKind::TraceHop { .. } => "udp-trace-hop",
            ProbeKind::HostDiscovery => "host-discovery",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::DnsQuery(question) => write!(f, "dns-query ({question})"),
            ProbeKind::TraceHop { ttl } => write!(f, "udp-trace-hop (ttl {ttl})"),
            other => f.write_str(other.label()),
        }
    }
}

/// One unit of work handed to a prober.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub target: Target,
    pub kind: ProbeKind,
    /// Bound on a single attempt.
    pub timeout: Duration,
    /// Extra attempts allowed after a timeout.
    pub retries: u32,
}

impl ProbeRequest {
    pub fn new(target: Target, kind: ProbeKind, timeout: Duration) -> Self {
        Self {
            target,
            kind,
            timeout,
            retries: 0,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Why the network said a target cannot be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnreachableReason {
    HostUnreachable,
    NetworkUnreachable,
    /// ICMP destination unreachable with a code we do not name.
    Icmp(u8),
    Other(String),
}

impl fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachableReason::HostUnreachable => f.write_str("host unreachable"),
            UnreachableReason::NetworkUnreachable => f.write_str("network unreachable"),
            UnreachableReason::Icmp(code) => write!(f, "icmp unreachable (code {code})"),
            UnreachableReason::Other(reason) => f.write_str(reason),
        }
    }
}

/// Failure families that are neither timeouts nor definitive negatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    PermissionDenied,
    NxDomain,
    ServFail,
    Refused,
    Resolve,
    AddrInUse,
    Unsupported,
    Protocol,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::NxDomain => "NXDOMAIN",
            ErrorKind::ServFail => "SERVFAIL",
            ErrorKind::Refused => "REFUSED",
            ErrorKind::Resolve => "resolution failed",
            ErrorKind::AddrInUse => "address in use",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(s)
    }
}

/// A single answer record, rendered to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: String,
    pub record: RecordType,
    pub ttl: u32,
    pub value: String,
}

/// Extra data carried by a successful probe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Metadata {
    #[default]
    None,
    Records(Vec<DnsRecord>),
    /// A traceroute hop answered. `reached` is set when the answer came from the destination.
    Hop { responder: IpAddr, reached: bool },
    /// Echo reply. `ttl` is absent when the socket does not expose the IP header.
    Echo { seq: u16, ttl: Option<u8> },
    /// Host discovery succeeded through a TCP port (open or refusing) or through echo.
    Alive { port: Option<u16> },
    /// First line a service sent after the handshake.
    Banner(String),
}

/// Outcome class, used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeClass {
    Success,
    RefusedOrClosed,
    Timeout,
    Unreachable,
    Error,
}

/// The result of exactly one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { latency: Duration, meta: Metadata },
    Timeout,
    RefusedOrClosed,
    Unreachable(UnreachableReason),
    Error { kind: ErrorKind, detail: String },
}

impl ProbeOutcome {
    pub fn success(latency: Duration) -> Self {
        Self::Success {
            latency,
            meta: Metadata::None,
        }
    }

    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Error {
            kind,
            detail: detail.into(),
        }
    }

    pub fn class(&self) -> OutcomeClass {
        match self {
            ProbeOutcome::Success { .. } => OutcomeClass::Success,
            ProbeOutcome::Timeout => OutcomeClass::Timeout,
            ProbeOutcome::RefusedOrClosed => OutcomeClass::RefusedOrClosed,
            ProbeOutcome::Unreachable(_) => OutcomeClass::Unreachable,
            ProbeOutcome::Error { .. } => OutcomeClass::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeOutcome::Timeout)
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Success { latency, .. } => Some(*latency),
            _ => None,
        }
    }

    pub fn meta(&self) -> Option<&Metadata> {
        match self {
            ProbeOutcome::Success { meta, .. } => Some(meta),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success { latency, .. } => {
                write!(f, "success ({:.1} ms)", latency.as_secs_f64() * 1000.0)
            }
            ProbeOutcome::Timeout => f.write_str("timeout"),
            ProbeOutcome::RefusedOrClosed => f.write_str("refused/closed"),
            ProbeOutcome::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            ProbeOutcome::Error { kind, detail } if detail.is_empty() => write!(f, "error: {kind}"),
            ProbeOutcome::Error { kind, detail } => write!(f, "error: {kind} ({detail})"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn reverse_name_v4() {
        let addr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(reverse_pointer_name(&addr), "10.1.168.192.in-addr.arpa");
    }

    #[test]
    fn reverse_name_v6() {
        let addr = IpAddr::V6("2001:db8::1".parse::<Ipv6Addr>().unwrap());
        let name = reverse_pointer_name(&addr);
        assert!(name.starts_with("1.0.0.0.0.0.0.0"));
        assert!(name.ends_with("8.b.d.0.1.0.0.2.ip6.arpa"));
    }

    #[test]
    fn record_type_parsing_is_case_insensitive() {
        assert_eq!("aaaa".parse::<RecordType>(), Ok(RecordType::Aaaa));
        assert_eq!("Mx".parse::<RecordType>(), Ok(RecordType::Mx));
        assert!("AXFR".parse::<RecordType>().is_err());
    }

    #[test]
    fn kinds_group_by_family() {
        assert_eq!(ProbeKind::IcmpEcho { seq: 1 }.label(), ProbeKind::IcmpEcho { seq: 9 }.label());
        assert_eq!(ProbeKind::TraceHop { ttl: 4 }.label(), "udp-trace-hop");
    }

    #[test]
    fn outcome_classes() {
        assert_eq!(ProbeOutcome::Timeout.class(), OutcomeClass::Timeout);
        assert_eq!(
            ProbeOutcome::error(ErrorKind::NxDomain, "").class(),
            OutcomeClass::Error
        );
        assert!(ProbeOutcome::success(Duration::from_millis(3)).is_success());
        assert_eq!(
            ProbeOutcome::success(Duration::from_millis(3)).latency(),
            Some(Duration::from_millis(3))
        );
    }
}
