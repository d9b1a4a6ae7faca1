//! # Probe Target Model
//!
//! Defines what a probe is aimed at and how users describe sets of hosts.
//!
//! A host specification can be:
//! * A single IP address (host).
//! * A hostname, resolved before the scan starts.
//! * An IPv4 range (e.g., `192.168.1.1-100`).
//! * A CIDR block (e.g., `192.168.1.0/24`, `2001:db8::/120`).
//! * The local LAN (keyword `lan`, detected automatically).
//! * A comma-separated list of any of the above.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::error::SpecError;
use crate::network::range::Ipv4Range;

/// An address plus optional port. Identity is the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub addr: IpAddr,
    pub port: Option<u16>,
}

impl Target {
    pub fn new(addr: IpAddr, port: Option<u16>) -> Self {
        Self { addr, port }
    }

    pub fn host(addr: IpAddr) -> Self {
        Self { addr, port: None }
    }

    /// Socket address, using `fallback` when the target carries no port.
    pub fn socket_addr(&self, fallback: u16) -> SocketAddr {
        SocketAddr::new(self.addr, self.port.unwrap_or(fallback))
    }
}

impl From<SocketAddr> for Target {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), Some(addr.port()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.addr, self.port) {
            (IpAddr::V6(v6), Some(port)) => write!(f, "[{v6}]:{port}"),
            (addr, Some(port)) => write!(f, "{addr}:{port}"),
            (addr, None) => write!(f, "{addr}"),
        }
    }
}

/// A user-supplied description of one or more hosts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostSpec {
    /// The primary private network of the best local interface.
    Lan,
    /// A single specific host.
    Host { addr: IpAddr },
    /// A hostname that still needs resolving.
    Name { name: String },
    /// An inclusive range of IPv4 addresses.
    Range { ipv4_range: Ipv4Range },
    /// A CIDR block, expanded later according to the bounds policy.
    Cidr { addr: IpAddr, prefix: u8 },
    /// A list of specifications, expanded in order.
    Multi { specs: Vec<HostSpec> },
}

impl FromStr for HostSpec {
    type Err = SpecError;

    /// Parses a string into a `HostSpec`.
    ///
    /// Supported formats:
    /// * **Keyword**: "lan" (case-insensitive).
    /// * **Host**: Single IPv4/IPv6 address (e.g., "192.168.1.5").
    /// * **Range**: "Start-End" (e.g., "192.168.1.1-50", "192.168.1.1-192.168.1.50").
    /// * **CIDR**: "Network/Prefix" (e.g., "192.168.1.0/24").
    /// * **Hostname**: anything else that is a valid DNS name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SpecError::invalid(s, "empty host specification"));
        }

        if s.contains(',') {
            return parse_commas(s);
        }

        if s.eq_ignore_ascii_case("lan") {
            return Ok(HostSpec::Lan);
        }

        if let Some(spec) = parse_host(s) {
            return Ok(spec);
        }

        if let Some(spec) = parse_cidr(s)? {
            return Ok(spec);
        }

        if let Some(spec) = parse_ip_range(s)? {
            return Ok(spec);
        }

        parse_hostname(s)
    }
}

impl HostSpec {
    /// Hostnames that must be resolved before expansion, in input order.
    pub fn hostnames(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_names(self, &mut names);
        names
    }
}

fn collect_names<'a>(spec: &'a HostSpec, names: &mut Vec<&'a str>) {
    match spec {
        HostSpec::Name { name } => names.push(name),
        HostSpec::Multi { specs } => specs.iter().for_each(|s| collect_names(s, names)),
        _ => {}
    }
}

/// Parses a comma-separated list (e.g., "192.168.1.5, 10.0.0.1-50, lan").
fn parse_commas(s: &str) -> Result<HostSpec, SpecError> {
    let mut specs = Vec::new();

    for part in s.split(',').map(str::trim) {
        if part.is_empty() {
            return Err(SpecError::invalid(s, "empty entry in host list"));
        }
        specs.push(HostSpec::from_str(part)?);
    }

    Ok(HostSpec::Multi { specs })
}

/// Parses a single IP address.
fn parse_host(s: &str) -> Option<HostSpec> {
    s.parse::<IpAddr>().ok().map(|addr| HostSpec::Host { addr })
}

/// Parses CIDR notation like "192.168.1.0/24" or "2001:db8::/64".
fn parse_cidr(s: &str) -> Result<Option<HostSpec>, SpecError> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let addr = ip_str
        .parse::<IpAddr>()
        .map_err(|_| SpecError::invalid(s, format!("'{ip_str}' is not an IP address")))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|_| SpecError::invalid(s, format!("'{prefix_str}' is not a prefix length")))?;

    let max_prefix = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max_prefix {
        return Err(SpecError::invalid(
            s,
            format!("prefix {prefix} exceeds {max_prefix}"),
        ));
    }

    Ok(Some(HostSpec::Cidr { addr, prefix }))
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<HostSpec>, SpecError> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let Ok(start_addr) = start_str.parse::<Ipv4Addr>() else {
        // Hostnames may contain dashes; only treat this as a range when it starts with an address.
        return Ok(None);
    };

    let end_addr = parse_range_end_addr(end_str, &start_addr)
        .map_err(|reason| SpecError::invalid(s, reason))?;

    if u32::from(start_addr) > u32::from(end_addr) {
        return Err(SpecError::invalid(s, "range start is greater than its end"));
    }

    let ipv4_range = Ipv4Range::new(start_addr, end_addr);
    Ok(Some(HostSpec::Range { ipv4_range }))
}

/// Helper to parse the end address of a range.
///
/// Handles abbreviated forms like "192.168.1.1-50" (implies 192.168.1.50)
/// and full forms like "192.168.1.1-192.168.1.255".
fn parse_range_end_addr(end_str: &str, start_addr: &Ipv4Addr) -> Result<Ipv4Addr, String> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    if end_str.is_empty() {
        return Err("end of range cannot be empty".to_string());
    }

    let mut end_octets = start_addr.octets();
    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet_str| octet_str.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| format!("invalid end of range '{end_str}': {e}"))?;

    if partial_octets.len() > 4 {
        return Err(format!("end of range has too many octets: {end_str}"));
    }

    let start_index = 4 - partial_octets.len();
    end_octets[start_index..].copy_from_slice(&partial_octets);

    Ok(Ipv4Addr::from(end_octets))
}

fn parse_hostname(s: &str) -> Result<HostSpec, SpecError> {
    let valid_label = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };

    let name = s.strip_suffix('.').unwrap_or(s);
    // A top-level label is never all digits.
    let numeric_tld = name
        .rsplit('.')
        .next()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()));

    if name.len() > 253 || numeric_tld || !name.split('.').all(valid_label) {
        return Err(SpecError::invalid(s, "not an address, range, CIDR block or hostname"));
    }

    Ok(HostSpec::Name {
        name: name.to_ascii_lowercase(),
    })
}

/// Literal addresses that need no resolving, for callers that only accept one host.
pub fn single_addr(spec: &HostSpec) -> Option<IpAddr> {
    match spec {
        HostSpec::Host { addr } => Some(*addr),
        HostSpec::Cidr { addr, prefix } if (addr.is_ipv4() && *prefix == 32) || *prefix == 128 => {
            Some(*addr)
        }
        _ => None,
    }
}

/// Unspecified address of the same family, handy for binding local sockets.
pub fn unspecified_for(addr: &IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
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
