use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;

use colored::*;
use netprobe_common::probe::{DnsRecord, Metadata, ProbeOutcome};

use crate::terminal::colors;

pub type Detail = (String, ColoredString);

pub fn ipv6_to_type_str(ipv6_addr: &Ipv6Addr) -> &'static str {
    let first_byte = ipv6_addr.octets()[0];
    if (0x20..=0x3f).contains(&first_byte) {
        return "GUA";
    }
    if ipv6_addr.is_unique_local() {
        return "ULA";
    }
    if ipv6_addr.is_unicast_link_local() {
        return "LLA";
    }
    "IPv6"
}

pub fn ip_to_detail(ip: &IpAddr) -> Detail {
    match ip {
        IpAddr::V4(ipv4_addr) => ("IPv4".to_string(), ipv4_addr.to_string().color(colors::IPV4_ADDR)),
        IpAddr::V6(ipv6_addr) => (
            ipv6_to_type_str(ipv6_addr).to_string(),
            ipv6_addr.to_string().color(colors::IPV6_ADDR),
        ),
    }
}

pub fn ip(addr: &IpAddr) -> ColoredString {
    match addr {
        IpAddr::V4(_) => addr.to_string().color(colors::IPV4_ADDR),
        IpAddr::V6(_) => addr.to_string().color(colors::IPV6_ADDR),
    }
}

pub fn millis(latency: Duration) -> String {
    format!("{:.1}ms", latency.as_secs_f64() * 1000.0)
}

pub fn seconds(elapsed: Duration) -> ColoredString {
    format!("{:.2}s", elapsed.as_secs_f64()).bold().yellow()
}

/// A short colored word describing `outcome`.
pub fn outcome(outcome: &ProbeOutcome) -> ColoredString {
    match outcome {
        ProbeOutcome::Success { latency, .. } => format!("open {}", millis(*latency)).color(colors::OK),
        ProbeOutcome::RefusedOrClosed => "closed".color(colors::CLOSED),
        ProbeOutcome::Timeout => "timeout".color(colors::SILENT),
        ProbeOutcome::Unreachable(reason) => format!("unreachable ({reason})").color(colors::FAILED),
        ProbeOutcome::Error { kind, detail } if detail.is_empty() => kind.to_string().color(colors::FAILED),
        ProbeOutcome::Error { kind, detail } => format!("{kind}: {detail}").color(colors::FAILED),
    }
}

/// Same as [`outcome`] but worded for checks instead of ports.
pub fn check(result: &ProbeOutcome) -> ColoredString {
    match result {
        ProbeOutcome::Success { latency, .. } => format!("ok {}", millis(*latency)).color(colors::OK),
        other => outcome(other),
    }
}

pub fn record_to_detail(record: &DnsRecord) -> Detail {
    let value = format!("{} (ttl {})", record.value, record.ttl);
    (record.record.to_string(), value.color(colors::ACCENT))
}

pub fn records(outcome: &ProbeOutcome) -> &[DnsRecord] {
    match outcome.meta() {
        Some(Metadata::Records(records)) => records,
        _ => &[],
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
