//! Contiguous address spans produced by range and CIDR notation.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pnet::ipnetwork::{Ipv4Network, Ipv6Network};

use crate::error::SpecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    pub fn len(&self) -> u64 {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        if end < start {
            0
        } else {
            u64::from(end - start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_iter(&self) -> impl Iterator<Item = IpAddr> + use<> {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        (start..=end).map(|ip| IpAddr::V4(Ipv4Addr::from(ip)))
    }
}

/// An inclusive IPv6 span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Range {
    pub start_addr: Ipv6Addr,
    pub end_addr: Ipv6Addr,
}

impl Ipv6Range {
    pub fn new(start_addr: Ipv6Addr, end_addr: Ipv6Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    /// Saturates at `u64::MAX`; callers cap expansion well below that.
    pub fn len(&self) -> u64 {
        let start: u128 = self.start_addr.into();
        let end: u128 = self.end_addr.into();
        if end < start {
            0
        } else {
            u64::try_from(end - start).map_or(u64::MAX, |n| n.saturating_add(1))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_iter(&self) -> impl Iterator<Item = IpAddr> + use<> {
        let start: u128 = self.start_addr.into();
        let end: u128 = self.end_addr.into();
        (start..=end).map(|ip| IpAddr::V6(Ipv6Addr::from(ip)))
    }
}

/// Usable IPv4 hosts of `ip/prefix`.
///
/// Network and broadcast addresses are dropped unless `include_bounds` is set.
/// A /31 or /32 has neither, so every address is kept.
pub fn cidr_range(ip: Ipv4Addr, prefix: u8, include_bounds: bool) -> Result<Ipv4Range, SpecError> {
    let network = Ipv4Network::new(ip, prefix)
        .map_err(|_| SpecError::invalid(format!("{ip}/{prefix}"), "IPv4 prefix must be 0-32"))?;
    let start: u32 = network.network().into();
    let end: u32 = network.broadcast().into();

    if include_bounds || prefix >= 31 {
        return Ok(Ipv4Range::new(start.into(), end.into()));
    }
    Ok(Ipv4Range::new((start + 1).into(), (end - 1).into()))
}

/// Addresses of `ip/prefix`. The subnet-router address is dropped unless
/// `include_bounds` is set; IPv6 has no broadcast.
pub fn cidr_range_v6(
    ip: Ipv6Addr,
    prefix: u8,
    include_bounds: bool,
) -> Result<Ipv6Range, SpecError> {
    let network = Ipv6Network::new(ip, prefix)
        .map_err(|_| SpecError::invalid(format!("{ip}/{prefix}"), "IPv6 prefix must be 0-128"))?;
    let start: u128 = network.network().into();
    let host_bits = 128 - u32::from(prefix);
    let end: u128 = if host_bits == 128 {
        u128::MAX
    } else {
        start | ((1u128 << host_bits) - 1)
    };

    if include_bounds || prefix >= 127 {
        return Ok(Ipv6Range::new(start.into(), end.into()));
    }
    Ok(Ipv6Range::new((start + 1).into(), end.into()))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
