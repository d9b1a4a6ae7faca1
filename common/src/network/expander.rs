//! # Target Expander
//!
//! Turns parsed host and port specifications into a lazy, restartable
//! sequence of [`Target`]s. Hosts form the outer loop and ports the inner
//! loop, so the same input always yields the same order.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::SpecError;
use crate::network::interface;
use crate::network::ports::PortList;
use crate::network::range::{self, Ipv4Range, Ipv6Range};
use crate::network::target::{HostSpec, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Single(IpAddr),
    V4(Ipv4Range),
    V6(Ipv6Range),
}

impl Segment {
    fn len(&self) -> u64 {
        match self {
            Segment::Single(_) => 1,
            Segment::V4(range) => range.len(),
            Segment::V6(range) => range.len(),
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = IpAddr> + '_> {
        match self {
            Segment::Single(addr) => Box::new(std::iter::once(*addr)),
            Segment::V4(range) => Box::new(range.to_iter()),
            Segment::V6(range) => Box::new(range.to_iter()),
        }
    }
}

/// An ordered collection of host addresses, stored as spans.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostSet {
    segments: Vec<Segment>,
}

impl HostSet {
    /// Expands `spec`, looking hostnames up in `resolved`.
    ///
    /// CIDR network and broadcast addresses are kept only when `include_bounds` is set.
    pub fn from_spec(
        spec: &HostSpec,
        resolved: &HashMap<String, IpAddr>,
        include_bounds: bool,
    ) -> Result<Self, SpecError> {
        let mut set = HostSet::default();
        set.push_spec(spec, resolved, include_bounds)?;
        Ok(set)
    }

    pub fn from_addrs(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            segments: addrs.into_iter().map(Segment::Single).collect(),
        }
    }

    fn push_spec(
        &mut self,
        spec: &HostSpec,
        resolved: &HashMap<String, IpAddr>,
        include_bounds: bool,
    ) -> Result<(), SpecError> {
        match spec {
            HostSpec::Lan => {
                let net = interface::get_lan_network()
                    .map_err(|e| SpecError::invalid("lan", e.to_string()))?;
                let lan = range::cidr_range(net.network(), net.prefix(), include_bounds)?;
                self.segments.push(Segment::V4(lan));
            }
            HostSpec::Host { addr } => self.segments.push(Segment::Single(*addr)),
            HostSpec::Name { name } => {
                let addr = resolved
                    .get(name)
                    .ok_or_else(|| SpecError::Unresolvable { name: name.clone() })?;
                self.segments.push(Segment::Single(*addr));
            }
            HostSpec::Range { ipv4_range } => self.segments.push(Segment::V4(*ipv4_range)),
            HostSpec::Cidr {
                addr: IpAddr::V4(ip),
                prefix,
            } => {
                let block = range::cidr_range(*ip, *prefix, include_bounds)?;
                self.segments.push(Segment::V4(block));
            }
            HostSpec::Cidr {
                addr: IpAddr::V6(ip),
                prefix,
            } => {
                let block = range::cidr_range_v6(*ip, *prefix, include_bounds)?;
                self.segments.push(Segment::V6(block));
            }
            HostSpec::Multi { specs } => {
                for spec in specs {
                    self.push_spec(spec, resolved, include_bounds)?;
                }
            }
        }
        Ok(())
    }

    /// Number of addresses, computed without iterating.
    pub fn len(&self) -> u64 {
        self.segments
            .iter()
            .fold(0u64, |acc, seg| acc.saturating_add(seg.len()))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.segments.iter().flat_map(Segment::iter)
    }
}

/// Hosts crossed with ports. Iterate as often as needed; every pass is identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    hosts: HostSet,
    ports: PortList,
}

impl TargetSet {
    pub fn new(hosts: HostSet, ports: PortList) -> Self {
        Self { hosts, ports }
    }

    /// Rejects expansions that would produce more than `max` targets.
    pub fn limited(self, max: u64, spec: &str) -> Result<Self, SpecError> {
        let len = self.len();
        if len > max {
            return Err(SpecError::invalid(
                spec,
                format!("expands to {len} targets, more than the limit of {max}"),
            ));
        }
        if len == 0 {
            return Err(SpecError::invalid(spec, "expands to no targets"));
        }
        Ok(self)
    }

    pub fn hosts(&self) -> &HostSet {
        &self.hosts
    }

    pub fn ports(&self) -> &PortList {
        &self.ports
    }

    pub fn len(&self) -> u64 {
        let per_host = self.ports.len().max(1) as u64;
        self.hosts.len().saturating_mul(per_host)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Targets in host-major order. Hosts without ports yield a bare address.
    pub fn iter(&self) -> impl Iterator<Item = Target> + '_ {
        let ports = self.ports.as_slice();
        self.hosts.iter().flat_map(move |addr| {
            let bare = ports.is_empty().then(|| Target::host(addr));
            bare.into_iter()
                .chain(ports.iter().map(move |port| Target::new(addr, Some(*port))))
        })
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
