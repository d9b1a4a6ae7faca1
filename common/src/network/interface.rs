//! Local interface selection for the `lan` host keyword, and the default
//! gateway used by the connectivity check.

use std::net::Ipv4Addr;

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::{IpNetwork, Ipv4Network};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// The interface is operationally down.
    IsDown,
    /// Loopback interfaces never lead to a LAN.
    IsLoopback,
    /// The interface does not support broadcast.
    NotBroadcast,
    /// The interface is a point-to-point link (e.g., a VPN).
    IsPointToPoint,
    /// The interface carries no private IPv4 network.
    NoPrivateIpv4,
}

pub trait NetworkInterfaceExtension {
    fn get_ipv4_nets(&self) -> Vec<Ipv4Network>;
    fn get_private_ipv4_net(&self) -> Option<Ipv4Network>;
}

impl NetworkInterfaceExtension for NetworkInterface {
    fn get_ipv4_nets(&self) -> Vec<Ipv4Network> {
        self.ips
            .iter()
            .filter_map(|ip| match ip {
                IpNetwork::V4(ipv4) => Some(*ipv4),
                IpNetwork::V6(_) => None,
            })
            .collect()
    }

    fn get_private_ipv4_net(&self) -> Option<Ipv4Network> {
        self.get_ipv4_nets()
            .into_iter()
            .find(|net| net.ip().is_private())
    }
}

/// Finds the primary LAN network of this machine.
pub fn get_lan_network() -> anyhow::Result<Ipv4Network> {
    let interfaces: Vec<NetworkInterface> = datalink::interfaces()
        .into_iter()
        .filter(|interface| is_viable_lan_interface(interface).is_ok())
        .collect();

    let Some(interface) = select_best_lan_interface(&interfaces) else {
        anyhow::bail!("no interface available for LAN discovery");
    };

    interface
        .get_private_ipv4_net()
        .ok_or_else(|| anyhow::anyhow!("interface {} has no private IPv4 network", interface.name))
}

pub fn is_viable_lan_interface(interface: &NetworkInterface) -> Result<(), ViabilityError> {
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if interface.is_loopback() {
        return Err(ViabilityError::IsLoopback);
    }
    if !interface.is_broadcast() {
        return Err(ViabilityError::NotBroadcast);
    }
    if interface.is_point_to_point() {
        return Err(ViabilityError::IsPointToPoint);
    }
    if interface.get_private_ipv4_net().is_none() {
        return Err(ViabilityError::NoPrivateIpv4);
    }
    Ok(())
}

/// Prefers wired interfaces, judged by the usual `en*`/`eth*` naming.
pub fn select_best_lan_interface(interfaces: &[NetworkInterface]) -> Option<&NetworkInterface> {
    interfaces
        .iter()
        .find(|interface| interface.name.starts_with('e'))
        .or_else(|| interfaces.first())
}

const PROC_NET_ROUTE: &str = "/proc/net/route";
/// `RTF_UP | RTF_GATEWAY`.
const ROUTE_UP_GATEWAY: u32 = 0x3;

/// The IPv4 default gateway from the kernel routing table, when there is one.
///
/// Only Linux exposes the table this way. Elsewhere this returns `None`.
pub fn default_gateway() -> Option<Ipv4Addr> {
    let table = std::fs::read_to_string(PROC_NET_ROUTE).ok()?;
    parse_default_gateway(&table)
}

/// First up gateway route with destination `0.0.0.0` in `/proc/net/route` text.
///
/// Addresses in the table are little-endian hex.
pub fn parse_default_gateway(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [_iface, destination, gateway, flags, ..] = fields.as_slice() else {
            return None;
        };
        let flags = u32::from_str_radix(flags, 16).ok()?;
        if *destination != "00000000" || flags & ROUTE_UP_GATEWAY != ROUTE_UP_GATEWAY {
            return None;
        }
        let gateway = u32::from_str_radix(gateway, 16).ok()?;
        Some(Ipv4Addr::from(gateway.to_le_bytes()))
    })
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
    use pnet::datalink::MacAddr;

    const UP: u32 = 1;
    const BROADCAST: u32 = 1 << 1;
    const LOOPBACK: u32 = 1 << 3;

    fn ni(name: &str, ips: &[IpNetwork], flags: u32) -> NetworkInterface {
        NetworkInterface {
            name: name.into(),
            description: "".into(),
            index: 1,
            mac: Some(MacAddr::new(0x02, 0, 0, 0, 0, 1)),
            ips: ips.to_vec(),
            flags,
        }
    }

    fn v4(a: u8, b: u8, c: u8, d: u8, p: u8) -> IpNetwork {
        IpNetwork::V4(Ipv4Network::new(Ipv4Addr::new(a, b, c, d), p).unwrap())
    }

    #[test]
    fn rejects_loopback_and_public_only() {
        let lo = ni("lo", &[v4(127, 0, 0, 1, 8)], UP | LOOPBACK);
        assert_eq!(is_viable_lan_interface(&lo), Err(ViabilityError::IsLoopback));

        let public = ni("eth1", &[v4(8, 8, 8, 8, 24)], UP | BROADCAST);
        assert_eq!(is_viable_lan_interface(&public), Err(ViabilityError::NoPrivateIpv4));

        let down = ni("eth2", &[v4(192, 168, 1, 2, 24)], BROADCAST);
        assert_eq!(is_viable_lan_interface(&down), Err(ViabilityError::IsDown));
    }

    #[test]
    fn prefers_wired() {
        let wlan = ni("wlan0", &[v4(192, 168, 1, 20, 24)], UP | BROADCAST);
        let eth = ni("enp9s0", &[v4(10, 0, 0, 5, 16)], UP | BROADCAST);
        let interfaces = vec![wlan.clone(), eth.clone()];
        assert_eq!(select_best_lan_interface(&interfaces), Some(&eth));
        assert_eq!(select_best_lan_interface(&[wlan.clone()]), Some(&wlan));
        assert_eq!(
            eth.get_private_ipv4_net().map(|n| n.prefix()),
            Some(16)
        );
    }

    #[test]
    fn default_route_gateway_is_found() {
        let table = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0002A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0102A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
";
        assert_eq!(parse_default_gateway(table), Some(Ipv4Addr::new(192, 168, 2, 1)));
    }

    #[test]
    fn no_default_route_means_no_gateway() {
        let table = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0002A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0
tun0\t00000000\t00000000\t0001\t0\t0\t0\t00000000\t0\t0\t0
";
        assert_eq!(parse_default_gateway(table), None);
        assert_eq!(parse_default_gateway(""), None);
    }
}
