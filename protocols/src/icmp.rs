//! Classification of ICMPv4 messages received in answer to UDP trace probes.

use std::net::Ipv4Addr;

use pnet::packet::Packet;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;

/// Type, code, checksum and four unused bytes precede the quoted datagram.
const ICMP_ERROR_HDR_LEN: usize = 8;

/// The IPv4 + UDP headers an ICMP error quotes back at the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotedUdp {
    pub destination: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpReply {
    /// A router dropped the probe because its TTL ran out.
    TimeExceeded(QuotedUdp),
    /// The probe was rejected. Code 3 (port unreachable) comes from the destination itself.
    Unreachable { code: u8, quoted: QuotedUdp },
    EchoReply { identifier: u16, sequence: u16 },
}

pub const CODE_PORT_UNREACHABLE: u8 = 3;

/// Classifies a raw ICMP message. Anything we did not cause yields `None`.
pub fn classify(bytes: &[u8]) -> Option<IcmpReply> {
    let icmp = IcmpPacket::new(bytes)?;
    let icmp_type = icmp.get_icmp_type();

    if icmp_type == IcmpTypes::EchoReply {
        let echo = EchoReplyPacket::new(icmp.packet())?;
        return Some(IcmpReply::EchoReply {
            identifier: echo.get_identifier(),
            sequence: echo.get_sequence_number(),
        });
    }

    if icmp_type == IcmpTypes::TimeExceeded {
        return quoted_udp(bytes).map(IcmpReply::TimeExceeded);
    }

    if icmp_type == IcmpTypes::DestinationUnreachable {
        let code = icmp.get_icmp_code().0;
        return quoted_udp(bytes).map(|quoted| IcmpReply::Unreachable { code, quoted });
    }

    None
}

fn quoted_udp(bytes: &[u8]) -> Option<QuotedUdp> {
    let quoted = bytes.get(ICMP_ERROR_HDR_LEN..)?;
    let ip = Ipv4Packet::new(quoted)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }

    let ihl = usize::from(ip.get_header_length()) * 4;
    let udp = UdpPacket::new(quoted.get(ihl..)?)?;

    Some(QuotedUdp {
        destination: ip.get_destination(),
        src_port: udp.get_source(),
        dst_port: udp.get_destination(),
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

    /// An ICMP error of `icmp_type`/`code` quoting a UDP datagram to 8.8.8.8:`dst_port`.
    fn icmp_error(icmp_type: u8, code: u8, dst_port: u16) -> Vec<u8> {
        let mut packet = vec![icmp_type, code, 0, 0, 0, 0, 0, 0];
        // Quoted IPv4 header: version 4, IHL 5, protocol UDP.
        let mut ip = [0u8; 20];
        ip[0] = 0x45;
        ip[8] = 1;
        ip[9] = 17;
        ip[12..16].copy_from_slice(&[192, 168, 1, 20]);
        ip[16..20].copy_from_slice(&[8, 8, 8, 8]);
        packet.extend_from_slice(&ip);
        // Quoted UDP header.
        packet.extend_from_slice(&40000u16.to_be_bytes());
        packet.extend_from_slice(&dst_port.to_be_bytes());
        packet.extend_from_slice(&[0, 8, 0, 0]);
        packet
    }

    #[test]
    fn time_exceeded_quotes_the_probe() {
        let reply = classify(&icmp_error(11, 0, 33435)).unwrap();
        assert_eq!(
            reply,
            IcmpReply::TimeExceeded(QuotedUdp {
                destination: Ipv4Addr::new(8, 8, 8, 8),
                src_port: 40000,
                dst_port: 33435,
            })
        );
    }

    #[test]
    fn port_unreachable_carries_code() {
        match classify(&icmp_error(3, CODE_PORT_UNREACHABLE, 33440)) {
            Some(IcmpReply::Unreachable { code, quoted }) => {
                assert_eq!(code, CODE_PORT_UNREACHABLE);
                assert_eq!(quoted.dst_port, 33440);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn echo_reply_fields() {
        let packet = [0u8, 0, 0, 0, 0x12, 0x34, 0x00, 0x07];
        assert_eq!(
            classify(&packet),
            Some(IcmpReply::EchoReply { identifier: 0x1234, sequence: 7 })
        );
    }

    #[test]
    fn ignores_unrelated_or_truncated() {
        assert_eq!(classify(&[8, 0, 0, 0, 0, 1, 0, 1]), None, "echo request");
        let mut truncated = icmp_error(11, 0, 33435);
        truncated.truncate(30);
        assert_eq!(classify(&truncated), None);
        assert_eq!(classify(&[11]), None);
    }
}
