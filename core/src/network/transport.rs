//! Raw ICMP capture.
//!
//! pnet's transport receiver is blocking, so a dedicated thread pulls packets
//! off the socket and forwards them over an unbounded channel. The thread
//! exits once the receiving side of the channel is dropped.

use std::net::IpAddr;
use std::time::Duration;

use anyhow::Context;
use pnet::packet::Packet;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::transport::{self, TransportChannelType, TransportProtocol};
use tokio::sync::mpsc;
use tracing::debug;

const TRANSPORT_BUFFER_SIZE: usize = 4096;
const CHANNEL_TYPE_ICMP: TransportChannelType =
    TransportChannelType::Layer4(TransportProtocol::Ipv4(IpNextHeaderProtocols::Icmp));
/// How often the listener thread checks whether anyone is still listening.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Raw ICMP message bytes plus the address that sent them.
pub type CapturedPacket = (Vec<u8>, IpAddr);

/// Opens a raw ICMPv4 socket. Requires elevated privileges on most systems.
pub fn start_icmp_capture() -> anyhow::Result<mpsc::UnboundedReceiver<CapturedPacket>> {
    let (_tx, mut rx_socket) = transport::transport_channel(TRANSPORT_BUFFER_SIZE, CHANNEL_TYPE_ICMP)
        .context("opening raw ICMP socket")?;
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let mut iterator = transport::icmp_packet_iter(&mut rx_socket);
        while !queue_tx.is_closed() {
            match iterator.next_with_timeout(POLL_INTERVAL) {
                Ok(Some((packet, source_ip))) => {
                    if queue_tx.send((packet.packet().to_vec(), source_ip)).is_err() {
                        break;
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    debug!(error = %e, "ICMP capture stopped");
                    break;
                }
            }
        }
    });

    Ok(queue_rx)
}
