use std::net::{Ipv4Addr, SocketAddr};

use netprobe_common::network::target::unspecified_for;
use netprobe_protocols::wol::{DEFAULT_WOL_PORT, magic_packet};
use pnet::util::MacAddr;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::EngineError;

/// The limited broadcast address on the default Wake-on-LAN port.
pub fn default_broadcast() -> SocketAddr {
    SocketAddr::new(Ipv4Addr::BROADCAST.into(), DEFAULT_WOL_PORT)
}

/// Sends one magic packet for `mac` to `broadcast`. Succeeds once it is on the wire.
pub async fn send_magic_packet(mac: MacAddr, broadcast: SocketAddr) -> Result<(), EngineError> {
    let packet = magic_packet(mac);
    let socket = UdpSocket::bind(SocketAddr::new(unspecified_for(&broadcast.ip()), 0)).await?;
    socket.set_broadcast(true)?;

    let sent = socket.send_to(&packet, broadcast).await?;
    debug!(%mac, %broadcast, bytes = sent, "magic packet sent");
    Ok(())
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

    #[tokio::test]
    async fn packet_arrives_intact() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mac = MacAddr::new(0xde, 0xad, 0xbe, 0xef, 0x00, 0x01);

        send_magic_packet(mac, receiver.local_addr().unwrap()).await.unwrap();

        let mut buf = [0u8; 256];
        let len = receiver.recv(&mut buf).await.unwrap();
        assert_eq!(len, 102);
        assert_eq!(&buf[6..12], &[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
    }

    #[test]
    fn default_target_is_limited_broadcast() {
        assert_eq!(default_broadcast().to_string(), "255.255.255.255:9");
    }
}
