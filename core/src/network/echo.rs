use std::io;
use std::net::IpAddr;
use std::time::Duration;

use netprobe_common::probe::{ErrorKind, Metadata, ProbeOutcome};
use surge_ping::{Client, Config, ICMP, IcmpPacket, PingIdentifier, PingSequence, SurgeError};

const PAYLOAD: [u8; 56] = [0; 56];

/// Sends one ICMP echo request and waits for the matching reply.
///
/// Each call opens its own socket, released when the client drops.
pub async fn echo_probe(addr: IpAddr, seq: u16, probe_timeout: Duration) -> ProbeOutcome {
    let config = match addr {
        IpAddr::V4(_) => Config::default(),
        IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
    };

    let client = match Client::new(&config) {
        Ok(client) => client,
        Err(e) => return socket_error(&e),
    };

    let mut pinger = client.pinger(addr, PingIdentifier(rand::random())).await;
    pinger.timeout(probe_timeout);

    match pinger.ping(PingSequence(seq), &PAYLOAD).await {
        Ok((IcmpPacket::V4(reply), latency)) => ProbeOutcome::Success {
            latency,
            meta: Metadata::Echo {
                seq,
                ttl: reply.get_ttl().into(),
            },
        },
        Ok((IcmpPacket::V6(_), latency)) => ProbeOutcome::Success {
            latency,
            meta: Metadata::Echo { seq, ttl: None },
        },
        Err(SurgeError::Timeout { .. }) => ProbeOutcome::Timeout,
        Err(SurgeError::IOError(e)) => socket_error(&e),
        Err(e) => ProbeOutcome::error(ErrorKind::Protocol, e.to_string()),
    }
}

fn socket_error(err: &io::Error) -> ProbeOutcome {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ProbeOutcome::error(
            ErrorKind::PermissionDenied,
            "opening an ICMP socket requires privileges",
        ),
        _ => crate::network::tcp::classify_connect_error(err),
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
