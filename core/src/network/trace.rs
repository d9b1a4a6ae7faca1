//! UDP traceroute hops.
//!
//! Each hop is a UDP datagram sent with a limited TTL towards a high port.
//! Routers answer with ICMP time-exceeded, the destination with ICMP
//! port-unreachable. Replies are routed back to the waiting probe by the
//! UDP header quoted inside the ICMP message: destination port, destination
//! address and our local source port must all match.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netprobe_common::probe::{ErrorKind, Metadata, ProbeOutcome, UnreachableReason};
use netprobe_protocols::icmp::{self, CODE_PORT_UNREACHABLE, IcmpReply, QuotedUdp};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::network::tcp::classify_connect_error;
use crate::network::transport::{self, CapturedPacket};

pub const BASE_PORT: u16 = 33434;
/// Ports cycle through this many values above [`BASE_PORT`].
const PORT_SPAN: u16 = 1024;
const PAYLOAD: &[u8] = b"netprobe";

#[derive(Debug)]
struct HopReply {
    responder: IpAddr,
    reply: IcmpReply,
    received_at: Instant,
}

/// A probe waiting for its ICMP answer, keyed by destination port.
#[derive(Debug)]
struct Waiter {
    destination: Ipv4Addr,
    src_port: u16,
    tx: oneshot::Sender<HopReply>,
}

impl Waiter {
    fn claims(&self, quoted: &QuotedUdp) -> bool {
        quoted.destination == self.destination && quoted.src_port == self.src_port
    }
}

type Pending = Arc<Mutex<HashMap<u16, Waiter>>>;

/// Sends TTL-limited probes and matches the ICMP answers.
///
/// Dropping the tracer stops the capture task and its listener thread.
pub struct UdpTracer {
    pending: Pending,
    next_port: AtomicU16,
    shutdown: CancellationToken,
}

impl UdpTracer {
    pub fn new() -> anyhow::Result<Self> {
        if !is_root::is_root() {
            warn!("traceroute needs a raw ICMP socket; this usually requires root");
        }
        let packets = transport::start_icmp_capture()?;
        let pending: Pending = Arc::default();
        let shutdown = CancellationToken::new();

        tokio::spawn(route_replies(packets, pending.clone(), shutdown.clone()));

        Ok(Self {
            pending,
            next_port: AtomicU16::new(1),
            shutdown,
        })
    }

    fn next_port(&self) -> u16 {
        let offset = self.next_port.fetch_add(1, Ordering::Relaxed) % PORT_SPAN;
        BASE_PORT + offset
    }

    /// Sends one probe with `ttl` and waits up to `probe_timeout` for its answer.
    pub async fn probe(&self, destination: Ipv4Addr, ttl: u8, probe_timeout: Duration) -> ProbeOutcome {
        let port = self.next_port();
        let socket = match bind_with_ttl(ttl).await {
            Ok(socket) => socket,
            Err(e) => return classify_connect_error(&e),
        };
        let src_port = match socket.local_addr() {
            Ok(local) => local.port(),
            Err(e) => return classify_connect_error(&e),
        };

        let (tx, reply_rx) = oneshot::channel();
        let waiter = Waiter { destination, src_port, tx };
        let _registration = Registration::insert(&self.pending, port, waiter);

        let start = Instant::now();
        let target = SocketAddr::new(IpAddr::V4(destination), port);
        if let Err(e) = socket.send_to(PAYLOAD, target).await {
            return classify_connect_error(&e);
        }

        match timeout(probe_timeout, reply_rx).await {
            Ok(Ok(hop)) => interpret(hop, IpAddr::V4(destination), start),
            Ok(Err(_closed)) => ProbeOutcome::error(ErrorKind::Io, "ICMP capture stopped"),
            Err(_elapsed) => ProbeOutcome::Timeout,
        }
    }
}

impl Drop for UdpTracer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn bind_with_ttl(ttl: u8) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?;
    socket.set_ttl(u32::from(ttl))?;
    Ok(socket)
}

fn interpret(hop: HopReply, destination: IpAddr, sent_at: Instant) -> ProbeOutcome {
    let latency = hop.received_at.saturating_duration_since(sent_at);
    let reached = hop.responder == destination;

    match hop.reply {
        IcmpReply::TimeExceeded(_) => ProbeOutcome::Success {
            latency,
            meta: Metadata::Hop {
                responder: hop.responder,
                reached,
            },
        },
        IcmpReply::Unreachable { code, .. } if code == CODE_PORT_UNREACHABLE || reached => {
            ProbeOutcome::Success {
                latency,
                meta: Metadata::Hop {
                    responder: hop.responder,
                    reached: true,
                },
            }
        }
        IcmpReply::Unreachable { code: 0, .. } => {
            ProbeOutcome::Unreachable(UnreachableReason::NetworkUnreachable)
        }
        IcmpReply::Unreachable { code: 1, .. } => {
            ProbeOutcome::Unreachable(UnreachableReason::HostUnreachable)
        }
        IcmpReply::Unreachable { code, .. } => ProbeOutcome::Unreachable(UnreachableReason::Icmp(code)),
        IcmpReply::EchoReply { .. } => ProbeOutcome::Success {
            latency,
            meta: Metadata::Hop {
                responder: hop.responder,
                reached: true,
            },
        },
    }
}

/// Removes the pending entry when the probe finishes, however it finishes.
struct Registration<'a> {
    pending: &'a Pending,
    port: u16,
}

impl<'a> Registration<'a> {
    fn insert(pending: &'a Pending, port: u16, waiter: Waiter) -> Self {
        if let Ok(mut map) = pending.lock() {
            map.insert(port, waiter);
        }
        Self { pending, port }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.pending.lock() {
            map.remove(&self.port);
        }
    }
}

/// Takes the waiter a quoted datagram belongs to. Replies quoting someone
/// else's datagram to the same port leave the waiter in place.
fn claim(pending: &Pending, quoted: &QuotedUdp) -> Option<Waiter> {
    let mut map = pending.lock().ok()?;
    if !map.get(&quoted.dst_port)?.claims(quoted) {
        return None;
    }
    map.remove(&quoted.dst_port)
}

async fn route_replies(
    mut packets: mpsc::UnboundedReceiver<CapturedPacket>,
    pending: Pending,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            packet = packets.recv() => {
                let Some((bytes, responder)) = packet else { break };
                let received_at = Instant::now();
                let Some(reply) = icmp::classify(&bytes) else { continue };

                let quoted = match reply {
                    IcmpReply::TimeExceeded(quoted) => quoted,
                    IcmpReply::Unreachable { quoted, .. } => quoted,
                    IcmpReply::EchoReply { .. } => continue,
                };

                match claim(&pending, &quoted) {
                    Some(waiter) => {
                        let _ = waiter.tx.send(HopReply { responder, reply, received_at });
                    }
                    None => debug!(port = quoted.dst_port, %responder, "unmatched ICMP reply"),
                }
            }
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
