use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use netprobe_common::SpecError;
use netprobe_common::network::target::unspecified_for;
use netprobe_common::probe::{DnsQuestion, ErrorKind, Metadata, ProbeOutcome};
use netprobe_protocols::dns::{self, DNS_PORT, Rcode};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout};
use tracing::debug;

use crate::network::tcp::classify_connect_error;

const RESOLV_CONF: &str = "/etc/resolv.conf";
const FALLBACK_RESOLVER: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));
const MAX_REPLY_LEN: usize = 4096;

/// First nameserver from the system configuration, else a public resolver.
pub fn system_resolver() -> SocketAddr {
    let configured = std::fs::read_to_string(RESOLV_CONF)
        .ok()
        .and_then(|conf| dns::first_nameserver(&conf));

    SocketAddr::new(configured.unwrap_or(FALLBACK_RESOLVER), DNS_PORT)
}

/// Asks `server` one question over UDP and classifies the answer.
pub async fn query_probe(server: SocketAddr, question: &DnsQuestion, probe_timeout: Duration) -> ProbeOutcome {
    let id: u16 = rand::random();
    let packet = match dns::build_query(id, question) {
        Ok(packet) => packet,
        Err(e) => return ProbeOutcome::error(ErrorKind::Protocol, e.to_string()),
    };

    let local = SocketAddr::new(unspecified_for(&server.ip()), 0);
    let socket = match UdpSocket::bind(local).await {
        Ok(socket) => socket,
        Err(e) => return classify_connect_error(&e),
    };
    if let Err(e) = socket.connect(server).await {
        return classify_connect_error(&e);
    }

    let start = Instant::now();
    if let Err(e) = socket.send(&packet).await {
        return classify_connect_error(&e);
    }

    match timeout(probe_timeout, await_reply(&socket, id)).await {
        Ok(ProbeOutcome::Success { meta, .. }) => ProbeOutcome::Success {
            latency: start.elapsed(),
            meta,
        },
        Ok(outcome) => outcome,
        Err(_elapsed) => ProbeOutcome::Timeout,
    }
}

/// Waits for the reply carrying `id`. Success latency is filled in by the caller.
async fn await_reply(socket: &UdpSocket, id: u16) -> ProbeOutcome {
    let mut buffer = vec![0u8; MAX_REPLY_LEN];
    loop {
        let len = match socket.recv(&mut buffer).await {
            Ok(len) => len,
            Err(e) => return classify_connect_error(&e),
        };

        let answer = match dns::parse_response(&buffer[..len]) {
            Ok(answer) => answer,
            Err(e) => {
                debug!(error = %e, "ignoring malformed DNS datagram");
                continue;
            }
        };
        if answer.id != id {
            debug!(expected = id, got = answer.id, "ignoring DNS reply for another query");
            continue;
        }

        let outcome = match answer.rcode {
            Rcode::NoError => ProbeOutcome::Success {
                latency: Duration::ZERO,
                meta: Metadata::Records(answer.records),
            },
            Rcode::NxDomain => ProbeOutcome::error(ErrorKind::NxDomain, ""),
            Rcode::ServFail => ProbeOutcome::error(ErrorKind::ServFail, ""),
            Rcode::Refused => ProbeOutcome::error(ErrorKind::Refused, ""),
            Rcode::Other(code) => {
                ProbeOutcome::error(ErrorKind::Protocol, format!("response code {code}"))
            }
        };
        return outcome;
    }
}

/// Resolves every name through the system resolver, first address wins.
pub async fn resolve_names(names: &[&str]) -> Result<HashMap<String, IpAddr>, SpecError> {
    let mut lookups: JoinSet<(String, Option<IpAddr>)> = JoinSet::new();
    for name in names {
        let name = name.to_string();
        lookups.spawn(async move {
            let addr = tokio::net::lookup_host((name.as_str(), 0))
                .await
                .ok()
                .and_then(|mut addrs| addrs.next())
                .map(|socket| socket.ip());
            (name, addr)
        });
    }

    let mut resolved = HashMap::new();
    while let Some(joined) = lookups.join_next().await {
        let Ok((name, addr)) = joined else { continue };
        match addr {
            Some(addr) => {
                debug!(%name, %addr, "resolved");
                resolved.insert(name, addr);
            }
            None => return Err(SpecError::Unresolvable { name }),
        }
    }

    // A lookup task that panicked leaves its name out of the map.
    if let Some(missing) = names.iter().find(|name| !resolved.contains_key(**name)) {
        return Err(SpecError::Unresolvable {
            name: missing.to_string(),
        });
    }
    Ok(resolved)
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
    use netprobe_common::probe::RecordType;

    /// A one-shot resolver on loopback that answers with `rcode` and echoes the question.
    async fn fake_resolver(rcode: u8, answer: Option<[u8; 4]>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            let mut reply = buf[..len].to_vec();
            reply[2] = 0x81;
            reply[3] = 0x80 | rcode;
            if let Some(octets) = answer {
                reply[7] = 1;
                reply.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4]);
                reply.extend_from_slice(&octets);
            }
            socket.send_to(&reply, peer).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn answers_become_records() {
        let server = fake_resolver(0, Some([10, 1, 2, 3])).await;
        let question = DnsQuestion::new("host.example", RecordType::A);

        let outcome = query_probe(server, &question, Duration::from_secs(2)).await;
        let Some(Metadata::Records(records)) = outcome.meta() else {
            panic!("expected records, got {outcome}");
        };
        assert_eq!(records[0].value, "10.1.2.3");
    }

    #[tokio::test]
    async fn nxdomain_is_not_a_timeout() {
        let server = fake_resolver(3, None).await;
        let question = DnsQuestion::new("missing.example", RecordType::A);

        let outcome = query_probe(server, &question, Duration::from_secs(2)).await;
        assert!(matches!(outcome, ProbeOutcome::Error { kind: ErrorKind::NxDomain, .. }));
    }

    #[tokio::test]
    async fn silent_resolver_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let question = DnsQuestion::new("host.example", RecordType::A);

        let outcome =
            query_probe(silent.local_addr().unwrap(), &question, Duration::from_millis(100)).await;
        assert_eq!(outcome, ProbeOutcome::Timeout);
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let resolved = resolve_names(&["localhost"]).await.unwrap();
        assert!(resolved["localhost"].is_loopback());
    }
}
