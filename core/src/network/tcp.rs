use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use netprobe_common::probe::{ErrorKind, Metadata, ProbeOutcome, UnreachableReason};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};

/// Most a banner read takes from the socket.
const BANNER_LEN: usize = 1024;
/// Services that greet the client on their own.
const TALKS_FIRST: &[u16] = &[21, 22, 25, 110, 143];
const HTTP_PROMPT: &[u8] = b"HEAD / HTTP/1.0\r\n\r\n";
const LINE_PROMPT: &[u8] = b"\r\n";

/// Attempts a full handshake with `addr`.
///
/// The stream is dropped as soon as the handshake finishes, closing the socket.
pub async fn handshake_probe(addr: SocketAddr, probe_timeout: Duration) -> ProbeOutcome {
    let start = Instant::now();

    match timeout(probe_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => ProbeOutcome::success(start.elapsed()),
        Ok(Err(e)) => classify_connect_error(&e),
        Err(_elapsed) => ProbeOutcome::Timeout,
    }
}

/// Attempts a full handshake with `addr`, then reads the first line the service sends.
///
/// The read gets half of what the handshake left of `probe_timeout`. A silent
/// service is still open, just without a banner.
pub async fn banner_probe(addr: SocketAddr, probe_timeout: Duration) -> ProbeOutcome {
    let start = Instant::now();
    let mut stream = match timeout(probe_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return classify_connect_error(&e),
        Err(_elapsed) => return ProbeOutcome::Timeout,
    };
    let latency = start.elapsed();

    let budget = probe_timeout.saturating_sub(latency) / 2;
    match timeout(budget, read_banner(&mut stream, addr.port())).await {
        Ok(Some(banner)) => ProbeOutcome::Success {
            latency,
            meta: Metadata::Banner(banner),
        },
        _ => ProbeOutcome::success(latency),
    }
}

/// What to send before reading, for services that wait for the client.
fn banner_prompt(port: u16) -> Option<&'static [u8]> {
    match port {
        80 | 8000 | 8080 => Some(HTTP_PROMPT),
        port if TALKS_FIRST.contains(&port) => None,
        _ => Some(LINE_PROMPT),
    }
}

async fn read_banner(stream: &mut TcpStream, port: u16) -> Option<String> {
    if let Some(prompt) = banner_prompt(port) {
        stream.write_all(prompt).await.ok()?;
    }
    let mut buf = [0u8; BANNER_LEN];
    let read = stream.read(&mut buf).await.ok()?;
    first_line(&buf[..read])
}

/// First line of `bytes`, lossily decoded, or `None` when there is only whitespace.
fn first_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim().lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Maps a failed `connect` onto the outcome taxonomy.
pub fn classify_connect_error(err: &io::Error) -> ProbeOutcome {
    match err.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
            ProbeOutcome::RefusedOrClosed
        }
        io::ErrorKind::TimedOut => ProbeOutcome::Timeout,
        io::ErrorKind::HostUnreachable => {
            ProbeOutcome::Unreachable(UnreachableReason::HostUnreachable)
        }
        io::ErrorKind::NetworkUnreachable => {
            ProbeOutcome::Unreachable(UnreachableReason::NetworkUnreachable)
        }
        io::ErrorKind::PermissionDenied => {
            ProbeOutcome::error(ErrorKind::PermissionDenied, err.to_string())
        }
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => {
            ProbeOutcome::error(ErrorKind::AddrInUse, err.to_string())
        }
        _ => ProbeOutcome::error(ErrorKind::Io, err.to_string()),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::TcpListener;

    /// Accepts one connection, sends `greeting` and holds the socket open.
    async fn greeter(greeting: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(greeting).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        addr
    }

    #[tokio::test]
    async fn open_port_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outcome = handshake_probe(addr, Duration::from_secs(2)).await;
        assert!(outcome.is_success(), "got {outcome}");
    }

    #[tokio::test]
    async fn closed_port_is_refused() {
        // Bind then drop to find a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let outcome = handshake_probe(addr, Duration::from_secs(2)).await;
        assert_eq!(outcome, ProbeOutcome::RefusedOrClosed);
    }

    #[tokio::test]
    async fn greeting_becomes_the_banner() {
        let addr = greeter(b"SSH-2.0-OpenSSH_9.6\r\nextra\r\n").await;
        let outcome = banner_probe(addr, Duration::from_secs(2)).await;
        assert_eq!(
            outcome.meta(),
            Some(&Metadata::Banner("SSH-2.0-OpenSSH_9.6".to_string()))
        );
    }

    #[tokio::test]
    async fn silent_service_is_open_without_banner() {
        let addr = greeter(b"").await;
        let outcome = banner_probe(addr, Duration::from_millis(400)).await;
        assert!(outcome.is_success(), "got {outcome}");
        assert_eq!(outcome.meta(), Some(&Metadata::None));
    }

    #[tokio::test]
    async fn closed_port_has_no_banner() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        assert_eq!(banner_probe(addr, Duration::from_secs(1)).await, ProbeOutcome::RefusedOrClosed);
    }

    #[test]
    fn prompts_depend_on_the_port() {
        assert_eq!(banner_prompt(80), Some(HTTP_PROMPT));
        assert_eq!(banner_prompt(22), None);
        assert_eq!(banner_prompt(3306), Some(LINE_PROMPT));
        assert_eq!(first_line(b"  \r\n"), None);
        assert_eq!(first_line(b"\r\n220 mail ready\r\n").as_deref(), Some("220 mail ready"));
    }

    #[test]
    fn error_mapping() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_connect_error(&refused), ProbeOutcome::RefusedOrClosed);

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(
            classify_connect_error(&denied),
            ProbeOutcome::Error { kind: ErrorKind::PermissionDenied, .. }
        ));

        let in_use = io::Error::from(io::ErrorKind::AddrNotAvailable);
        assert!(matches!(
            classify_connect_error(&in_use),
            ProbeOutcome::Error { kind: ErrorKind::AddrInUse, .. }
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn unroutable_address_times_out() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)), 443);
        let outcome = handshake_probe(addr, Duration::from_millis(200)).await;
        assert_eq!(outcome, ProbeOutcome::Timeout);
    }
}
