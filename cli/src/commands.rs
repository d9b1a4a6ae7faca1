pub mod check;
pub mod discover;
pub mod dns;
pub mod ping;
pub mod scan;
pub mod trace;
pub mod wol;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use netprobe_common::config::{DnsSettings, ScanSettings};
use netprobe_common::probe::RecordType;
use netprobe_common::report::{ScanEntry, ScanReport};
use netprobe_core::ScanHandle;
use netprobe_core::scheduler::ScanEvent;

use crate::terminal::input::{Interrupt, KeyListener};
use crate::terminal::progress;

#[derive(Parser)]
#[command(name = "netprobe", version)]
#[command(about = "A concurrent network probing toolkit.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// More log output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Less decoration (-q), or results only (-qq)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Skip the banner line
    #[arg(long, global = true)]
    pub no_banner: bool,

    /// DNS server used for lookups, as an address or address:port
    #[arg(long, global = true, value_name = "ADDR", value_parser = parse_resolver)]
    pub resolver: Option<SocketAddr>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe TCP ports on one or more hosts
    #[command(alias = "s")]
    Scan {
        /// Hosts: address, hostname, range (10.0.0.1-50), CIDR or `lan`, comma separated
        hosts: String,
        /// Ports: `22,80,8000-8100` or `common`
        #[arg(short, long, default_value = "common")]
        ports: String,
        /// Also list closed and filtered ports
        #[arg(short, long)]
        all: bool,
        /// Read a banner from every open port
        #[arg(short, long)]
        banners: bool,
        #[command(flatten)]
        opts: ScanOpts,
    },
    /// Find live hosts in a network
    #[command(alias = "d")]
    Discover {
        #[arg(default_value = "lan")]
        hosts: String,
        /// Use ICMP echo only instead of TCP with an echo fallback
        #[arg(long)]
        icmp: bool,
        /// Look up PTR names for the hosts found
        #[arg(short, long)]
        names: bool,
        #[command(flatten)]
        opts: ScanOpts,
    },
    /// Trace the route to a host
    #[command(alias = "t")]
    Trace {
        destination: String,
        #[arg(short, long, default_value_t = 30)]
        max_hops: u8,
        /// Per-hop timeout in milliseconds
        #[arg(short, long, default_value_t = 1000, value_name = "MS")]
        timeout: u64,
        /// Probes per hop, 1 to 3
        #[arg(short, long, default_value_t = 3)]
        probes: u8,
        /// Silent hops in a row before giving up, 0 disables
        #[arg(long, default_value_t = 3)]
        silent_limit: u8,
    },
    /// Send a series of echo requests
    #[command(alias = "p")]
    Ping {
        target: String,
        #[arg(short = 'n', long, default_value_t = 4)]
        count: u32,
        /// Pause between requests in milliseconds
        #[arg(short, long, default_value_t = 1000, value_name = "MS")]
        interval: u64,
        /// Reply timeout in milliseconds
        #[arg(short, long, default_value_t = 1000, value_name = "MS")]
        timeout: u64,
        /// Consecutive timeouts before the host is declared down
        #[arg(long, default_value_t = 3)]
        down_after: u32,
        /// Report every request instead of stopping on a down host
        #[arg(long)]
        no_down: bool,
    },
    /// Query DNS records, or the PTR name of an address
    #[command(alias = "n")]
    Dns {
        query: String,
        /// Record types, comma separated (A, AAAA, CNAME, MX, NS, TXT, PTR, SOA, or ALL)
        #[arg(short = 't', long = "type", value_delimiter = ',', default_value = "A")]
        types: Vec<String>,
        /// Timeout in milliseconds
        #[arg(long, default_value_t = 3000, value_name = "MS")]
        timeout: u64,
    },
    /// Wake a host with a magic packet
    #[command(alias = "w")]
    Wol {
        /// MAC address, XX:XX:XX:XX:XX:XX or XX-XX-XX-XX-XX-XX
        mac: String,
        #[arg(short, long, default_value = "255.255.255.255")]
        broadcast: IpAddr,
        #[arg(short, long, default_value_t = 9)]
        port: u16,
    },
    /// Check internet connectivity against well-known endpoints
    #[command(alias = "c")]
    Check {
        /// Connect timeout in milliseconds
        #[arg(short, long, default_value_t = 3000, value_name = "MS")]
        timeout: u64,

        /// Also send an echo request to this host
        #[arg(long, value_name = "HOST")]
        host: Option<String>,
    },
}

/// Limits shared by every scan-shaped command.
#[derive(Args, Debug, Clone)]
pub struct ScanOpts {
    /// Probes in flight at once
    #[arg(short, long, default_value_t = 100)]
    pub concurrency: usize,
    /// Per-probe timeout in milliseconds
    #[arg(short, long, default_value_t = 1000, value_name = "MS")]
    pub timeout: u64,
    /// Overall deadline in seconds
    #[arg(short, long, default_value_t = 60, value_name = "SECS")]
    pub deadline: u64,
    /// Extra attempts for probes that time out
    #[arg(short, long, default_value_t = 0)]
    pub retries: u32,
    /// Keep network and broadcast addresses of CIDR blocks
    #[arg(long)]
    pub include_bounds: bool,
    /// Keep dispatching even when every probe fails the same way
    #[arg(long)]
    pub keep_going: bool,
}

impl ScanOpts {
    pub fn settings(&self, dns: DnsSettings) -> ScanSettings {
        ScanSettings {
            concurrency: self.concurrency,
            timeout: Duration::from_millis(self.timeout),
            deadline: Duration::from_secs(self.deadline),
            retries: self.retries,
            include_bounds: self.include_bounds,
            halt_on_systemic: !self.keep_going,
            dns,
            ..ScanSettings::default()
        }
    }
}

const DNS_PORT: u16 = 53;

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_resolver(s: &str) -> Result<SocketAddr, String> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| format!("'{s}' is not an address or address:port"))
}

pub fn parse_record_types(types: &[String]) -> anyhow::Result<Vec<RecordType>> {
    let mut records: Vec<RecordType> = Vec::new();
    for token in types {
        let expanded = if token.eq_ignore_ascii_case("all") {
            RecordType::ALL.to_vec()
        } else {
            vec![token.parse()?]
        };
        for record in expanded {
            if !records.contains(&record) {
                records.push(record);
            }
        }
    }
    Ok(records)
}

/// Keeps the key listener and the signal handler alive until dropped.
pub struct InterruptGuard {
    _keys: KeyListener,
    signal: tokio::task::JoinHandle<()>,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.signal.abort();
    }
}

/// Calls `cancel(force)` on `q`, on `Ctrl+C` in raw mode, or on SIGINT.
pub fn on_interrupt<F>(cancel: F) -> InterruptGuard
where
    F: Fn(bool) + Clone + Send + Sync + 'static,
{
    let on_key = cancel.clone();
    let keys = KeyListener::start(move |interrupt| on_key(interrupt == Interrupt::Forced));
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel(true);
        }
    });
    InterruptGuard { _keys: keys, signal }
}

/// Runs a started scan to the end with a progress bar and the key listener.
///
/// `on_entry` sees every outcome as it arrives, in completion order.
pub async fn drive<F>(mut handle: ScanHandle, mut on_entry: F) -> anyhow::Result<ScanReport>
where
    F: FnMut(&ScanEntry),
{
    let bar = progress::scan_bar(handle.total() as u64);
    let control = handle.control();
    let guard = on_interrupt(move |force| control.cancel(force));

    while let Some(event) = handle.next_event().await {
        match event {
            ScanEvent::Started { .. } => {}
            ScanEvent::Outcome(entry) => {
                bar.inc(1);
                on_entry(&entry);
            }
            ScanEvent::SystemicFailure { kind } => {
                tracing::warn!("every probe so far failed with '{kind}'; check privileges and connectivity");
            }
            ScanEvent::Halted(halt) => {
                tracing::debug!(%halt, "scan halted");
                break;
            }
        }
    }

    drop(guard);
    bar.finish_and_clear();
    Ok(handle.wait().await?)
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
    use clap::CommandFactory;

    #[test]
    fn command_line_is_consistent() {
        CommandLine::command().debug_assert();
    }

    #[test]
    fn resolver_accepts_bare_addresses() {
        assert_eq!(parse_resolver("9.9.9.9").unwrap().to_string(), "9.9.9.9:53");
        assert_eq!(parse_resolver("[::1]:5353").unwrap().port(), 5353);
        assert!(parse_resolver("dns.example").is_err());
    }

    #[test]
    fn record_types_expand_and_dedupe() {
        let types = vec!["a".to_string(), "all".to_string()];
        let records = parse_record_types(&types).unwrap();
        assert_eq!(records[0], RecordType::A);
        assert_eq!(records.len(), RecordType::ALL.len());
        assert!(parse_record_types(&["bogus".to_string()]).is_err());
    }

    #[test]
    fn scan_flags_reach_settings() {
        let cli = CommandLine::parse_from(["netprobe", "scan", "10.0.0.0/30", "-p", "22", "-c", "8", "--keep-going"]);
        let Commands::Scan { opts, ports, .. } = cli.command else {
            panic!("expected scan");
        };
        let settings = opts.settings(DnsSettings::default());
        assert_eq!(ports, "22");
        assert_eq!(settings.concurrency, 8);
        assert!(!settings.halt_on_systemic);
    }

    #[test]
    fn banner_and_host_flags_parse() {
        let cli = CommandLine::parse_from(["netprobe", "scan", "10.0.0.1", "--banners"]);
        assert!(matches!(cli.command, Commands::Scan { banners: true, .. }));

        let cli = CommandLine::parse_from(["netprobe", "check", "--host", "nas.lan"]);
        let Commands::Check { host, .. } = cli.command else {
            panic!("expected check");
        };
        assert_eq!(host.as_deref(), Some("nas.lan"));
    }
}
