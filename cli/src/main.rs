mod commands;
mod terminal;

use std::time::Duration;

use commands::{CommandLine, Commands, check, discover, dns, ping, scan, trace, wol};
use netprobe_common::config::{DnsSettings, PingSettings, ScanSettings, TraceSettings};
use netprobe_core::{Engine, ScanKind};
use terminal::{logging, print};
use tracing::warn;

/// Width of the longest key printed with `print::aligned_line`.
const KEY_WIDTH: usize = 11;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose, commands.quiet);
    print::initialize(commands.quiet, KEY_WIDTH);
    print::banner(commands.no_banner);

    let dns = DnsSettings {
        server: commands.resolver,
        ..DnsSettings::default()
    };
    let engine = Engine::new(&dns);

    let result = match commands.command {
        Commands::Scan {
            hosts,
            ports,
            all,
            banners,
            opts,
        } => {
            print::header("starting scanner");
            let kind = if banners { ScanKind::TcpBanner } else { ScanKind::TcpConnect };
            scan::scan(&engine, &hosts, &ports, kind, all, &opts.settings(dns)).await
        }
        Commands::Discover {
            hosts,
            icmp,
            names,
            opts,
        } => {
            print::header("getting ready for discovery");
            warn_without_root();
            discover::discover(&engine, &hosts, icmp, names, &opts.settings(dns)).await
        }
        Commands::Trace {
            destination,
            max_hops,
            timeout,
            probes,
            silent_limit,
        } => {
            print::header("tracing route");
            warn_without_root();
            let settings = TraceSettings {
                max_hops,
                per_hop_timeout: Duration::from_millis(timeout),
                probes_per_hop: probes,
                no_response_limit: silent_limit,
            };
            trace::trace(&engine, &destination, settings).await
        }
        Commands::Ping {
            target,
            count,
            interval,
            timeout,
            down_after,
            no_down,
        } => {
            print::header("pinging");
            warn_without_root();
            let settings = PingSettings {
                count,
                interval: Duration::from_millis(interval),
                timeout: Duration::from_millis(timeout),
                down_after: (!no_down).then_some(down_after),
            };
            ping::ping(&engine, &target, settings).await
        }
        Commands::Dns { query, types, timeout } => {
            print::header("dns lookup");
            dns::dns(&engine, &query, &types, Duration::from_millis(timeout)).await
        }
        Commands::Wol { mac, broadcast, port } => {
            print::header("wake on lan");
            wol::wol(&engine, &mac, broadcast, port).await
        }
        Commands::Check { timeout, host } => {
            print::header("checking connectivity");
            let settings = ScanSettings {
                timeout: Duration::from_millis(timeout),
                dns,
                ..ScanSettings::default()
            };
            check::check(&engine, &settings, host.as_deref()).await
        }
    };

    print::end_of_program();
    result
}

/// Echo probes need a raw or privileged ICMP socket on most systems.
fn warn_without_root() {
    if !is_root::is_root() {
        warn!("not running as root; ICMP probes may be refused");
    }
}
