use std::collections::HashMap;
use std::net::IpAddr;

use colored::*;
use netprobe_common::config::ScanSettings;
use netprobe_common::probe::Metadata;
use netprobe_common::report::ScanEntry;
use netprobe_common::success;
use netprobe_core::{Engine, ScanKind, ScanSpec};
use tracing::warn;

use crate::commands::drive;
use crate::mprint;
use crate::terminal::format::{self, Detail};
use crate::terminal::print;

pub async fn discover(engine: &Engine, hosts: &str, icmp: bool, names: bool, settings: &ScanSettings) -> anyhow::Result<()> {
    let kind = if icmp { ScanKind::IcmpEcho } else { ScanKind::HostDiscovery };
    let spec = ScanSpec::new(hosts, None);
    let handle = engine.start_scan(&spec, kind, settings).await?;
    print::aligned_line("Hosts", handle.total().to_string());

    let report = drive(handle, |entry| {
        if entry.outcome.is_success() {
            success!("{} is up", format::ip(&entry.target.addr));
        }
    })
    .await?;

    let alive: Vec<&ScanEntry> = report.successes().collect();
    if alive.is_empty() {
        mprint!();
        print::header("zero hosts detected");
        print::no_results();
        return Ok(());
    }

    let hostnames = if names {
        lookup_names(engine, &alive, settings).await
    } else {
        HashMap::new()
    };

    mprint!();
    print::header("network discovery");
    for (idx, entry) in alive.iter().enumerate() {
        let addr = entry.target.addr;
        let name = hostnames.get(&addr).map(String::as_str).unwrap_or("No hostname");
        print::tree_head(idx, name);
        print::as_tree_one_level(host_details(entry));
        if idx + 1 != alive.len() {
            mprint!();
        }
    }

    let output = format!(
        "Discovery Complete: {} identified in {}",
        format!("{} active hosts", alive.len()).bold().green(),
        format::seconds(report.elapsed)
    );
    print::fat_separator();
    print::centerln(&output);
    Ok(())
}

fn host_details(entry: &ScanEntry) -> Vec<Detail> {
    let mut details = vec![format::ip_to_detail(&entry.target.addr)];
    let via = match entry.outcome.meta() {
        Some(Metadata::Alive { port: Some(port) }) => format!("tcp/{port}"),
        Some(Metadata::Echo { ttl: Some(ttl), .. }) => format!("echo (ttl {ttl})"),
        _ => "echo".to_string(),
    };
    details.push(("Via".to_string(), via.normal()));
    if let Some(latency) = entry.outcome.latency() {
        details.push(("RTT".to_string(), format::millis(latency).normal()));
    }
    details
}

/// PTR names for the live hosts, through one reverse scan.
async fn lookup_names(engine: &Engine, alive: &[&ScanEntry], settings: &ScanSettings) -> HashMap<IpAddr, String> {
    let list = alive
        .iter()
        .map(|entry| entry.target.addr.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let reverse = ScanSettings {
        systemic_threshold: 0,
        ..settings.clone()
    };

    let report = match engine.start_scan(&ScanSpec::new(list, None), ScanKind::ReverseDns, &reverse).await {
        Ok(handle) => handle.wait().await,
        Err(e) => Err(e),
    };
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            warn!("reverse lookups failed: {e}");
            return HashMap::new();
        }
    };

    report
        .entries
        .iter()
        .filter_map(|entry| {
            let name = format::records(&entry.outcome).first()?.value.trim_end_matches('.').to_string();
            Some((entry.target.addr, name))
        })
        .collect()
}
