use std::collections::BTreeMap;
use std::net::IpAddr;

use colored::*;
use netprobe_common::config::ScanSettings;
use netprobe_common::network::ports::service_name;
use netprobe_common::probe::Metadata;
use netprobe_common::report::{ScanEntry, ScanReport};
use netprobe_common::success;
use netprobe_core::{Engine, ScanKind, ScanSpec};

use crate::commands::drive;
use crate::mprint;
use crate::terminal::format::{self, Detail};
use crate::terminal::{colors, print};

/// Banners longer than this are cut when printed.
const BANNER_WIDTH: usize = 100;

pub async fn scan(
    engine: &Engine,
    hosts: &str,
    ports: &str,
    kind: ScanKind,
    all: bool,
    settings: &ScanSettings,
) -> anyhow::Result<()> {
    let spec = ScanSpec::new(hosts, Some(ports));
    let handle = engine.start_scan(&spec, kind, settings).await?;

    print::aligned_line("Targets", handle.total().to_string());
    print::aligned_line("Concurrency", handle.gate().limit().to_string());

    let report = drive(handle, |entry| {
        if entry.outcome.is_success() {
            success!("{} is open", port_label(entry).color(colors::PORT).bold());
        }
    })
    .await?;

    scan_ends(&report, all);
    Ok(())
}

fn port_label(entry: &ScanEntry) -> String {
    let port = entry.target.port.unwrap_or_default();
    match service_name(port) {
        Some(service) => format!("{} ({service})", entry.target),
        None => entry.target.to_string(),
    }
}

fn banner(entry: &ScanEntry) -> Option<String> {
    match entry.outcome.meta() {
        Some(Metadata::Banner(banner)) => Some(banner.chars().take(BANNER_WIDTH).collect()),
        _ => None,
    }
}

fn scan_ends(report: &ScanReport, all: bool) {
    let mut by_host: BTreeMap<IpAddr, Vec<&ScanEntry>> = BTreeMap::new();
    for entry in report.entries.iter().filter(|e| all || e.outcome.is_success()) {
        by_host.entry(entry.target.addr).or_default().push(entry);
    }

    mprint!();
    if by_host.is_empty() {
        print::header("no open ports");
        print::no_results();
    } else {
        print::header("scan results");
        for (idx, (addr, entries)) in by_host.iter().enumerate() {
            print_host_tree(idx, addr, entries);
            if idx + 1 != by_host.len() {
                mprint!();
            }
        }
    }

    print_summary(report);
}

fn print_host_tree(idx: usize, addr: &IpAddr, entries: &[&ScanEntry]) {
    print::tree_head(idx, &addr.to_string());
    let mut details: Vec<Detail> = Vec::with_capacity(entries.len());
    for entry in entries {
        let port = entry.target.port.unwrap_or_default();
        let key = match service_name(port) {
            Some(service) => format!("{port}/{service}"),
            None => port.to_string(),
        };
        details.push((key, format::outcome(&entry.outcome)));
        if let Some(banner) = banner(entry) {
            details.push(("Banner".to_string(), banner.color(colors::ACCENT)));
        }
    }
    print::as_tree_one_level(details);
}

fn print_summary(report: &ScanReport) {
    let totals = &report.summary.totals;
    mprint!();
    print::fat_separator();
    print::aligned_line("Open", totals.success.to_string().color(colors::OK));
    print::aligned_line("Closed", totals.refused_or_closed.to_string());
    print::aligned_line("Filtered", totals.timeout.to_string());
    if totals.unreachable > 0 {
        print::aligned_line("Unreachable", totals.unreachable.to_string());
    }
    if totals.error > 0 {
        print::aligned_line("Errors", totals.error.to_string().color(colors::FAILED));
    }
    if let Some(latency) = &report.summary.latency {
        print::aligned_line("Latency", latency.to_string());
    }
    print::aligned_line("Stopped", report.halt.to_string());

    let output = format!(
        "Scan Complete: {} open of {} probed in {}",
        totals.success.to_string().bold().green(),
        report.entries.len(),
        format::seconds(report.elapsed)
    );
    print::fat_separator();
    print::centerln(&output);
}
