use colored::*;
use netprobe_common::config::ScanSettings;
use netprobe_common::report::{ConnectivityReport, ConnectivityVerdict};
use netprobe_core::Engine;

use crate::mprint;
use crate::terminal::format::{self, Detail};
use crate::terminal::{colors, print, progress};

pub async fn check(engine: &Engine, settings: &ScanSettings, host: Option<&str>) -> anyhow::Result<()> {
    let spinner = progress::spinner();
    spinner.send_to_queue("checking well-known endpoints".to_string());
    let report = engine.check_connectivity(settings, host).await;
    spinner.finish_and_clear();

    check_ends(&report);
    Ok(())
}

fn check_ends(report: &ConnectivityReport) {
    mprint!();
    print::header("connectivity");
    let details: Vec<Detail> = report
        .checks
        .iter()
        .map(|check| (check.label.clone(), format::check(&check.outcome)))
        .collect();
    print::tree_head(0, "endpoints");
    print::as_tree_one_level(details);

    let verdict = match report.verdict {
        ConnectivityVerdict::Online => report.verdict.to_string().color(colors::OK),
        ConnectivityVerdict::Degraded => report.verdict.to_string().color(colors::SILENT),
        ConnectivityVerdict::Offline => report.verdict.to_string().color(colors::FAILED),
    };
    print::fat_separator();
    print::centerln(&format!(
        "Connectivity {}: {} of {} checks passed in {}",
        verdict.bold(),
        report.passed(),
        report.checks.len(),
        format::seconds(report.elapsed)
    ));
}
