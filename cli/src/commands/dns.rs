use std::time::Duration;

use colored::*;
use netprobe_common::probe::ProbeKind;
use netprobe_common::report::ScanEntry;
use netprobe_core::Engine;

use crate::commands::parse_record_types;
use crate::mprint;
use crate::terminal::format::{self, Detail};
use crate::terminal::{colors, print};

pub async fn dns(engine: &Engine, query: &str, types: &[String], timeout: Duration) -> anyhow::Result<()> {
    let records = parse_record_types(types)?;
    print::aligned_line("Resolver", engine.resolver().to_string());

    let report = engine.lookup(query, &records, timeout).await?;
    mprint!();
    print::header("dns records");

    let answered = report
        .entries
        .iter()
        .filter(|entry| !format::records(&entry.outcome).is_empty())
        .count();

    for (idx, entry) in report.entries.iter().enumerate() {
        let question = match &entry.kind {
            ProbeKind::DnsQuery(question) => question.to_string(),
            other => other.to_string(),
        };
        print::tree_head(idx, &question);
        print::as_tree_one_level(answer_details(entry));
    }

    if answered == 0 {
        print::no_results();
    }
    print::fat_separator();
    print::centerln(&format!(
        "Lookup Complete: {} in {}",
        format!("{answered} of {} answered", report.entries.len()).bold().green(),
        format::seconds(report.elapsed)
    ));
    Ok(())
}

fn answer_details(entry: &ScanEntry) -> Vec<Detail> {
    let records = format::records(&entry.outcome);
    if records.is_empty() {
        let word = if entry.outcome.is_success() {
            "no records".color(colors::SILENT)
        } else {
            format::outcome(&entry.outcome)
        };
        return vec![("Answer".to_string(), word)];
    }
    records.iter().map(format::record_to_detail).collect()
}
