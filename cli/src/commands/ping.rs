use colored::*;
use netprobe_common::config::PingSettings;
use netprobe_common::probe::{Metadata, ProbeOutcome};
use netprobe_common::report::{PingReport, PingSample, PingVerdict};
use netprobe_core::Engine;
use tracing::warn;

use crate::commands::on_interrupt;
use crate::mprint;
use crate::terminal::format::{self, Detail};
use crate::terminal::{colors, print};

pub async fn ping(engine: &Engine, target: &str, settings: PingSettings) -> anyhow::Result<()> {
    let mut handle = engine.start_ping(target, settings).await?;
    let target = handle.target();
    print::aligned_line("Target", format::ip(&target));
    mprint!();

    let token = handle.cancel_token();
    let guard = on_interrupt(move |_| token.cancel());
    while let Some(sample) = handle.next_sample().await {
        mprint!(&sample_line(&sample));
    }
    drop(guard);

    let report = handle.wait().await?;
    ping_ends(&report);
    Ok(())
}

fn sample_line(sample: &PingSample) -> String {
    let seq = format!("seq={}", sample.seq).color(colors::ACCENT);
    match &sample.outcome {
        ProbeOutcome::Success { latency, meta } => {
            let ttl = match meta {
                Metadata::Echo { ttl: Some(ttl), .. } => format!(" ttl={ttl}"),
                _ => String::new(),
            };
            format!("{seq} time={}{ttl}", format::millis(*latency).color(colors::OK))
        }
        other => format!("{seq} {}", format::outcome(other)),
    }
}

fn ping_ends(report: &PingReport) {
    mprint!();
    print::header("ping statistics");
    print::tree_head(0, &report.target.to_string());

    let mut details: Vec<Detail> = vec![
        ("Sent".to_string(), report.sent.to_string().normal()),
        ("Received".to_string(), report.received.to_string().normal()),
        ("Loss".to_string(), format!("{:.1}%", report.loss_percent()).normal()),
    ];
    if let Some(latency) = &report.latency {
        details.push(("RTT".to_string(), latency.to_string().normal()));
    }
    details.push(("Verdict".to_string(), verdict_word(report.verdict)));
    print::as_tree_one_level(details);

    if let PingVerdict::HostDown { after } = report.verdict {
        warn!("{} stopped answering after {after} requests in a row", report.target);
    }

    print::fat_separator();
    print::centerln(&format!("Ping Complete in {}", format::seconds(report.elapsed)));
}

fn verdict_word(verdict: PingVerdict) -> ColoredString {
    match verdict {
        PingVerdict::Alive => verdict.to_string().color(colors::OK),
        PingVerdict::Partial => verdict.to_string().color(colors::SILENT),
        _ => verdict.to_string().color(colors::FAILED),
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
