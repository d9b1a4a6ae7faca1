use colored::*;
use netprobe_common::config::TraceSettings;
use netprobe_common::report::{TraceEnd, TraceHop, TraceReport};
use netprobe_common::success;
use netprobe_core::Engine;
use tracing::warn;

use crate::commands::on_interrupt;
use crate::mprint;
use crate::terminal::format::{self, Detail};
use crate::terminal::{colors, print, progress};

pub async fn trace(engine: &Engine, destination: &str, settings: TraceSettings) -> anyhow::Result<()> {
    let max_hops = settings.max_hops;
    let mut handle = engine.start_traceroute(destination, settings).await?;
    print::aligned_line("Target", format::ip(&handle.destination()));
    print::aligned_line("Max hops", max_hops.to_string());
    mprint!();

    let spinner = progress::spinner();
    let token = handle.cancel_token();
    let guard = on_interrupt(move |_| token.cancel());

    while let Some(hop) = handle.next_hop().await {
        spinner.send_to_queue(format!("hop {} done", hop.ttl));
        mprint!(&hop_line(&hop));
    }

    drop(guard);
    spinner.finish_and_clear();
    let report = handle.wait().await?;
    trace_ends(&report);
    Ok(())
}

fn hop_line(hop: &TraceHop) -> String {
    let ttl = format!("{:>2}", hop.ttl).color(colors::ACCENT);
    let Some(responder) = hop.responder else {
        return format!("{ttl}  {}", "* * *".color(colors::SILENT));
    };

    let rtts = hop
        .rtts
        .iter()
        .map(|rtt| format::millis(*rtt))
        .collect::<Vec<_>>()
        .join("  ");
    let marker = if hop.terminal { " ◀".color(colors::OK) } else { "".normal() };
    let addr = format!("{:<16}", responder.to_string()).color(colors::IPV4_ADDR);
    format!("{ttl}  {addr} {}{marker}", rtts.color(colors::TEXT_DEFAULT))
}

fn trace_ends(report: &TraceReport) {
    mprint!();
    print::header("route summary");
    let answered = report.hops.iter().filter(|hop| hop.responder.is_some()).count();
    let mut details: Vec<Detail> = vec![
        ("Hops".to_string(), report.hops.len().to_string().normal()),
        ("Answered".to_string(), answered.to_string().normal()),
        ("Ended".to_string(), end_word(report.end)),
    ];
    if let Some(last) = report.hops.last().and_then(TraceHop::best_rtt) {
        details.push(("Last RTT".to_string(), format::millis(last).normal()));
    }
    print::tree_head(0, &report.destination.to_string());
    print::as_tree_one_level(details);

    match report.end {
        TraceEnd::DestinationReached => success!("reached {} in {} hops", report.destination, report.hops.len()),
        TraceEnd::Failed(kind) => warn!("probes could not be sent: {kind}"),
        _ => {}
    }

    print::fat_separator();
    print::centerln(&format!("Trace Complete in {}", format::seconds(report.elapsed)));
}

fn end_word(end: TraceEnd) -> ColoredString {
    match end {
        TraceEnd::DestinationReached => end.to_string().color(colors::OK),
        TraceEnd::Cancelled | TraceEnd::NoResponseStreak => end.to_string().color(colors::SILENT),
        _ => end.to_string().color(colors::FAILED),
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
    use std::time::Duration;

    #[test]
    fn silent_hops_show_stars() {
        colored::control::set_override(false);
        assert_eq!(hop_line(&TraceHop::silent(4)), " 4  * * *");
    }

    #[test]
    fn answered_hops_list_every_rtt() {
        colored::control::set_override(false);
        let hop = TraceHop {
            ttl: 12,
            responder: Some("10.1.1.1".parse().unwrap()),
            rtts: vec![Duration::from_millis(3), Duration::from_micros(4_300)],
            terminal: true,
        };
        let line = hop_line(&hop);
        assert!(line.starts_with("12  10.1.1.1 "));
        assert!(line.contains("3.0ms  4.3ms"));
        assert!(line.ends_with('◀'));
    }
}
