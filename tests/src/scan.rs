use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use netprobe_common::config::ScanSettings;
use netprobe_common::probe::ProbeOutcome;
use netprobe_common::report::HaltReason;
use netprobe_common::SpecError;
use netprobe_core::engine::plan_scan;
use netprobe_core::scheduler::ScanJob;
use netprobe_core::{Engine, EngineError, ScanKind, ScanSpec};

use crate::fakes::{RESOLVER, Scripted, target};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn settings(concurrency: usize, deadline: Duration) -> ScanSettings {
    ScanSettings {
        concurrency,
        deadline,
        ..ScanSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn two_open_ports_in_a_slash_24() {
    let prober = Arc::new(
        Scripted::new(ms(20), ProbeOutcome::RefusedOrClosed)
            .answer(target("192.168.1.10", 22), ProbeOutcome::success(ms(3)))
            .answer(target("192.168.1.10", 80), ProbeOutcome::success(ms(4))),
    );
    let engine = Engine::with_prober(prober.clone(), RESOLVER);
    let spec = ScanSpec::new("192.168.1.0/24", Some("22,80,443"));

    let handle = engine
        .start_scan(&spec, ScanKind::TcpConnect, &settings(50, Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(handle.total(), 762);
    let report = handle.wait().await.unwrap();

    assert_eq!(report.halt, HaltReason::Completed);
    assert_eq!(report.entries.len(), 762);
    assert_eq!(report.summary.totals.success, 2);
    assert_eq!(report.summary.totals.refused_or_closed, 760);
    assert_eq!(report.summary.reachable_hosts, 1);
    assert!(prober.peak() <= 50);

    // Host-major expansion order, whatever the completion order was.
    assert_eq!(report.entries[0].target, target("192.168.1.1", 22));
    assert_eq!(report.entries[1].target, target("192.168.1.1", 80));
    assert_eq!(report.entries[2].target, target("192.168.1.1", 443));
    assert!(report.entries.iter().enumerate().all(|(i, e)| e.index == i));

    let open: Vec<_> = report.successes().map(|e| e.target).collect();
    assert_eq!(open, vec![target("192.168.1.10", 22), target("192.168.1.10", 80)]);
}

#[tokio::test(start_paused = true)]
async fn in_flight_probes_never_exceed_the_limit() {
    let prober = Arc::new(Scripted::new(ms(10), ProbeOutcome::Timeout));
    let engine = Engine::with_prober(prober.clone(), RESOLVER);
    let spec = ScanSpec::new("10.1.0.1-100", Some("1-3"));

    let handle = engine
        .start_scan(&spec, ScanKind::TcpConnect, &settings(7, Duration::from_secs(60)))
        .await
        .unwrap();
    let gate = Arc::clone(handle.gate());
    let report = handle.wait().await.unwrap();

    assert_eq!(report.entries.len(), 300);
    assert_eq!(prober.calls(), 300);
    assert_eq!(prober.peak(), 7);
    assert_eq!(gate.peak(), 7);
    assert_eq!(gate.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_a_slow_scan() {
    let prober = Arc::new(Scripted::new(Duration::from_secs(10), ProbeOutcome::success(ms(1))));
    let engine = Engine::with_prober(prober, RESOLVER);
    let spec = ScanSpec::new("10.2.0.1-50", Some("80"));
    let settings = ScanSettings {
        timeout: Duration::from_secs(30),
        ..settings(10, Duration::from_secs(2))
    };

    let handle = engine.start_scan(&spec, ScanKind::TcpConnect, &settings).await.unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.halt, HaltReason::DeadlineExceeded);
    assert_eq!(report.entries.len(), 50);
    assert_eq!(report.summary.totals.timeout, 50);
    assert!(report.elapsed <= Duration::from_secs(2) + settings.grace + ms(50));
}

#[tokio::test(start_paused = true)]
async fn graceful_cancel_keeps_every_slot() {
    let prober = Arc::new(Scripted::new(Duration::from_secs(1), ProbeOutcome::RefusedOrClosed));
    let engine = Engine::with_prober(prober.clone(), RESOLVER);
    let spec = ScanSpec::new("10.3.0.1-250", Some("21,22,23,25"));
    let settings = ScanSettings {
        timeout: Duration::from_secs(5),
        ..settings(10, Duration::from_secs(60))
    };

    let handle = engine.start_scan(&spec, ScanKind::TcpConnect, &settings).await.unwrap();
    assert_eq!(handle.total(), 1000);
    tokio::time::sleep(ms(100)).await;
    handle.cancel(false);
    let report = handle.wait().await.unwrap();

    assert_eq!(report.halt, HaltReason::Cancelled { forced: false });
    assert_eq!(report.entries.len(), 1000);
    let definite = report.entries.iter().filter(|e| !e.outcome.is_timeout()).count();
    assert!(definite <= 10, "{definite} definite outcomes");
    assert!(prober.calls() <= 10);
}

#[tokio::test(start_paused = true)]
async fn forced_cancel_aborts_in_flight_probes() {
    let prober = Arc::new(Scripted::new(Duration::from_secs(1), ProbeOutcome::RefusedOrClosed));
    let engine = Engine::with_prober(prober, RESOLVER);
    let spec = ScanSpec::new("10.3.0.1-250", Some("21,22,23,25"));

    let handle = engine
        .start_scan(&spec, ScanKind::TcpConnect, &settings(10, Duration::from_secs(60)))
        .await
        .unwrap();
    tokio::time::sleep(ms(100)).await;
    handle.cancel(true);
    let report = handle.wait().await.unwrap();

    assert_eq!(report.halt, HaltReason::Cancelled { forced: true });
    assert_eq!(report.entries.len(), 1000);
    assert_eq!(report.summary.totals.timeout, 1000);
    assert!(report.elapsed < ms(200));
}

#[tokio::test(start_paused = true)]
async fn repeated_jobs_give_the_same_entries() {
    let prober = Arc::new(
        Scripted::new(ms(5), ProbeOutcome::RefusedOrClosed)
            .answer(target("10.4.0.3", 8080), ProbeOutcome::success(ms(2))),
    );
    let engine = Engine::with_prober(prober, RESOLVER);
    let spec = ScanSpec::new("10.4.0.0/29", Some("8080,8443"));
    let settings = settings(4, Duration::from_secs(10));

    let requests = plan_scan(&spec, ScanKind::TcpConnect, &settings, &HashMap::new()).unwrap();
    assert_eq!(requests.len(), 12);

    let first = engine.start_job(ScanJob::new(requests.clone(), &settings)).wait().await.unwrap();
    let second = engine.start_job(ScanJob::new(requests, &settings)).wait().await.unwrap();
    assert_eq!(first.entries, second.entries);
    assert_eq!(first.summary, second.summary);
}

#[tokio::test]
async fn invalid_prefix_is_rejected_before_probing() {
    let prober = Arc::new(Scripted::new(ms(1), ProbeOutcome::RefusedOrClosed));
    let engine = Engine::with_prober(prober.clone(), RESOLVER);
    let spec = ScanSpec::new("10.0.0.0/99", Some("22"));

    let result = engine
        .start_scan(&spec, ScanKind::TcpConnect, &ScanSettings::default())
        .await;

    assert!(matches!(result, Err(EngineError::Spec(SpecError::InvalidSpec { .. }))));
    assert_eq!(prober.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_hosts_collapse_to_one_slot() {
    let prober = Arc::new(Scripted::new(ms(5), ProbeOutcome::RefusedOrClosed));
    let engine = Engine::with_prober(prober.clone(), RESOLVER);
    let spec = ScanSpec::new("10.5.0.1,10.5.0.2,10.5.0.1", Some("22"));

    let handle = engine
        .start_scan(&spec, ScanKind::TcpConnect, &ScanSettings::default())
        .await
        .unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.submitted, 3);
    assert_eq!(report.collapsed_duplicates, 1);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(prober.calls(), 2);
}
