use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use netprobe_common::config::{PingSettings, TraceSettings};
use netprobe_common::probe::ProbeOutcome;
use netprobe_common::report::{PingVerdict, TraceEnd};
use netprobe_core::{Engine, EngineError};

use crate::fakes::{RESOLVER, Route, Scripted};

fn trace_settings(max_hops: u8) -> TraceSettings {
    TraceSettings {
        max_hops,
        ..TraceSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn trace_stops_at_the_destination() {
    let engine = Engine::with_prober(Arc::new(Route { length: 6, rtt: Duration::from_millis(4) }), RESOLVER);
    let mut handle = engine.start_traceroute("10.9.9.9", trace_settings(30)).await.unwrap();

    let mut streamed = Vec::new();
    while let Some(hop) = handle.next_hop().await {
        streamed.push(hop);
    }
    let report = handle.wait().await.unwrap();

    assert_eq!(report.end, TraceEnd::DestinationReached);
    assert_eq!(report.hops.len(), 6);
    assert_eq!(report.hops, streamed);
    let last = report.hops.last().unwrap();
    assert!(last.terminal);
    assert_eq!(last.responder, Some("10.9.9.9".parse::<IpAddr>().unwrap()));
    assert_eq!(report.hops[0].responder, Some("10.0.1.1".parse::<IpAddr>().unwrap()));
    assert!(report.hops.iter().all(|hop| hop.rtts.len() == 3));
}

#[tokio::test(start_paused = true)]
async fn trace_gives_up_after_max_hops() {
    let engine = Engine::with_prober(Arc::new(Route { length: 50, rtt: Duration::from_millis(4) }), RESOLVER);
    let mut handle = engine.start_traceroute("10.9.9.9", trace_settings(5)).await.unwrap();
    let mut streamed = Vec::new();
    while let Some(hop) = handle.next_hop().await {
        streamed.push(hop);
    }
    let report = handle.wait().await.unwrap();

    assert_eq!(report.end, TraceEnd::MaxHopsExceeded);
    assert_eq!(report.hops.len(), 5);
    assert!(!report.reached());
    assert_eq!(report.hops, streamed);
    assert!(report.hops[4].terminal);
    assert!(report.hops[..4].iter().all(|hop| !hop.terminal));
}

#[tokio::test(start_paused = true)]
async fn silent_route_ends_on_the_streak() {
    let prober = Scripted::new(Duration::from_millis(1), ProbeOutcome::Timeout);
    let engine = Engine::with_prober(Arc::new(prober), RESOLVER);
    let handle = engine.start_traceroute("10.9.9.9", trace_settings(30)).await.unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.end, TraceEnd::NoResponseStreak);
    assert_eq!(report.hops.len(), 3);
    assert!(report.hops.iter().all(|hop| hop.responder.is_none()));
    assert!(report.hops[2].terminal);
}

#[tokio::test]
async fn ipv6_trace_is_refused() {
    let engine = Engine::with_prober(Arc::new(Route { length: 1, rtt: Duration::ZERO }), RESOLVER);
    let result = engine.start_traceroute("2001:db8::1", trace_settings(30)).await;
    assert!(matches!(result, Err(EngineError::Unsupported(_))));
}

#[tokio::test(start_paused = true)]
async fn silent_host_is_declared_down() {
    let prober = Scripted::new(Duration::ZERO, ProbeOutcome::Timeout);
    let engine = Engine::with_prober(Arc::new(prober), RESOLVER);
    let settings = PingSettings {
        count: 10,
        ..PingSettings::default()
    };

    let mut handle = engine.start_ping("10.8.8.8", settings).await.unwrap();
    let mut streamed = 0;
    while handle.next_sample().await.is_some() {
        streamed += 1;
    }
    let report = handle.wait().await.unwrap();

    assert_eq!(report.verdict, PingVerdict::HostDown { after: 3 });
    assert_eq!(report.sent, 3);
    assert_eq!(report.received, 0);
    assert_eq!(report.samples.len(), 3);
    assert_eq!(streamed, 0);
}

#[tokio::test(start_paused = true)]
async fn answering_host_is_alive() {
    let prober = Scripted::new(Duration::from_millis(7), ProbeOutcome::success(Duration::from_millis(7)));
    let engine = Engine::with_prober(Arc::new(prober), RESOLVER);

    let handle = engine.start_ping("10.8.8.8", PingSettings::default()).await.unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.verdict, PingVerdict::Alive);
    assert_eq!(report.sent, 4);
    assert_eq!(report.loss_percent(), 0.0);
    assert_eq!(report.latency.map(|l| l.max), Some(Duration::from_millis(7)));
}
