//! Engine settings.
//!
//! Plain values with sensible defaults. The front end fills them from its own
//! arguments; nothing here is read from or written to disk.

use std::net::SocketAddr;
use std::time::Duration;

/// Upper bound on how many targets one expansion may produce.
pub const DEFAULT_MAX_TARGETS: u64 = 1 << 20;

/// Settings for one scan job.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Maximum number of probes in flight at any instant.
    pub concurrency: usize,
    /// Bound on a single probe attempt.
    pub timeout: Duration,
    /// Hard bound on the whole job.
    pub deadline: Duration,
    /// Extra time granted to in-flight probes once the deadline passes.
    pub grace: Duration,
    /// Additional attempts spent on probes that timed out.
    pub retries: u32,
    /// Number of leading outcomes inspected for a systemic failure. Zero disables the check.
    pub systemic_threshold: usize,
    /// Stop dispatching once a systemic failure is detected.
    pub halt_on_systemic: bool,
    /// Keep network and broadcast addresses when expanding CIDR blocks.
    pub include_bounds: bool,
    pub max_targets: u64,
    pub dns: DnsSettings,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            concurrency: 100,
            timeout: Duration::from_secs(1),
            deadline: Duration::from_secs(60),
            grace: Duration::from_millis(500),
            retries: 0,
            systemic_threshold: 5,
            halt_on_systemic: true,
            include_bounds: false,
            max_targets: DEFAULT_MAX_TARGETS,
            dns: DnsSettings::default(),
        }
    }
}

/// Settings for a traceroute.
#[derive(Debug, Clone)]
pub struct TraceSettings {
    pub max_hops: u8,
    pub per_hop_timeout: Duration,
    /// Probes sent per TTL, clamped to `1..=3`.
    pub probes_per_hop: u8,
    /// Consecutive silent hops tolerated before giving up.
    pub no_response_limit: u8,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            max_hops: 30,
            per_hop_timeout: Duration::from_secs(1),
            probes_per_hop: 3,
            no_response_limit: 3,
        }
    }
}

impl TraceSettings {
    pub fn probes(&self) -> u8 {
        self.probes_per_hop.clamp(1, 3)
    }
}

/// Settings for an echo series.
#[derive(Debug, Clone)]
pub struct PingSettings {
    /// Number of echo requests, `1..=1000`.
    pub count: u32,
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive timeouts after which the host is declared down.
    /// `None` reports every attempt instead.
    pub down_after: Option<u32>,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            count: 4,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
            down_after: Some(3),
        }
    }
}

/// Settings for DNS queries.
#[derive(Debug, Clone)]
pub struct DnsSettings {
    /// Resolver to query. `None` uses the system resolver.
    pub server: Option<SocketAddr>,
    pub timeout: Duration,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            server: None,
            timeout: Duration::from_secs(3),
        }
    }
}
