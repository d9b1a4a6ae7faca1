//! The concurrent probing engine.
//!
//! [`engine::Engine`] is the entry point. It expands host and port
//! specifications, runs probes under a bounded admission gate and an overall
//! deadline, and hands back ordered reports. Probes sit behind the
//! [`probe::Prober`] trait so the network can be swapped for a fake.

pub mod aggregator;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod gate;
pub mod network;
pub mod ping;
pub mod probe;
pub mod scheduler;
pub mod traceroute;
pub mod wol;

pub use engine::{Engine, ScanHandle, ScanKind, ScanSpec};
pub use error::EngineError;
pub use probe::Prober;
