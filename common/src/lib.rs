//! Shared model for the netprobe workspace.
//!
//! Everything that crosses a crate boundary lives here: probe targets and the
//! target expander, probe requests and their typed outcomes, the report types
//! handed back to callers, engine settings and the specification errors.

pub mod config;
pub mod error;
pub mod log;
pub mod network;
pub mod probe;
pub mod report;

pub use error::SpecError;
pub use network::target::Target;
pub use probe::{ErrorKind, Metadata, ProbeKind, ProbeOutcome, ProbeRequest};
