//! Logging shorthands shared by every crate in the workspace.
//!
//! All output goes through `tracing`; the CLI formatter decides how each
//! target is rendered.

/// Target used for positive, user-facing confirmations.
pub const SUCCESS_TARGET: &str = "netprobe::success";

/// Target used for raw, pre-formatted terminal lines.
pub const PRINT_TARGET: &str = "netprobe::print";

#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        ::tracing::info!(target: "netprobe::success", $($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        ::tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}
