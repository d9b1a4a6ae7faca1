use netprobe_common::SpecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was rejected before any probe ran.
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("network i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// A background job ended without producing its report.
    #[error("engine task failed: {0}")]
    Join(String),
}
