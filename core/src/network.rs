//! Real-network probe implementations, one module per protocol.

pub mod dns;
pub mod echo;
pub mod tcp;
pub mod trace;
pub mod transport;
