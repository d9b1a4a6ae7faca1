pub mod expander;
pub mod interface;
pub mod mac;
pub mod ports;
pub mod range;
pub mod target;
