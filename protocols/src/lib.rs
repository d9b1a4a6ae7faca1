//! Wire formats spoken by the probes: DNS queries and replies, ICMP error
//! quotations, and the Wake-on-LAN magic packet.

pub mod dns;
pub mod icmp;
pub mod wol;
