use pnet::util::MacAddr;

/// Six bytes of `0xFF` followed by sixteen copies of the MAC.
pub const MAGIC_PACKET_LEN: usize = 6 + 16 * 6;
pub const DEFAULT_WOL_PORT: u16 = 9;

pub fn magic_packet(mac: MacAddr) -> [u8; MAGIC_PACKET_LEN] {
    let MacAddr(a, b, c, d, e, f) = mac;
    let octets: [u8; 6] = [a, b, c, d, e, f];
    let mut packet = [0xffu8; MAGIC_PACKET_LEN];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&octets);
    }
    packet
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
