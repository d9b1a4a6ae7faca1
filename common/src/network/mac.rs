use pnet::util::MacAddr;

use crate::error::SpecError;

/// Parses `XX:XX:XX:XX:XX:XX` or `XX-XX-XX-XX-XX-XX` (case-insensitive).
pub fn parse_mac(s: &str) -> Result<MacAddr, SpecError> {
    let s = s.trim();
    let octets: Vec<&str> = s.split([':', '-']).collect();

    let separators_consistent = !(s.contains(':') && s.contains('-'));
    if octets.len() != 6 || !separators_consistent {
        return Err(SpecError::invalid(
            s,
            "MAC address must look like XX:XX:XX:XX:XX:XX or XX-XX-XX-XX-XX-XX",
        ));
    }

    let mut bytes = [0u8; 6];
    for (slot, octet) in bytes.iter_mut().zip(&octets) {
        if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SpecError::invalid(s, format!("'{octet}' is not a two-digit hex octet")));
        }
        *slot = u8::from_str_radix(octet, 16)
            .map_err(|_| SpecError::invalid(s, format!("'{octet}' is not hexadecimal")))?;
    }

    let [a, b, c, d, e, f] = bytes;
    Ok(MacAddr::new(a, b, c, d, e, f))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
