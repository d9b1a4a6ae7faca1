//! Port specifications.
//!
//! Accepts single ports (`80`), comma lists (`22,80,443`), inclusive ranges
//! (`8000-8100`) and the `common` keyword, in any combination. The result is
//! deduplicated and ascending.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::SpecError;

/// Ports probed when the user asks for "common" ports.
pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 143, 443, 445, 993, 995, 1433, 3306, 3389, 5432, 5900, 6379, 8080,
    8443, 8888, 27017,
];

/// Ports tried, in order, when checking whether a host is alive.
pub const DISCOVERY_PORTS: &[u16] = &[80, 443, 22, 445];

/// A parsed, ordered, duplicate-free port list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortList(Vec<u16>);

impl PortList {
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Self {
        let set: BTreeSet<u16> = ports.into_iter().collect();
        Self(set.into_iter().collect())
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for PortList {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ports: BTreeSet<u16> = BTreeSet::new();

        let tokens: Vec<&str> = s.split(',').map(str::trim).collect();
        for (position, &token) in tokens.iter().enumerate() {
            if token.is_empty() {
                return Err(empty_entry(&tokens, position));
            }
            if token.eq_ignore_ascii_case("common") {
                ports.extend(COMMON_PORTS);
                continue;
            }
            match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_port(start.trim(), token)?;
                    let end = parse_port(end.trim(), token)?;
                    if start > end {
                        return Err(SpecError::invalid(token, "range start is greater than its end"));
                    }
                    ports.extend(start..=end);
                }
                None => {
                    ports.insert(parse_port(token, token)?);
                }
            }
        }

        Ok(Self(ports.into_iter().collect()))
    }
}

/// Reports an empty entry together with its neighbours, so it can be found in a long list.
fn empty_entry(tokens: &[&str], position: usize) -> SpecError {
    let from = position.saturating_sub(1);
    let to = (position + 2).min(tokens.len());
    SpecError::invalid(
        tokens[from..to].join(","),
        format!("entry {} of the port list is empty", position + 1),
    )
}

fn parse_port(s: &str, token: &str) -> Result<u16, SpecError> {
    let port: u16 = s
        .parse()
        .map_err(|_| SpecError::invalid(token, "port must be a number between 1 and 65535"))?;
    if port == 0 {
        return Err(SpecError::invalid(token, "port 0 cannot be probed"));
    }
    Ok(port)
}

/// Well-known service name for a port, if any.
pub fn service_name(port: u16) -> Option<&'static str> {
    let name = match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        143 => "IMAP",
        443 => "HTTPS",
        445 => "SMB",
        993 => "IMAPS",
        995 => "POP3S",
        1433 => "MSSQL",
        3306 => "MySQL",
        3389 => "RDP",
        5432 => "PostgreSQL",
        5900 => "VNC",
        6379 => "Redis",
        8080 | 8888 => "HTTP-Alt",
        8443 => "HTTPS-Alt",
        27017 => "MongoDB",
        _ => return None,
    };
    Some(name)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
