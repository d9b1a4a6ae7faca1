use std::net::IpAddr;

use anyhow::Context;
use dns_parser::{Packet, RData, ResponseCode};
use pnet::packet::dns::{DnsClass, DnsQuery, DnsType, DnsTypes, MutableDnsPacket, Opcode, Retcode};

use netprobe_common::probe::{DnsQuestion, DnsRecord, RecordType};

pub const DNS_HDR_LEN: usize = 12;
pub const DNS_PORT: u16 = 53;

/// Response codes a probe cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    NoError,
    NxDomain,
    ServFail,
    Refused,
    Other(u8),
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub id: u16,
    pub rcode: Rcode,
    pub records: Vec<DnsRecord>,
}

/// Builds a recursive standard query for `question`.
pub fn build_query(id: u16, question: &DnsQuestion) -> anyhow::Result<Vec<u8>> {
    let query = DnsQuery {
        qname: encode_dns_name(&question.name)?,
        qtype: record_to_dns_type(question.record),
        qclass: DnsClass(1),
        payload: Vec::new(),
    };
    let q_fixed_len: usize = 4;
    let total: usize = DNS_HDR_LEN + query.qname.len() + q_fixed_len;
    let mut buffer: Vec<u8> = vec![0u8; total];

    {
        let mut dns: MutableDnsPacket =
            MutableDnsPacket::new(&mut buffer).context("creating dns header")?;
        dns.set_id(id);
        dns.set_is_response(0);
        dns.set_opcode(Opcode::StandardQuery);
        dns.set_is_authoriative(0);
        dns.set_is_truncated(0);
        dns.set_is_recursion_desirable(1);
        dns.set_is_recursion_available(0);
        dns.set_zero_reserved(0);
        dns.set_is_non_authenticated_data(0);
        dns.set_rcode(Retcode::NoError);
        dns.set_query_count(1);
        dns.set_response_count(0);
        dns.set_authority_rr_count(0);
        dns.set_additional_rr_count(0);
    }

    // The question section follows the fixed header.
    let mut cursor: usize = DNS_HDR_LEN;
    buffer[cursor..cursor + query.qname.len()].copy_from_slice(&query.qname);
    cursor += query.qname.len();
    buffer[cursor..cursor + 2].copy_from_slice(&query.qtype.0.to_be_bytes());
    cursor += 2;
    buffer[cursor..cursor + 2].copy_from_slice(&query.qclass.0.to_be_bytes());

    Ok(buffer)
}

/// Decodes a reply, rendering every answer record to text.
pub fn parse_response(payload: &[u8]) -> anyhow::Result<DnsAnswer> {
    let packet = Packet::parse(payload).context("failed to parse DNS reply")?;
    if packet.header.query {
        anyhow::bail!("expected a DNS reply, got a query");
    }

    let rcode = match packet.header.response_code {
        ResponseCode::NoError => Rcode::NoError,
        ResponseCode::NameError => Rcode::NxDomain,
        ResponseCode::ServerFailure => Rcode::ServFail,
        ResponseCode::Refused => Rcode::Refused,
        ResponseCode::FormatError => Rcode::Other(1),
        ResponseCode::NotImplemented => Rcode::Other(4),
        ResponseCode::Reserved(code) => Rcode::Other(code),
    };

    let records = packet
        .answers
        .iter()
        .filter_map(|answer| {
            let (record, value) = render_rdata(&answer.data)?;
            Some(DnsRecord {
                name: answer.name.to_string(),
                record,
                ttl: answer.ttl,
                value,
            })
        })
        .collect();

    Ok(DnsAnswer {
        id: packet.header.id,
        rcode,
        records,
    })
}

fn render_rdata(data: &RData) -> Option<(RecordType, String)> {
    let rendered = match data {
        RData::A(a) => (RecordType::A, a.0.to_string()),
        RData::AAAA(aaaa) => (RecordType::Aaaa, aaaa.0.to_string()),
        RData::CNAME(cname) => (RecordType::Cname, cname.0.to_string()),
        RData::NS(ns) => (RecordType::Ns, ns.0.to_string()),
        RData::PTR(ptr) => (RecordType::Ptr, ptr.0.to_string()),
        RData::MX(mx) => (RecordType::Mx, format!("{} {}", mx.preference, mx.exchange)),
        RData::TXT(txt) => {
            let text: String = txt
                .iter()
                .map(|part| String::from_utf8_lossy(part).into_owned())
                .collect();
            (RecordType::Txt, text)
        }
        RData::SOA(soa) => (
            RecordType::Soa,
            format!(
                "{} {} {} {} {} {} {}",
                soa.primary_ns,
                soa.mailbox,
                soa.serial,
                soa.refresh,
                soa.retry,
                soa.expire,
                soa.minimum_ttl
            ),
        ),
        _ => return None,
    };
    Some(rendered)
}

fn record_to_dns_type(record: RecordType) -> DnsType {
    match record {
        RecordType::A => DnsTypes::A,
        RecordType::Aaaa => DnsTypes::AAAA,
        RecordType::Cname => DnsTypes::CNAME,
        RecordType::Mx => DnsTypes::MX,
        RecordType::Ns => DnsTypes::NS,
        RecordType::Txt => DnsTypes::TXT,
        RecordType::Ptr => DnsTypes::PTR,
        RecordType::Soa => DnsTypes::SOA,
    }
}

fn encode_dns_name(name: &str) -> anyhow::Result<Vec<u8>> {
    let mut encoded: Vec<u8> = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        if label.len() > 63 {
            anyhow::bail!("label '{label}' is longer than 63 bytes");
        }
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    Ok(encoded)
}

/// First `nameserver` entry of a resolv.conf style file.
pub fn first_nameserver(resolv_conf: &str) -> Option<IpAddr> {
    resolv_conf
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .find_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                // Zone ids ("fe80::1%eth0") cannot be parsed into an IpAddr.
                (Some("nameserver"), Some(addr)) => addr.parse().ok(),
                _ => None,
            }
        })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    /// A reply to `query` carrying one A record, built by hand.
    fn a_reply(query: &[u8], rcode: u8, addr: Option<Ipv4Addr>) -> Vec<u8> {
        let mut reply = query.to_vec();
        reply[2] = 0x81; // QR + RD
        reply[3] = 0x80 | rcode; // RA + RCODE
        if let Some(addr) = addr {
            reply[7] = 1; // ANCOUNT
            reply.extend_from_slice(&[0xc0, 0x0c]); // pointer to the question name
            reply.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // A, IN
            reply.extend_from_slice(&300u32.to_be_bytes());
            reply.extend_from_slice(&[0x00, 0x04]);
            reply.extend_from_slice(&addr.octets());
        }
        reply
    }

    #[test]
    fn query_layout() {
        let question = DnsQuestion::new("example.com", RecordType::Aaaa);
        let packet = build_query(0xbeef, &question).unwrap();

        assert_eq!(&packet[0..2], &[0xbe, 0xef]);
        assert_eq!(packet[2] & 0x01, 0x01, "recursion desired");
        assert_eq!(&packet[4..6], &[0, 1], "one question");
        assert_eq!(&packet[12..25], b"\x07example\x03com\x00");
        assert_eq!(&packet[25..29], &[0, 28, 0, 1]);
        assert_eq!(packet.len(), 29);
    }

    #[test]
    fn parses_answers() {
        let question = DnsQuestion::new("example.com", RecordType::A);
        let query = build_query(7, &question).unwrap();
        let reply = a_reply(&query, 0, Some(Ipv4Addr::new(93, 184, 216, 34)));

        let answer = parse_response(&reply).unwrap();
        assert_eq!(answer.id, 7);
        assert_eq!(answer.rcode, Rcode::NoError);
        assert_eq!(answer.records.len(), 1);
        assert_eq!(answer.records[0].record, RecordType::A);
        assert_eq!(answer.records[0].value, "93.184.216.34");
        assert_eq!(answer.records[0].ttl, 300);
    }

    #[test]
    fn maps_failure_codes() {
        let question = DnsQuestion::new("nope.invalid", RecordType::A);
        let query = build_query(9, &question).unwrap();

        assert_eq!(parse_response(&a_reply(&query, 3, None)).unwrap().rcode, Rcode::NxDomain);
        assert_eq!(parse_response(&a_reply(&query, 2, None)).unwrap().rcode, Rcode::ServFail);
        assert_eq!(parse_response(&a_reply(&query, 5, None)).unwrap().rcode, Rcode::Refused);
        assert!(parse_response(&query).is_err(), "queries are not replies");
        assert!(parse_response(&[0u8; 5]).is_err());
    }

    #[test]
    fn reads_resolv_conf() {
        let conf = "# generated\nsearch lan\nnameserver fe80::1%eth0\nnameserver 192.168.1.1\n";
        assert_eq!(
            first_nameserver(conf),
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)))
        );
        assert_eq!(first_nameserver("search lan\n"), None);
    }

    #[test]
    fn rejects_oversized_labels() {
        let question = DnsQuestion::new("a".repeat(64), RecordType::A);
        assert!(build_query(1, &question).is_err());
    }
}
