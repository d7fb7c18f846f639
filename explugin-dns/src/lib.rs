//! Example of libpcap-stats decoder plugin, loaded at runtime
//!
//! Build this crate, then map it in the protocol mapping file:
//!
//! ```text
//! DNS=target/release/libexplugin_dns.so
//! ```
//!
//! Only the DNS header is decoded.
//!
//! The plugin is linked with its own copy of `log`, and no logger is
//! installed in it: its log messages are discarded. Report errors are
//! printed on stderr.

#[macro_use]
extern crate log;

use lazy_static::lazy_static;
use libpcap_stats::{
    declare_decoder_plugin, Aggregator, DecodeError, Decoder, FlowContext, Frame, ProtocolId,
};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

pub const DNS_HEADER_LEN: usize = 12;

/// DNS message counters, shared by all decoder instances
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsStats {
    pub messages: u64,
    pub queries: u64,
    pub responses: u64,
    pub questions: u64,
    pub answers: u64,
    /// Responses per response code
    pub rcodes: BTreeMap<u8, u64>,
}

impl DnsStats {
    fn record(&mut self, header: &DnsHeader) {
        self.messages += 1;
        self.questions += u64::from(header.qdcount);
        self.answers += u64::from(header.ancount);
        if header.is_response() {
            self.responses += 1;
            *self.rcodes.entry(header.rcode()).or_default() += 1;
        } else {
            self.queries += 1;
        }
    }
}

lazy_static! {
    static ref DNS_STATS: Mutex<DnsStats> = Mutex::new(DnsStats::default());
}

/// Fixed part of a DNS message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsHeader {
    pub fn parse(i: &[u8]) -> Option<DnsHeader> {
        let b = i.get(..DNS_HEADER_LEN)?;
        let be16 = |o: usize| u16::from_be_bytes([b[o], b[o + 1]]);
        Some(DnsHeader {
            id: be16(0),
            flags: be16(2),
            qdcount: be16(4),
            ancount: be16(6),
            nscount: be16(8),
            arcount: be16(10),
        })
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags & 0x8000 != 0
    }

    #[inline]
    pub fn rcode(&self) -> u8 {
        (self.flags & 0x000f) as u8
    }
}

/// DNS header decoder
#[derive(Default)]
pub struct DnsDecoder {
    decoded: bool,
}

impl Decoder for DnsDecoder {
    fn name(&self) -> &'static str {
        ProtocolId::DNS
    }

    fn decode(
        &mut self,
        frame: &Frame,
        offset: usize,
        _ctx: &mut FlowContext,
        _stats: &mut Aggregator,
    ) -> Result<(), DecodeError> {
        self.decoded = false;
        let data = frame.data.get(offset..).unwrap_or_default();
        let header = DnsHeader::parse(data).ok_or(DecodeError::Truncated {
            layer: "DNS",
            needed: DNS_HEADER_LEN,
            available: data.len(),
        })?;
        trace!("    dns: id 0x{:04x} flags 0x{:04x}", header.id, header.flags);
        DNS_STATS
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(&header);
        self.decoded = true;
        Ok(())
    }

    fn consumed_len(&self) -> usize {
        if self.decoded {
            DNS_HEADER_LEN
        } else {
            0
        }
    }

    fn next_protocol(&self) -> ProtocolId {
        ProtocolId::terminal()
    }
}

/// Current counters
pub fn dns_stats() -> DnsStats {
    DNS_STATS.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Write the summary to `<base>/output-dns-csv-files/dns-summary.csv`
pub fn write_summary(base: &Path, stats: &DnsStats) -> Result<(), csv::Error> {
    let dir = base.join("output-dns-csv-files");
    fs::create_dir_all(&dir)?;
    let file = File::create(dir.join("dns-summary.csv"))?;
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record([
        "#messages",
        "queries",
        "responses",
        "questions",
        "answers",
        "noError",
        "nxDomain",
        "otherErrors",
    ])?;
    let rcode = |c: u8| stats.rcodes.get(&c).copied().unwrap_or(0);
    let other: u64 = stats
        .rcodes
        .iter()
        .filter(|(c, _)| **c != 0 && **c != 3)
        .map(|(_, n)| n)
        .sum();
    wtr.write_record(
        [
            stats.messages,
            stats.queries,
            stats.responses,
            stats.questions,
            stats.answers,
            rcode(0),
            rcode(3),
            other,
        ]
        .iter()
        .map(|v| v.to_string()),
    )?;
    wtr.flush()?;
    Ok(())
}

fn write_report() {
    let stats = dns_stats();
    if let Err(e) = write_summary(Path::new("."), &stats) {
        eprintln!("explugin-dns: DNS report failed: {}", e);
    }
}

declare_decoder_plugin!(DnsDecoder::default, write_report);

#[cfg(test)]
mod tests {
    use super::*;
    use libpcap_stats::Linktype;

    const QUERY: &[u8] = &[
        0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, b'w', b'w',
        b'w', 0x00, 0x00, 0x01, 0x00, 0x01,
    ];
    const NXDOMAIN: &[u8] = &[
        0x12, 0x34, 0x81, 0x83, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
    ];

    #[test]
    fn dns_header() {
        let h = DnsHeader::parse(NXDOMAIN).unwrap();
        assert!(h.is_response());
        assert_eq!(h.rcode(), 3);
        assert_eq!(h.qdcount, 1);
        assert_eq!(h.nscount, 1);
        assert_eq!(DnsHeader::parse(&NXDOMAIN[..11]), None);
    }

    #[test]
    fn dns_decoder() {
        let mut data = vec![0u8; 42];
        data.extend_from_slice(QUERY);
        let frame = Frame::new(1, Linktype::ETHERNET, &data);
        let mut d = DnsDecoder::default();
        let mut ctx = FlowContext::default();
        let mut agg = Aggregator::new();
        let before = dns_stats();
        assert!(d.decode(&frame, 42, &mut ctx, &mut agg).is_ok());
        assert_eq!(d.consumed_len(), DNS_HEADER_LEN);
        assert!(d.next_protocol().is_terminal());
        let after = dns_stats();
        assert!(after.queries > before.queries);
        assert_eq!(agg, Aggregator::new());

        // truncated header
        let res = d.decode(&frame, data.len() - 4, &mut ctx, &mut agg);
        assert!(matches!(res, Err(DecodeError::Truncated { needed: 12, available: 4, .. })));
        assert_eq!(d.consumed_len(), 0);
    }

    #[test]
    fn dns_summary_file() {
        let mut stats = DnsStats::default();
        stats.record(&DnsHeader::parse(QUERY).unwrap());
        stats.record(&DnsHeader::parse(NXDOMAIN).unwrap());
        let mut base = std::env::temp_dir();
        base.push(format!("explugin-dns-{}", std::process::id()));
        write_summary(&base, &stats).unwrap();
        let s = fs::read_to_string(base.join("output-dns-csv-files/dns-summary.csv")).unwrap();
        let mut lines = s.lines();
        lines.next();
        assert_eq!(lines.next(), Some("2,1,1,2,0,0,1,0"));
        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn dns_summary_unwritable() {
        let mut base = std::env::temp_dir();
        base.push(format!("explugin-dns-file-{}", std::process::id()));
        fs::write(&base, b"not a directory").unwrap();
        assert!(write_summary(&base, &DnsStats::default()).is_err());
        fs::remove_file(&base).unwrap();
    }
}
