//! Traffic statistics tables, written by decoders and read by the report sink
//!
//! All pair-valued keys are canonical: both directions of an address pair or
//! a port pair map to the same entry. Entries are created on first use and
//! never removed; counters only grow.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Order a pair so that both directions produce the same key
#[inline]
pub fn canonical_pair<T: Ord>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// In/out packet and byte counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrafficCounters {
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl TrafficCounters {
    #[inline]
    pub fn add_in(&mut self, bytes: u64) {
        self.packets_in += 1;
        self.bytes_in += bytes;
    }

    #[inline]
    pub fn add_out(&mut self, bytes: u64) {
        self.packets_out += 1;
        self.bytes_out += bytes;
    }

    pub fn merge(&mut self, other: &TrafficCounters) {
        self.packets_in += other.packets_in;
        self.packets_out += other.packets_out;
        self.bytes_in += other.bytes_in;
        self.bytes_out += other.bytes_out;
    }
}

/// Network layer statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpStats {
    pub total_packets: u64,
    /// Sum of IP payload sizes (total length minus header length)
    pub total_bytes: u64,
    /// Per-address counters: out as source, in as destination
    pub individual: BTreeMap<Ipv4Addr, TrafficCounters>,
    /// Per address pair, keyed by (lower, higher) address
    pub interactions: BTreeMap<(Ipv4Addr, Ipv4Addr), TrafficCounters>,
}

impl IpStats {
    /// Account one IPv4 packet
    ///
    /// `payload` is the IP payload size, `total_length` the IP total length.
    /// Interaction counters use the total length, and count the packet as
    /// out when the source is the lower address of the pair.
    pub fn record(&mut self, src: Ipv4Addr, dst: Ipv4Addr, payload: u64, total_length: u64) {
        self.total_packets += 1;
        self.total_bytes += payload;
        self.individual.entry(src).or_default().add_out(payload);
        self.individual.entry(dst).or_default().add_in(payload);
        let entry = self.interactions.entry(canonical_pair(src, dst)).or_default();
        if src < dst {
            entry.add_out(total_length);
        } else {
            entry.add_in(total_length);
        }
    }

    pub fn merge(&mut self, other: IpStats) {
        self.total_packets += other.total_packets;
        self.total_bytes += other.total_bytes;
        for (addr, c) in other.individual {
            self.individual.entry(addr).or_default().merge(&c);
        }
        for (pair, c) in other.interactions {
            self.interactions.entry(pair).or_default().merge(&c);
        }
    }
}

/// One transport connection, keyed by its canonical port pair
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionEntry {
    /// (source, destination) addresses of the most recent frame on this connection
    pub addresses: Option<(Ipv4Addr, Ipv4Addr)>,
    pub counters: TrafficCounters,
    last_frame: usize,
}

impl ConnectionEntry {
    fn annotate(&mut self, frame_index: usize, addresses: Option<(Ipv4Addr, Ipv4Addr)>) {
        if frame_index >= self.last_frame {
            self.last_frame = frame_index;
            self.addresses = addresses;
        }
    }
}

/// Transport layer statistics (one instance for TCP, one for UDP)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub total_packets: u64,
    /// Sum of transport payload sizes
    pub total_bytes: u64,
    /// Per-port counters: out as source port, in as destination port
    pub ports: BTreeMap<u16, TrafficCounters>,
    /// Per connection, keyed by (lower, higher) port
    pub connections: BTreeMap<(u16, u16), ConnectionEntry>,
}

impl TransportStats {
    /// Account one transport segment or datagram
    ///
    /// Connection counters do not follow the real direction of the packet:
    /// the side of the lower port number is always "out".
    pub fn record(
        &mut self,
        frame_index: usize,
        src_port: u16,
        dst_port: u16,
        payload: u64,
        addresses: Option<(Ipv4Addr, Ipv4Addr)>,
    ) {
        self.total_packets += 1;
        self.total_bytes += payload;
        self.ports.entry(src_port).or_default().add_out(payload);
        self.ports.entry(dst_port).or_default().add_in(payload);
        let entry = self
            .connections
            .entry(canonical_pair(src_port, dst_port))
            .or_default();
        entry.annotate(frame_index, addresses);
        if src_port < dst_port {
            entry.counters.add_out(payload);
        } else {
            entry.counters.add_in(payload);
        }
    }

    pub fn merge(&mut self, other: TransportStats) {
        self.total_packets += other.total_packets;
        self.total_bytes += other.total_bytes;
        for (port, c) in other.ports {
            self.ports.entry(port).or_default().merge(&c);
        }
        for (key, c) in other.connections {
            let entry = self.connections.entry(key).or_default();
            entry.counters.merge(&c.counters);
            entry.annotate(c.last_frame, c.addresses);
        }
    }
}

/// All statistics tables of a run
///
/// Owned by the dispatcher and passed to every decoder call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aggregator {
    pub ip: IpStats,
    pub tcp: TransportStats,
    pub udp: TransportStats,
}

impl Aggregator {
    pub fn new() -> Self {
        Aggregator::default()
    }

    /// Merge partial tables (for ex. from a worker thread) into this one
    pub fn merge(&mut self, other: Aggregator) {
        self.ip.merge(other.ip);
        self.tcp.merge(other.tcp);
        self.udp.merge(other.udp);
    }

    /// Export all tables as JSON
    pub fn to_json(&self) -> Value {
        let individual: Vec<_> = self
            .ip
            .individual
            .iter()
            .map(|(addr, c)| json!({ "address": addr.to_string(), "counters": c }))
            .collect();
        let interactions: Vec<_> = self
            .ip
            .interactions
            .iter()
            .map(|((a1, a2), c)| {
                json!({ "addr1": a1.to_string(), "addr2": a2.to_string(), "counters": c })
            })
            .collect();
        json!({
            "ip": {
                "packets": self.ip.total_packets,
                "bytes": self.ip.total_bytes,
                "individual": individual,
                "interactions": interactions,
            },
            "tcp": transport_json(&self.tcp),
            "udp": transport_json(&self.udp),
        })
    }
}

fn transport_json(stats: &TransportStats) -> Value {
    let ports: Vec<_> = stats
        .ports
        .iter()
        .map(|(port, c)| json!({ "port": port, "counters": c }))
        .collect();
    let connections: Vec<_> = stats
        .connections
        .iter()
        .map(|((p1, p2), e)| {
            let (a1, a2) = e
                .addresses
                .map_or((String::new(), String::new()), |(a, b)| {
                    (a.to_string(), b.to_string())
                });
            json!({
                "addr1": a1,
                "addr2": a2,
                "port1": p1,
                "port2": p2,
                "counters": e.counters,
            })
        })
        .collect();
    json!({
        "packets": stats.total_packets,
        "bytes": stats.total_bytes,
        "ports": ports,
        "connections": connections,
    })
}
