use crate::context::FlowContext;
use crate::decoder::{check_available, Decoder};
use crate::default_decoder_builder;
use crate::error::DecodeError;
use crate::protocol::ProtocolId;
use crate::stats::Aggregator;
use libpcap_tools::Frame;
use pnet_packet::udp::UdpPacket;

pub const UDP_HEADER_LEN: usize = 8;

const DNS_PORT: u16 = 53;

/// Transport layer decoder for UDP
#[derive(Default)]
pub struct UdpDecoder {
    next: ProtocolId,
}

default_decoder_builder!(UdpDecoder, UdpDecoderBuilder, ProtocolId::UDP);

impl Decoder for UdpDecoder {
    fn name(&self) -> &'static str {
        ProtocolId::UDP
    }

    fn decode(
        &mut self,
        frame: &Frame,
        offset: usize,
        ctx: &mut FlowContext,
        stats: &mut Aggregator,
    ) -> Result<(), DecodeError> {
        self.next = ProtocolId::terminal();
        check_available("UDP", frame, offset, UDP_HEADER_LEN)?;
        let available = frame.len() - offset;
        let udp = UdpPacket::new(&frame.data[offset..]).ok_or(DecodeError::Truncated {
            layer: "UDP",
            needed: UDP_HEADER_LEN,
            available,
        })?;
        let declared = udp.get_length() as usize;
        if declared < UDP_HEADER_LEN {
            return Err(DecodeError::InvalidHeaderLength {
                layer: "UDP",
                length: declared,
            });
        }
        if declared > available {
            return Err(DecodeError::LengthMismatch {
                declared,
                available,
            });
        }

        let src_port = udp.get_source();
        let dst_port = udp.get_destination();
        // trailing link-layer padding is not payload
        let payload = (declared - UDP_HEADER_LEN) as u64;
        trace!("    udp: {src_port} -> {dst_port}, payload {payload}");
        stats
            .udp
            .record(frame.index, src_port, dst_port, payload, ctx.addresses());
        ctx.src_port = Some(src_port);
        ctx.dst_port = Some(dst_port);

        if (src_port == DNS_PORT || dst_port == DNS_PORT) && payload > 0 {
            self.next = ProtocolId::from(ProtocolId::DNS);
        }
        Ok(())
    }

    fn consumed_len(&self) -> usize {
        UDP_HEADER_LEN
    }

    fn next_protocol(&self) -> ProtocolId {
        self.next.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libpcap_tools::Linktype;
    use std::net::Ipv4Addr;

    fn udp_datagram(src: u16, dst: u16, payload: usize) -> Vec<u8> {
        let mut v = vec![0u8; UDP_HEADER_LEN + payload];
        v[0..2].copy_from_slice(&src.to_be_bytes());
        v[2..4].copy_from_slice(&dst.to_be_bytes());
        v[4..6].copy_from_slice(&((UDP_HEADER_LEN + payload) as u16).to_be_bytes());
        v
    }

    fn run(data: &[u8], index: usize) -> (Result<(), DecodeError>, UdpDecoder, Aggregator) {
        let frame = Frame::new(index, Linktype::ETHERNET, data);
        let mut d = UdpDecoder::default();
        let mut ctx = FlowContext {
            src: Some(Ipv4Addr::new(192, 168, 1, 10)),
            dst: Some(Ipv4Addr::new(192, 168, 1, 1)),
            ..FlowContext::default()
        };
        let mut stats = Aggregator::new();
        let res = d.decode(&frame, 0, &mut ctx, &mut stats);
        (res, d, stats)
    }

    #[test]
    fn udp_dns_query() {
        let (res, d, stats) = run(&udp_datagram(51000, 53, 30), 1);
        assert!(res.is_ok());
        assert_eq!(d.next_protocol(), "DNS");
        assert_eq!(d.consumed_len(), 8);
        assert_eq!(stats.udp.total_packets, 1);
        assert_eq!(stats.udp.total_bytes, 30);
        let conn = &stats.udp.connections[&(53, 51000)];
        assert_eq!(conn.counters.packets_in, 1);
        assert_eq!(
            conn.addresses,
            Some((Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 1, 1)))
        );
    }

    #[test]
    fn udp_dns_empty_payload() {
        let (res, d, _) = run(&udp_datagram(51000, 53, 0), 1);
        assert!(res.is_ok());
        assert_eq!(d.next_protocol(), ProtocolId::NONE);
        assert!(d.next_protocol().is_terminal());
    }

    #[test]
    fn udp_other_port() {
        let (res, d, stats) = run(&udp_datagram(5000, 5001, 12), 1);
        assert!(res.is_ok());
        assert!(d.next_protocol().is_terminal());
        assert_eq!(stats.udp.connections[&(5000, 5001)].counters.packets_out, 1);
    }

    #[test]
    fn udp_length_exceeds_frame() {
        let mut data = udp_datagram(51000, 53, 4);
        data[4..6].copy_from_slice(&100u16.to_be_bytes());
        let (res, d, stats) = run(&data, 1);
        assert_eq!(
            res,
            Err(DecodeError::LengthMismatch {
                declared: 100,
                available: 12
            })
        );
        assert!(d.next_protocol().is_terminal());
        assert_eq!(stats, Aggregator::new());
    }

    #[test]
    fn udp_padded_frame() {
        // minimum-size Ethernet frame: 14 + 20 + 8 + 18 bytes of padding
        let mut data = udp_datagram(51000, 53, 0);
        data.resize(UDP_HEADER_LEN + 18, 0);
        let (res, d, stats) = run(&data, 1);
        assert!(res.is_ok());
        assert!(d.next_protocol().is_terminal());
        assert_eq!(stats.udp.total_bytes, 0);
        assert_eq!(stats.udp.connections[&(53, 51000)].counters.bytes_in, 0);
    }

    #[test]
    fn udp_length_below_header() {
        let mut data = udp_datagram(51000, 53, 4);
        data[4..6].copy_from_slice(&7u16.to_be_bytes());
        let (res, d, stats) = run(&data, 1);
        assert_eq!(
            res,
            Err(DecodeError::InvalidHeaderLength {
                layer: "UDP",
                length: 7
            })
        );
        assert!(d.next_protocol().is_terminal());
        assert_eq!(stats, Aggregator::new());
    }

    #[test]
    fn udp_short_header() {
        let (res, _, stats) = run(&[0u8; 7], 1);
        assert!(matches!(res, Err(DecodeError::Truncated { .. })));
        assert_eq!(stats.udp.total_packets, 0);
    }
}
