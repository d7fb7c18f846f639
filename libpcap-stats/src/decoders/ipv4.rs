use crate::context::FlowContext;
use crate::decoder::{check_available, Decoder};
use crate::default_decoder_builder;
use crate::error::DecodeError;
use crate::protocol::ProtocolId;
use crate::stats::Aggregator;
use libpcap_tools::Frame;
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;

/// Size of an IPv4 header without options
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Network layer decoder (IPv4 only)
#[derive(Default)]
pub struct Ipv4Decoder {
    header_len: usize,
    next: ProtocolId,
}

default_decoder_builder!(Ipv4Decoder, Ipv4DecoderBuilder, ProtocolId::IP);

impl Decoder for Ipv4Decoder {
    fn name(&self) -> &'static str {
        ProtocolId::IP
    }

    fn decode(
        &mut self,
        frame: &Frame,
        offset: usize,
        ctx: &mut FlowContext,
        stats: &mut Aggregator,
    ) -> Result<(), DecodeError> {
        self.next = ProtocolId::empty();
        check_available("IP", frame, offset, IPV4_MIN_HEADER_LEN)?;
        let available = frame.len() - offset;
        let ipv4 = Ipv4Packet::new(&frame.data[offset..]).ok_or(DecodeError::Truncated {
            layer: "IP",
            needed: IPV4_MIN_HEADER_LEN,
            available,
        })?;

        let version = ipv4.get_version();
        if version != 4 {
            return Err(DecodeError::InvalidVersion(version));
        }
        let ihl = ipv4.get_header_length() as usize;
        let header_len = ihl * 4;
        if ihl < 5 || header_len > available {
            return Err(DecodeError::InvalidHeaderLength {
                layer: "IP",
                length: header_len,
            });
        }
        let total_length = ipv4.get_total_length() as usize;
        if total_length < header_len || total_length > available {
            return Err(DecodeError::InvalidTotalLength {
                total_length,
                header_length: header_len,
                available,
            });
        }

        let src = ipv4.get_source();
        let dst = ipv4.get_destination();
        let payload = (total_length - header_len) as u64;
        trace!("    ipv4: {src} -> {dst}, payload {payload}");
        stats.ip.record(src, dst, payload, total_length as u64);
        ctx.src = Some(src);
        ctx.dst = Some(dst);

        self.header_len = header_len;
        self.next = if ipv4.get_next_level_protocol() == IpNextHeaderProtocols::Tcp {
            ProtocolId::from(ProtocolId::TCP)
        } else {
            ProtocolId::from(ProtocolId::UDP)
        };
        Ok(())
    }

    fn consumed_len(&self) -> usize {
        self.header_len
    }

    fn next_protocol(&self) -> ProtocolId {
        self.next.clone()
    }
}
