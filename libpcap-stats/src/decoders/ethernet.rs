use crate::context::FlowContext;
use crate::decoder::{check_available, Decoder};
use crate::default_decoder_builder;
use crate::error::DecodeError;
use crate::protocol::ProtocolId;
use crate::stats::Aggregator;
use libpcap_tools::Frame;
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};

/// Ethernet II header: destination, source, ethertype
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Link layer decoder
///
/// Only IPv4 payloads continue the chain.
#[derive(Default)]
pub struct EthernetDecoder {
    next: ProtocolId,
}

default_decoder_builder!(EthernetDecoder, EthernetDecoderBuilder, ProtocolId::ETHERNET);

impl Decoder for EthernetDecoder {
    fn name(&self) -> &'static str {
        ProtocolId::ETHERNET
    }

    fn decode(
        &mut self,
        frame: &Frame,
        offset: usize,
        _ctx: &mut FlowContext,
        _stats: &mut Aggregator,
    ) -> Result<(), DecodeError> {
        self.next = ProtocolId::empty();
        check_available("Ethernet", frame, offset, ETHERNET_HEADER_LEN)?;
        let eth = EthernetPacket::new(&frame.data[offset..]).ok_or(DecodeError::Truncated {
            layer: "Ethernet",
            needed: ETHERNET_HEADER_LEN,
            available: frame.len() - offset,
        })?;
        let ethertype = eth.get_ethertype();
        trace!("    ethertype: 0x{:04x}", ethertype.0);
        if ethertype == EtherTypes::Ipv4 {
            self.next = ProtocolId::from(ProtocolId::IP);
        }
        Ok(())
    }

    fn consumed_len(&self) -> usize {
        ETHERNET_HEADER_LEN
    }

    fn next_protocol(&self) -> ProtocolId {
        self.next.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libpcap_tools::Linktype;

    fn run(data: &[u8]) -> (Result<(), DecodeError>, EthernetDecoder) {
        let frame = Frame::new(1, Linktype::ETHERNET, data);
        let mut d = EthernetDecoder::default();
        let mut ctx = FlowContext::default();
        let mut stats = Aggregator::new();
        let res = d.decode(&frame, 0, &mut ctx, &mut stats);
        (res, d)
    }

    #[test]
    fn ethernet_ipv4() {
        let mut data = vec![0u8; 20];
        data[12] = 0x08;
        data[13] = 0x00;
        let (res, d) = run(&data);
        assert!(res.is_ok());
        assert_eq!(d.next_protocol(), "IP");
        assert_eq!(d.consumed_len(), 14);
    }

    #[test]
    fn ethernet_other_ethertype() {
        let mut data = vec![0u8; 20];
        // IPv6
        data[12] = 0x86;
        data[13] = 0xdd;
        let (res, d) = run(&data);
        assert!(res.is_ok());
        assert!(d.next_protocol().is_terminal());
    }

    #[test]
    fn ethernet_short_frame() {
        let (res, d) = run(&[0u8; 13]);
        assert!(matches!(res, Err(DecodeError::Truncated { needed: 14, available: 13, .. })));
        assert!(d.next_protocol().is_terminal());
    }
}
