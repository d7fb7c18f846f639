use crate::context::FlowContext;
use crate::decoder::{check_available, Decoder, DecoderBuilder};
use crate::error::DecodeError;
use crate::mapping::{PortMapping, DEFAULT_PORT_MAPPING};
use crate::protocol::ProtocolId;
use crate::stats::Aggregator;
use libpcap_tools::{Config, Frame};
use pnet_packet::tcp::TcpPacket;
use std::path::PathBuf;

/// Size of a TCP header without options
pub const TCP_MIN_HEADER_LEN: usize = 20;

/// Transport layer decoder for TCP
///
/// The next protocol comes from the port mapping file, which is read again
/// for every segment so it can be edited during a run.
pub struct TcpDecoder {
    port_mapping: PathBuf,
    header_len: usize,
    ports: Option<(u16, u16)>,
}

impl TcpDecoder {
    pub fn new<P: Into<PathBuf>>(port_mapping: P) -> Self {
        TcpDecoder {
            port_mapping: port_mapping.into(),
            header_len: 0,
            ports: None,
        }
    }
}

pub struct TcpDecoderBuilder;

impl DecoderBuilder for TcpDecoderBuilder {
    fn name(&self) -> &'static str {
        ProtocolId::TCP
    }

    fn build(&self, config: &Config) -> Box<dyn Decoder> {
        let path = config.get("port_mapping").unwrap_or(DEFAULT_PORT_MAPPING);
        Box::new(TcpDecoder::new(path))
    }
}

impl Decoder for TcpDecoder {
    fn name(&self) -> &'static str {
        ProtocolId::TCP
    }

    fn decode(
        &mut self,
        frame: &Frame,
        offset: usize,
        ctx: &mut FlowContext,
        stats: &mut Aggregator,
    ) -> Result<(), DecodeError> {
        self.ports = None;
        check_available("TCP", frame, offset, TCP_MIN_HEADER_LEN)?;
        let tcp = TcpPacket::new(&frame.data[offset..]).ok_or(DecodeError::Truncated {
            layer: "TCP",
            needed: TCP_MIN_HEADER_LEN,
            available: frame.len() - offset,
        })?;
        let src_port = tcp.get_source();
        let dst_port = tcp.get_destination();
        let header_len = tcp.get_data_offset() as usize * 4;
        if header_len < TCP_MIN_HEADER_LEN {
            return Err(DecodeError::InvalidHeaderLength {
                layer: "TCP",
                length: header_len,
            });
        }
        check_available("TCP", frame, offset, header_len)?;

        let payload = (frame.len() - offset - header_len) as u64;
        trace!("    tcp: {src_port} -> {dst_port}, payload {payload}");
        stats
            .tcp
            .record(frame.index, src_port, dst_port, payload, ctx.addresses());
        ctx.src_port = Some(src_port);
        ctx.dst_port = Some(dst_port);

        self.header_len = header_len;
        self.ports = Some((src_port, dst_port));
        Ok(())
    }

    fn consumed_len(&self) -> usize {
        self.header_len
    }

    fn next_protocol(&self) -> ProtocolId {
        let Some((src_port, dst_port)) = self.ports else {
            return ProtocolId::empty();
        };
        let mapping = match PortMapping::load(&self.port_mapping) {
            Ok(m) => m,
            Err(e) => {
                debug!("TCP port mapping {:?} not available: {e}", self.port_mapping);
                return ProtocolId::empty();
            }
        };
        mapping
            .lookup(src_port, dst_port)
            .cloned()
            .unwrap_or_default()
    }
}
