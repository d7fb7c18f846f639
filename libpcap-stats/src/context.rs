use std::net::Ipv4Addr;

/// Per-frame state carried along a decoding chain
///
/// Each layer reads what earlier layers recorded and adds its own
/// identifiers. A new, empty context is used for every frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowContext {
    /// Source address, set by the network layer
    pub src: Option<Ipv4Addr>,
    /// Destination address, set by the network layer
    pub dst: Option<Ipv4Addr>,
    /// Source port, set by the transport layer
    pub src_port: Option<u16>,
    /// Destination port, set by the transport layer
    pub dst_port: Option<u16>,
}

impl FlowContext {
    /// Address pair recorded by the network layer, if any
    pub fn addresses(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        match (self.src, self.dst) {
            (Some(src), Some(dst)) => Some((src, dst)),
            _ => None,
        }
    }

    /// Port pair recorded by the transport layer, if any
    pub fn ports(&self) -> Option<(u16, u16)> {
        match (self.src_port, self.dst_port) {
            (Some(src), Some(dst)) => Some((src, dst)),
            _ => None,
        }
    }
}
