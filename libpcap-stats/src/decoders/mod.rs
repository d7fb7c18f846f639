//! Built-in decoders

mod ethernet;
mod ipv4;
mod tcp;
mod udp;

pub use ethernet::*;
pub use ipv4::*;
pub use tcp::*;
pub use udp::*;

use crate::decoder::DecoderBuilder;

/// Role names accepted for the built-in identifiers
pub const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("Link", "Ethernet"),
    ("Network", "IP"),
    ("Transport-TCP", "TCP"),
    ("Transport-UDP", "UDP"),
];

/// Builders of all built-in decoders
pub fn builtin_builders() -> Vec<Box<dyn DecoderBuilder>> {
    vec![
        Box::new(EthernetDecoderBuilder),
        Box::new(Ipv4DecoderBuilder),
        Box::new(TcpDecoderBuilder),
        Box::new(UdpDecoderBuilder),
    ]
}
