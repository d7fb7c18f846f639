use crate::context::FlowContext;
use crate::error::DecodeError;
use crate::protocol::ProtocolId;
use crate::stats::Aggregator;
use libpcap_tools::{Config, Frame};

/// One protocol layer decoder
///
/// A decoder instance is built for one step of one frame's chain: it keeps
/// the fields it just parsed (header length, ports, ...) until the dispatcher
/// asked for [`consumed_len`](Decoder::consumed_len) and
/// [`next_protocol`](Decoder::next_protocol), then it is dropped.
/// Everything meant to outlive the frame goes to the [`Aggregator`] (or, for
/// plugins, to the plugin's own tables).
pub trait Decoder: Send {
    fn name(&self) -> &'static str;

    /// Decode the layer starting at `offset` in `frame`
    ///
    /// Structural checks are done before any field is trusted. On error,
    /// neither `ctx` nor `stats` must have been modified, and
    /// `next_protocol` must return a terminal identifier.
    fn decode(
        &mut self,
        frame: &Frame,
        offset: usize,
        ctx: &mut FlowContext,
        stats: &mut Aggregator,
    ) -> Result<(), DecodeError>;

    /// Number of bytes of this layer, added to the offset for the next layer
    fn consumed_len(&self) -> usize;

    /// Identifier of the decoder for the next layer
    fn next_protocol(&self) -> ProtocolId;
}

/// Factory for one built-in decoder
pub trait DecoderBuilder: Sync + Send {
    /// Protocol identifier served by this builder
    fn name(&self) -> &'static str;
    fn build(&self, config: &Config) -> Box<dyn Decoder>;
}

/// Derives a decoder builder relying on the Decoder::default() function
#[macro_export]
macro_rules! default_decoder_builder {
    ($name:ident, $builder:ident, $proto:expr) => {
        pub struct $builder;

        impl $crate::DecoderBuilder for $builder {
            fn name(&self) -> &'static str {
                $proto
            }
            fn build(&self, _config: &$crate::Config) -> Box<dyn $crate::Decoder> {
                Box::new(<$name>::default())
            }
        }
    };
}

/// Check that `len` bytes are available at `offset`
#[inline]
pub(crate) fn check_available(
    layer: &'static str,
    frame: &Frame,
    offset: usize,
    needed: usize,
) -> Result<(), DecodeError> {
    let available = frame.len().saturating_sub(offset);
    if available < needed {
        Err(DecodeError::Truncated {
            layer,
            needed,
            available,
        })
    } else {
        Ok(())
    }
}
