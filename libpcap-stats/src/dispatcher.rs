use crate::context::FlowContext;
use crate::protocol::ProtocolId;
use crate::registry::DecoderRegistry;
use crate::stats::Aggregator;
use libpcap_tools::{Error, Frame, FrameAnalyzer, Linktype};
use serde::Serialize;
use std::sync::Arc;
use tracing::{span, Level};

/// How the decoding chain of one frame ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainOutcome {
    /// A decoder returned a terminal next protocol
    Complete,
    /// The offset reached the end of the frame
    Exhausted,
    /// A decoder rejected its header
    Malformed,
    /// No decoder could be built for the next protocol
    Unresolved,
}

/// Per-run dispatch counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchCounters {
    pub frames: u64,
    pub complete: u64,
    pub exhausted: u64,
    pub malformed: u64,
    pub unresolved: u64,
}

impl DispatchCounters {
    pub fn add(&mut self, outcome: ChainOutcome) {
        self.frames += 1;
        match outcome {
            ChainOutcome::Complete => self.complete += 1,
            ChainOutcome::Exhausted => self.exhausted += 1,
            ChainOutcome::Malformed => self.malformed += 1,
            ChainOutcome::Unresolved => self.unresolved += 1,
        }
    }

    pub fn merge(&mut self, other: &DispatchCounters) {
        self.frames += other.frames;
        self.complete += other.complete;
        self.exhausted += other.exhausted;
        self.malformed += other.malformed;
        self.unresolved += other.unresolved;
    }
}

/// Common interface of the sequential and threaded dispatchers
pub trait StatsAnalyzer: FrameAnalyzer {
    fn registry(&self) -> &DecoderRegistry;
    fn stats(&self) -> &Aggregator;
    fn counters(&self) -> DispatchCounters;
}

/// First decoder of the chain for a link type
///
/// Raw IPv4 captures skip the link layer.
pub fn first_protocol(link_type: Linktype) -> ProtocolId {
    match link_type {
        Linktype::RAW | Linktype::IPV4 => ProtocolId::from(ProtocolId::IP),
        _ => ProtocolId::from(ProtocolId::ETHERNET),
    }
}

/// Decode one frame, layer by layer
///
/// Statistics recorded by a layer are kept even if a later layer fails.
pub fn decode_chain(
    registry: &DecoderRegistry,
    frame: &Frame,
    stats: &mut Aggregator,
) -> ChainOutcome {
    let span = span!(Level::DEBUG, "frame", index = frame.index);
    let _enter = span.enter();
    let mut offset = 0;
    let mut protocol = first_protocol(frame.link_type);
    let mut ctx = FlowContext::default();
    loop {
        if protocol.is_terminal() {
            return ChainOutcome::Complete;
        }
        let mut decoder = match registry.resolve(&protocol) {
            Ok(d) => d,
            Err(e) => {
                debug!("frame {}: {}", frame.index, e);
                return ChainOutcome::Unresolved;
            }
        };
        if offset >= frame.len() {
            trace!("frame {}: no data left for {}", frame.index, protocol);
            return ChainOutcome::Exhausted;
        }
        if let Err(e) = decoder.decode(frame, offset, &mut ctx, stats) {
            debug!("frame {}: {}", frame.index, e);
            return ChainOutcome::Malformed;
        }
        protocol = decoder.next_protocol();
        offset += decoder.consumed_len();
    }
}

/// Sequential chain dispatcher
///
/// Frames are decoded one at a time, in capture order.
pub struct Dispatcher {
    registry: Arc<DecoderRegistry>,
    stats: Aggregator,
    counters: DispatchCounters,
}

impl Dispatcher {
    pub fn new(registry: Arc<DecoderRegistry>) -> Self {
        Dispatcher {
            registry,
            stats: Aggregator::new(),
            counters: DispatchCounters::default(),
        }
    }

    pub fn dispatch(&mut self, frame: &Frame) -> ChainOutcome {
        let outcome = decode_chain(&self.registry, frame, &mut self.stats);
        self.counters.add(outcome);
        outcome
    }

    pub fn into_stats(self) -> Aggregator {
        self.stats
    }
}

impl FrameAnalyzer for Dispatcher {
    fn handle_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        self.dispatch(frame);
        Ok(())
    }

    fn teardown(&mut self) {
        info!("dispatch done: {:?}", self.counters);
    }
}

impl StatsAnalyzer for Dispatcher {
    fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    fn stats(&self) -> &Aggregator {
        &self.stats
    }

    fn counters(&self) -> DispatchCounters {
        self.counters
    }
}
