//! Layered protocol decoding and traffic statistics
//!
//! Each frame of a capture goes through a chain of decoders (Ethernet, IPv4,
//! TCP or UDP, then optional plugin decoders loaded from shared libraries).
//! Decoders record traffic statistics in an [`Aggregator`], which is
//! written as CSV (and optionally JSON) reports at the end of the run.

#[macro_use]
extern crate log;

mod context;
mod decoder;
pub mod decoders;
mod dispatcher;
mod error;
pub mod mapping;
mod plugin;
mod protocol;
mod registry;
pub mod report;
mod stats;
mod threaded_dispatcher;

pub use context::*;
pub use decoder::{Decoder, DecoderBuilder};
pub use dispatcher::*;
pub use error::*;
pub use plugin::*;
pub use protocol::*;
pub use registry::*;
pub use report::ReportSink;
pub use stats::*;
pub use threaded_dispatcher::*;

pub use libpcap_tools::{Config, Frame, Linktype};
