#[macro_use]
extern crate log;

mod analyzer;
mod config;
mod engine;
mod error;
mod frame;

pub use analyzer::*;
pub use config::Config;
pub use engine::*;
pub use error::*;
pub use frame::*;

pub use pcap_parser::Linktype;
