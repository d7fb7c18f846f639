//! `key=value` mapping files
//!
//! Two files use this format: the protocol mapping (`protocol=library path`),
//! used to find decoder plugins, and the TCP port mapping
//! (`port=protocol`), used to pick the decoder after TCP.
//!
//! Lines without `=` are ignored. Keys and values are trimmed.

use crate::protocol::ProtocolId;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Default name of the protocol to library mapping file
pub const DEFAULT_DECODER_MAPPING: &str = "parser-mapping.dat";
/// Default name of the TCP port to protocol mapping file
pub const DEFAULT_PORT_MAPPING: &str = "tcp-port-mapping.dat";

/// Parse `key=value` lines, in file order
pub fn parse_pairs<R: BufRead>(reader: R) -> io::Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            warn!("mapping: ignoring line with empty key: {line:?}");
            continue;
        }
        pairs.push((key.to_owned(), value.trim().to_owned()));
    }
    Ok(pairs)
}

fn open<P: AsRef<Path>>(path: P) -> io::Result<BufReader<File>> {
    File::open(path.as_ref()).map(BufReader::new)
}

/// Load the protocol identifier to library path mapping
///
/// If an identifier appears more than once, the last line wins.
pub fn load_decoder_mapping<P: AsRef<Path>>(path: P) -> io::Result<HashMap<String, PathBuf>> {
    let pairs = parse_pairs(open(path)?)?;
    Ok(pairs
        .into_iter()
        .map(|(proto, lib)| (proto, PathBuf::from(lib)))
        .collect())
}

/// TCP port to protocol identifier mapping
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortMapping {
    entries: Vec<(u16, ProtocolId)>,
}

impl PortMapping {
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let entries = parse_pairs(reader)?
            .into_iter()
            .filter_map(|(port, proto)| match port.parse::<u16>() {
                Ok(port) => Some((port, ProtocolId::from(proto))),
                Err(_) => {
                    warn!("port mapping: invalid port {port:?}");
                    None
                }
            })
            .collect();
        Ok(PortMapping { entries })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::from_reader(open(path)?)
    }

    /// Return the protocol of the first entry matching either port
    pub fn lookup(&self, src_port: u16, dst_port: u16) -> Option<&ProtocolId> {
        self.entries
            .iter()
            .find(|(port, _)| *port == src_port || *port == dst_port)
            .map(|(_, proto)| proto)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
