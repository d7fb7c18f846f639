use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Structural validation failure in one decoder
///
/// Local to the frame: the chain stops, statistics recorded by earlier
/// layers are kept.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{layer}: truncated header ({needed} bytes needed, {available} available)")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("invalid IP version {0} (expected 4)")]
    InvalidVersion(u8),
    #[error("{layer}: invalid header length {length}")]
    InvalidHeaderLength { layer: &'static str, length: usize },
    #[error("invalid IP total length {total_length} (header {header_length}, available {available})")]
    InvalidTotalLength {
        total_length: usize,
        header_length: usize,
        available: usize,
    },
    #[error("UDP length {declared} exceeds available data {available}")]
    LengthMismatch { declared: usize, available: usize },
}

/// Failure to find or build a decoder for a protocol identifier
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no decoder or library mapping for protocol '{0}'")]
    NoMapping(String),
    #[error("failed to load library {path:?} for protocol '{protocol}': {source}")]
    Load {
        protocol: String,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("library for protocol '{protocol}' has no '{symbol}' entry point")]
    MissingEntryPoint {
        protocol: String,
        symbol: &'static str,
    },
    #[error("library for protocol '{protocol}' has ABI version {found}, expected {expected}")]
    AbiMismatch {
        protocol: String,
        found: u32,
        expected: u32,
    },
    #[error("construction entry point for protocol '{0}' returned no decoder")]
    NullDecoder(String),
    #[error("protocol '{0}' previously failed to load")]
    PreviouslyFailed(String),
}

/// Failure while writing reports
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
