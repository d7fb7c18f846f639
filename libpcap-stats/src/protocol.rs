use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Name of the decoder to run next in a decoding chain
///
/// Identifiers are opaque: built-in decoders use [`ProtocolId::ETHERNET`],
/// [`ProtocolId::IP`], [`ProtocolId::TCP`] and [`ProtocolId::UDP`], plugins
/// use whatever name the protocol mapping file gives them.
///
/// The empty identifier and `"None"` both end the chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolId(String);

impl ProtocolId {
    pub const ETHERNET: &'static str = "Ethernet";
    pub const IP: &'static str = "IP";
    pub const TCP: &'static str = "TCP";
    pub const UDP: &'static str = "UDP";
    pub const DNS: &'static str = "DNS";
    /// Explicit terminal value
    pub const NONE: &'static str = "None";

    pub fn new<S: Into<String>>(s: S) -> Self {
        ProtocolId(s.into())
    }

    /// The empty identifier
    pub fn empty() -> Self {
        ProtocolId(String::new())
    }

    /// The explicit terminal identifier `"None"`
    pub fn terminal() -> Self {
        ProtocolId(Self::NONE.to_owned())
    }

    /// Returns true if this identifier ends a decoding chain
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.0.is_empty() || self.0 == Self::NONE
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProtocolId {
    fn from(s: &str) -> Self {
        ProtocolId(s.to_owned())
    }
}

impl From<String> for ProtocolId {
    fn from(s: String) -> Self {
        ProtocolId(s)
    }
}

impl AsRef<str> for ProtocolId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ProtocolId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ProtocolId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ProtocolId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
