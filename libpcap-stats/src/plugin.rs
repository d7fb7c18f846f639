//! Decoder plugins, loaded from shared libraries
//!
//! A plugin library exports:
//!
//! - `create_decoder`: returns a new decoder, as a `*mut Box<dyn Decoder>`
//! - `generate_report`: writes the plugin's own statistics
//! - `decoder_abi_version` (optional): must return [`DECODER_ABI_VERSION`]
//!
//! Use [`declare_decoder_plugin!`](crate::declare_decoder_plugin) to generate
//! these functions. Plugins must be built with the same compiler and the same
//! version of this crate as the host.

use crate::context::FlowContext;
use crate::decoder::Decoder;
use crate::error::{DecodeError, ResolveError};
use crate::protocol::ProtocolId;
use crate::stats::Aggregator;
use libloading::Library;
use libpcap_tools::Frame;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Version of the plugin interface
///
/// Increase it when the `Decoder` trait, `Frame`, `FlowContext` or
/// `Aggregator` change.
pub const DECODER_ABI_VERSION: u32 = 1;

pub type CreateDecoderFn = unsafe extern "C" fn() -> *mut Box<dyn Decoder>;
pub type GenerateReportFn = unsafe extern "C" fn();
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

const CREATE_DECODER: &str = "create_decoder";
const GENERATE_REPORT: &str = "generate_report";
const ABI_VERSION: &[u8] = b"decoder_abi_version\0";

/// Generate the entry points of a decoder plugin library
///
/// `$constructor` is a function returning a value implementing `Decoder`,
/// `$report` a function writing the plugin reports.
///
/// ```rust,ignore
/// declare_decoder_plugin!(MyDecoder::default, write_report);
/// ```
#[macro_export]
macro_rules! declare_decoder_plugin {
    ($constructor:path, $report:path) => {
        #[no_mangle]
        pub extern "C" fn decoder_abi_version() -> u32 {
            $crate::DECODER_ABI_VERSION
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn create_decoder() -> *mut Box<dyn $crate::Decoder> {
            let decoder: Box<dyn $crate::Decoder> = Box::new($constructor());
            Box::into_raw(Box::new(decoder))
        }

        #[no_mangle]
        pub extern "C" fn generate_report() {
            $report()
        }
    };
}

/// A loaded plugin library and its entry points
pub struct LoadedPlugin {
    protocol: String,
    path: PathBuf,
    create: CreateDecoderFn,
    report: GenerateReportFn,
    // the function pointers above are valid while this is alive
    _library: Library,
}

impl LoadedPlugin {
    /// Load the library at `path` and look up its entry points
    pub fn load(protocol: &str, path: &Path) -> Result<Self, ResolveError> {
        debug!("loading plugin library {:?} for protocol '{}'", path, protocol);
        // SAFETY: running the library initializers is the point of loading a plugin
        let library = unsafe { Library::new(path) }.map_err(|source| ResolveError::Load {
            protocol: protocol.to_owned(),
            path: path.to_owned(),
            source,
        })?;

        // SAFETY: the symbol type matches the one generated by declare_decoder_plugin!
        if let Ok(version) = unsafe { library.get::<AbiVersionFn>(ABI_VERSION) } {
            let found = unsafe { version() };
            if found != DECODER_ABI_VERSION {
                return Err(ResolveError::AbiMismatch {
                    protocol: protocol.to_owned(),
                    found,
                    expected: DECODER_ABI_VERSION,
                });
            }
        }
        let create = unsafe { library.get::<CreateDecoderFn>(CREATE_DECODER.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|_| ResolveError::MissingEntryPoint {
                protocol: protocol.to_owned(),
                symbol: CREATE_DECODER,
            })?;
        let report = unsafe { library.get::<GenerateReportFn>(GENERATE_REPORT.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|_| ResolveError::MissingEntryPoint {
                protocol: protocol.to_owned(),
                symbol: GENERATE_REPORT,
            })?;

        Ok(LoadedPlugin {
            protocol: protocol.to_owned(),
            path: path.to_owned(),
            create,
            report,
            _library: library,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Call the construction entry point
    pub fn create_decoder(self: &Arc<Self>) -> Result<Box<dyn Decoder>, ResolveError> {
        // SAFETY: entry point checked at load time, library kept alive by self
        let raw = unsafe { (self.create)() };
        if raw.is_null() {
            return Err(ResolveError::NullDecoder(self.protocol.clone()));
        }
        // SAFETY: the pointer comes from Box::into_raw in create_decoder
        let inner = unsafe { Box::from_raw(raw) };
        Ok(Box::new(PluginDecoder {
            inner: *inner,
            _plugin: Arc::clone(self),
        }))
    }

    /// Call the report entry point
    pub fn generate_report(&self) {
        info!("generating report for plugin '{}'", self.protocol);
        // SAFETY: entry point checked at load time
        unsafe { (self.report)() }
    }
}

/// Decoder built by a plugin
///
/// Holds a reference to its library, so the code of `inner` stays mapped
/// while the decoder exists.
struct PluginDecoder {
    // dropped before _plugin (declaration order)
    inner: Box<dyn Decoder>,
    _plugin: Arc<LoadedPlugin>,
}

impl Decoder for PluginDecoder {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn decode(
        &mut self,
        frame: &Frame,
        offset: usize,
        ctx: &mut FlowContext,
        stats: &mut Aggregator,
    ) -> Result<(), DecodeError> {
        self.inner.decode(frame, offset, ctx, stats)
    }

    fn consumed_len(&self) -> usize {
        self.inner.consumed_len()
    }

    fn next_protocol(&self) -> ProtocolId {
        self.inner.next_protocol()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_library() {
        let res = LoadedPlugin::load("DNS", Path::new("/nonexistent/libnothing.so"));
        match res {
            Err(ResolveError::Load { protocol, path, .. }) => {
                assert_eq!(protocol, "DNS");
                assert_eq!(path, PathBuf::from("/nonexistent/libnothing.so"));
            }
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("library should not load"),
        }
    }
}
