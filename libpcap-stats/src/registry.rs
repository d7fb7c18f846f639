//! Protocol identifier to decoder resolution

use crate::decoder::{Decoder, DecoderBuilder};
use crate::decoders::{builtin_builders, BUILTIN_ALIASES};
use crate::error::ResolveError;
use crate::mapping::{load_decoder_mapping, DEFAULT_DECODER_MAPPING};
use crate::plugin::LoadedPlugin;
use crate::protocol::ProtocolId;
use libpcap_tools::Config;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

enum PluginSlot {
    Loaded(Arc<LoadedPlugin>),
    Failed,
    Unmapped,
}

/// Decoder registry
///
/// Built-in decoders are resolved first. Other identifiers are looked up in
/// the protocol mapping, and the corresponding library is loaded on first
/// use. Each identifier is loaded at most once, even when called from
/// several threads; failures are remembered as well.
///
/// Libraries are released when the registry and all decoders built from
/// them are dropped.
pub struct DecoderRegistry {
    builders: Vec<Box<dyn DecoderBuilder>>,
    mapping: HashMap<String, PathBuf>,
    config: Config,
    plugins: Mutex<BTreeMap<String, PluginSlot>>,
}

impl DecoderRegistry {
    /// Create a registry with the built-in decoders and the protocol mapping
    /// file named by `decoder_mapping` in `config`
    ///
    /// A missing mapping file is not an error: no plugin will be available.
    pub fn new(config: &Config) -> Self {
        let path = config
            .get("decoder_mapping")
            .unwrap_or(DEFAULT_DECODER_MAPPING);
        let mapping = match load_decoder_mapping(path) {
            Ok(m) => {
                info!("loaded {} protocol mappings from {:?}", m.len(), path);
                m
            }
            Err(e) => {
                warn!("could not read protocol mapping {:?}: {}", path, e);
                HashMap::new()
            }
        };
        Self::with_mapping(config, mapping)
    }

    /// Create a registry with the built-in decoders and an explicit mapping
    pub fn with_mapping(config: &Config, mapping: HashMap<String, PathBuf>) -> Self {
        DecoderRegistry {
            builders: builtin_builders(),
            mapping,
            config: config.clone(),
            plugins: Mutex::new(BTreeMap::new()),
        }
    }

    /// Add a decoder builder. Builders added later do not shadow earlier ones.
    pub fn add_builder(&mut self, b: Box<dyn DecoderBuilder>) {
        self.builders.push(b);
    }

    /// Iterate builder names
    pub fn iter_builders<Op>(&self, op: Op)
    where
        Op: Fn(&str),
    {
        self.builders.iter().for_each(|b| op(b.name()));
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn plugins(&self) -> MutexGuard<'_, BTreeMap<String, PluginSlot>> {
        // slots are only inserted, a panic cannot leave the map inconsistent
        self.plugins.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return a new decoder for `protocol`
    pub fn resolve(&self, protocol: &ProtocolId) -> Result<Box<dyn Decoder>, ResolveError> {
        let name = BUILTIN_ALIASES
            .iter()
            .find(|(alias, _)| *alias == protocol.as_str())
            .map(|(_, name)| *name)
            .unwrap_or(protocol.as_str());
        if let Some(b) = self.builders.iter().find(|b| b.name() == name) {
            return Ok(b.build(&self.config));
        }
        let plugin = self.load_plugin(name)?;
        plugin.create_decoder()
    }

    fn load_plugin(&self, name: &str) -> Result<Arc<LoadedPlugin>, ResolveError> {
        // the lock is held while loading
        let mut plugins = self.plugins();
        match plugins.get(name) {
            Some(PluginSlot::Loaded(p)) => return Ok(Arc::clone(p)),
            Some(PluginSlot::Failed) => {
                return Err(ResolveError::PreviouslyFailed(name.to_owned()))
            }
            Some(PluginSlot::Unmapped) => return Err(ResolveError::NoMapping(name.to_owned())),
            None => (),
        }
        let Some(path) = self.mapping.get(name) else {
            warn!("no decoder for protocol '{}'", name);
            plugins.insert(name.to_owned(), PluginSlot::Unmapped);
            return Err(ResolveError::NoMapping(name.to_owned()));
        };
        match LoadedPlugin::load(name, path) {
            Ok(p) => {
                info!("loaded plugin '{}' from {:?}", name, path);
                let p = Arc::new(p);
                plugins.insert(name.to_owned(), PluginSlot::Loaded(Arc::clone(&p)));
                Ok(p)
            }
            Err(e) => {
                warn!("{}", e);
                plugins.insert(name.to_owned(), PluginSlot::Failed);
                Err(e)
            }
        }
    }

    /// Identifiers of the plugins loaded so far, in order
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.plugins()
            .iter()
            .filter(|(_, slot)| matches!(slot, PluginSlot::Loaded(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Call the report entry point of each loaded plugin, in identifier order
    pub fn generate_plugin_reports(&self) {
        let loaded: Vec<_> = self
            .plugins()
            .values()
            .filter_map(|slot| match slot {
                PluginSlot::Loaded(p) => Some(Arc::clone(p)),
                _ => None,
            })
            .collect();
        for p in loaded {
            p.generate_report();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DecoderRegistry {
        let mut mapping = HashMap::new();
        mapping.insert(
            "HTTP".to_owned(),
            PathBuf::from("/nonexistent/libhttp_decoder.so"),
        );
        DecoderRegistry::with_mapping(&Config::default(), mapping)
    }

    #[test]
    fn resolve_builtins_and_aliases() {
        let r = registry();
        for (id, expected) in [
            ("Ethernet", "Ethernet"),
            ("Link", "Ethernet"),
            ("IP", "IP"),
            ("Network", "IP"),
            ("TCP", "TCP"),
            ("Transport-TCP", "TCP"),
            ("UDP", "UDP"),
            ("Transport-UDP", "UDP"),
        ] {
            let d = r.resolve(&ProtocolId::from(id)).expect("builtin decoder");
            assert_eq!(d.name(), expected);
        }
    }

    #[test]
    fn resolve_unmapped() {
        let r = registry();
        let res = r.resolve(&ProtocolId::from("DNS"));
        assert!(matches!(res, Err(ResolveError::NoMapping(ref p)) if p == "DNS"));
        // same answer the second time
        let res = r.resolve(&ProtocolId::from("DNS"));
        assert!(matches!(res, Err(ResolveError::NoMapping(_))));
        assert!(r.loaded_plugins().is_empty());
    }

    #[test]
    fn failed_load_is_cached() {
        let r = registry();
        let res = r.resolve(&ProtocolId::from("HTTP"));
        assert!(matches!(res, Err(ResolveError::Load { .. })));
        let res = r.resolve(&ProtocolId::from("HTTP"));
        assert!(matches!(res, Err(ResolveError::PreviouslyFailed(_))));
        // nothing to report
        r.generate_plugin_reports();
    }

    #[test]
    fn list_builders() {
        let r = registry();
        let names = std::sync::Mutex::new(Vec::new());
        r.iter_builders(|n| names.lock().unwrap().push(n.to_owned()));
        assert_eq!(
            names.into_inner().unwrap(),
            vec!["Ethernet", "IP", "TCP", "UDP"]
        );
    }
}
