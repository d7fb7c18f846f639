use std::io;

/// Run configuration, stored as a TOML table
///
/// Keys can be loaded from a file and overridden afterwards (for ex. from
/// command-line arguments) using [`Config::set`].
#[derive(Clone, Debug)]
pub struct Config {
    value: toml::Value,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            value: toml::Value::Table(toml::Table::new()),
        }
    }
}

impl Config {
    fn lookup<T: AsRef<str>>(&self, k: T) -> Option<&toml::Value> {
        let mut item = &self.value;
        for key in k.as_ref().split('.') {
            item = item.get(key)?;
        }
        Some(item)
    }

    /// Get an entry by path. If the input argument contains dots, the path is split
    /// into keys, each key being requested recursively.
    pub fn get<T: AsRef<str>>(&self, k: T) -> Option<&str> {
        self.lookup(k)?.as_str()
    }

    /// Get an entry of type integer by path
    pub fn get_usize<T: AsRef<str>>(&self, k: T) -> Option<usize> {
        self.lookup(k)?
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Get an entry of type boolean by path
    pub fn get_bool<T: AsRef<str>>(&self, k: T) -> Option<bool> {
        self.lookup(k)?.as_bool()
    }

    /// Set a top-level entry, replacing any previous value
    pub fn set<T: Into<toml::Value>>(&mut self, k: &str, v: T) -> bool {
        match self.value.as_table_mut() {
            Some(table) => {
                table.insert(k.to_owned(), v.into());
                true
            }
            None => false,
        }
    }

    /// Load configuration from input object. If keys are already present, they are overwritten
    pub fn load_config<R: io::Read>(&mut self, mut config: R) -> Result<(), io::Error> {
        let mut s = String::new();
        config.read_to_string(&mut s)?;
        let table = toml::from_str::<toml::Table>(&s).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Load configuration failed: {e}"),
            )
        })?;
        match self.value.as_table_mut() {
            Some(current) => current.extend(table),
            None => self.value = toml::Value::Table(table),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn config_load_and_override() {
        let mut config = Config::default();
        let input = "output_dir = \"/tmp/out\"\nnum_threads = 4\n[decoders]\njson = true\n";
        config.load_config(input.as_bytes()).expect("load");
        assert_eq!(config.get("output_dir"), Some("/tmp/out"));
        assert_eq!(config.get_usize("num_threads"), Some(4));
        assert_eq!(config.get_bool("decoders.json"), Some(true));
        assert!(config.set("num_threads", 1));
        assert_eq!(config.get_usize("num_threads"), Some(1));
        assert_eq!(config.get("missing.key"), None);
    }

    #[test]
    fn config_invalid_toml() {
        let mut config = Config::default();
        assert!(config.load_config("this is = = not toml".as_bytes()).is_err());
    }
}
