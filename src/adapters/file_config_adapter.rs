//! INI file configuration adapter.
//!
//! Section and key names are case-insensitive. A key written without a value
//! (`seed =`) reads as absent.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FileConfigAdapter {
    ini: Ini,
}

impl Default for FileConfigAdapter {
    fn default() -> Self {
        Self { ini: Ini::new() }
    }
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut ini = Ini::new();
        ini.load(path).map_err(std::io::Error::other)?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut ini = Ini::new();
        ini.read(content.to_string())?;
        Ok(Self { ini })
    }

    /// Override a value, as command line flags do.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.ini.set(section, key, Some(value.into()));
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn keys(&self, section: &str) -> Vec<String> {
        self.ini
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}
