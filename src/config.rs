//! Property based configuration.
//!
//! A [`Configuration`] is a flat map from dotted keys to string values, the
//! way the host optimizer passes settings to its platforms. Values are parsed
//! on access, so a malformed entry only fails the component that reads it.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ConfigError;

pub const CPU_MHZ_PROPERTY: &str = "shardgraph.cpu.mhz";
pub const CORES_PROPERTY: &str = "shardgraph.cores";
pub const HDFS_MS_PER_MB_PROPERTY: &str = "shardgraph.hdfs.ms-per-mb";
pub const ENGINE_THREADS_PROPERTY: &str = "shardgraph.engine.threads";
pub const SCHEDULING_PROPERTY: &str = "shardgraph.executor.scheduling";
pub const TEMP_DIR_PROPERTY: &str = "shardgraph.tempdir";

pub(crate) const DEFAULTS: &str = include_str!("defaults.properties");

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    properties: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration holding only the bundled platform defaults.
    pub fn with_defaults() -> Self {
        let mut config = Self::new();
        config
            .load(DEFAULTS)
            .expect("bundled defaults are well formed");
        config
    }

    /// Loads `key = value` (or `key: value`) lines. Lines starting with `#`
    /// or `!` are comments. Later entries overwrite earlier ones.
    pub fn load(&mut self, text: &str) -> Result<(), ConfigError> {
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some(split) = line.find(['=', ':']) else {
                return Err(ConfigError::Malformed {
                    line: i + 1,
                    text: line.to_string(),
                });
            };

            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            if key.is_empty() {
                return Err(ConfigError::Malformed {
                    line: i + 1,
                    text: line.to_string(),
                });
            }

            self.set_property(key, value);
        }

        Ok(())
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn get_optional_string_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn get_string_property(&self, key: &str) -> Result<&str, ConfigError> {
        self.get_optional_string_property(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    pub fn get_long_property(&self, key: &str) -> Result<i64, ConfigError> {
        self.parse(key)
    }

    pub fn get_double_property(&self, key: &str) -> Result<f64, ConfigError> {
        self.parse(key)
    }

    pub fn get_optional_long_property(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.parse_optional(key)
    }

    /// Parses any `FromStr` value, e.g. a [`SchedulingPolicy`](crate::SchedulingPolicy).
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        self.parse_optional(key)?
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    pub fn parse_optional<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.properties.get(key) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::Invalid {
                    key: key.to_string(),
                    value: value.clone(),
                }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
