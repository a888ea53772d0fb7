//! Runtime configuration.
//!
//! The configuration is a TOML document, by default read from the file named by the
//! `JAVELIN_CONFIG` environment variable:
//!
//! ```toml
//! instance_field = "nativeInstance"
//! weak_references = "native"
//! describe_exceptions = true
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable holding the path to the configuration file.
pub const CONFIG_VARIABLE: &str = "JAVELIN_CONFIG";

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Name of the `long` field in which live classes keep the address of their native instance.
    pub instance_field: String,

    pub weak_references: WeakReferences,

    /// Whether to print exceptions cleared while resolving binding tables.
    pub describe_exceptions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_field: "nativeInstance".into(),
            weak_references: Default::default(),
            describe_exceptions: true,
        }
    }
}

impl Config {
    pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
        toml::from_str(src).map_err(ConfigError::Parse)
    }

    /// Reads the file named by [CONFIG_VARIABLE], or returns the defaults if it is not set.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_VARIABLE) {
            Some(path) => {
                let path = PathBuf::from(path);
                log::debug!("Reading config from `{}`", path.display());
                let content = std::fs::read_to_string(&path)
                    .map_err(|err| ConfigError::Read { path, source: err })?;
                Self::from_toml(&content)
            }
            None => Ok(Default::default()),
        }
    }
}

/// How live objects keep their weak hold on the managed object.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeakReferences {
    /// Weak global references of the native interface.
    Native,

    /// Instances of `java.lang.ref.WeakReference`, for runtimes lacking weak global references.
    Emulated,
}

impl Default for WeakReferences {
    fn default() -> Self {
        WeakReferences::Native
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config")]
    Parse(#[source] toml::de::Error),
}
