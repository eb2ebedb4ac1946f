use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{Level, debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether a config file may be absent: built-in default paths are optional,
/// paths named on the command line are expected to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Optional,
    Expected,
}

/// Falls back to `T::default()` on any failure; see [`fallback_level`].
pub fn load_toml_or_default<T: DeserializeOwned + Default>(
    path: impl AsRef<Path>,
    what: &str,
    presence: Presence,
) -> T {
    match load_toml(path) {
        Ok(value) => value,
        Err(err) => {
            if fallback_level(&err, presence) == Level::WARN {
                warn!(error = %err, "using default {what}");
            } else {
                debug!(error = %err, "using default {what}");
            }
            T::default()
        }
    }
}

/// Only an optional file that does not exist falls back quietly.
pub fn fallback_level(err: &ConfigError, presence: Presence) -> Level {
    match (err, presence) {
        (ConfigError::Read { source, .. }, Presence::Optional)
            if source.kind() == io::ErrorKind::NotFound =>
        {
            Level::DEBUG
        }
        _ => Level::WARN,
    }
}
