// SPDX-License-Identifier: Apache-2.0

//! Tunables for the term builder, loadable from TOML.
//!
//! ```toml
//! use_construct_hash = true
//! auto_clear_construct_cache = false
//! optimize_multiplies = true
//! optimize_divides = false
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TermBuilderOptions {
    /// Memoize lowered non-constant nodes by identity.
    pub use_construct_hash: bool,
    /// Drop the node cache at the end of every top-level lowering call.
    pub auto_clear_construct_cache: bool,
    /// Lower multiplication by a constant to shifts, adds and subtracts.
    pub optimize_multiplies: bool,
    /// Lower 32-bit division and remainder by a constant to multiplies.
    pub optimize_divides: bool,
}

impl TermBuilderOptions {
    /// Caching and both strength reductions enabled; caches persist across
    /// queries.
    pub fn opt() -> Self {
        Self {
            use_construct_hash: true,
            auto_clear_construct_cache: false,
            optimize_multiplies: true,
            optimize_divides: true,
        }
    }

    /// Every node is rebuilt with the backend's native operators.
    pub fn no_opt() -> Self {
        Self {
            use_construct_hash: false,
            auto_clear_construct_cache: false,
            optimize_multiplies: false,
            optimize_divides: false,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse { path: None, err })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|err| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            err,
        })
    }
}

impl Default for TermBuilderOptions {
    fn default() -> Self {
        Self::opt()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        err: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read options file {}: {}", path.display(), source)
            }
            ConfigError::Parse {
                path: Some(path),
                err,
            } => write!(f, "failed to parse TOML options from {}: {}", path.display(), err),
            ConfigError::Parse { path: None, err } => {
                write!(f, "failed to parse TOML options: {}", err)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { err, .. } => Some(err),
        }
    }
}
