//! Serializer configuration.
//!
//! [`InstbinConfig`] controls how records are written and how much a reader
//! is willing to allocate for one record. It can be built in code or loaded
//! from a TOML file:
//!
//! ```toml
//! compression = "lz4"
//! max_record_size = 268435456
//! ```
//!
//! Missing keys fall back to [`InstbinConfig::default`].

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Payload compression used for TYPE and PROP records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Store payloads raw (`compressedLength` is written as 0).
    None,
    /// LZ4 block compression.
    #[default]
    Lz4,
}

/// Configuration shared by serialize, deserialize and clone calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstbinConfig {
    /// Compression applied when writing. Readers accept both modes.
    pub compression: Compression,
    /// Upper bound for a single record's compressed or decompressed size.
    pub max_record_size: usize,
}

impl InstbinConfig {
    /// Default record size limit (256 MiB).
    pub const DEFAULT_MAX_RECORD_SIZE: usize = 256 * 1024 * 1024;

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded instbin config from {}: {config:?}", path.display());
        Ok(config)
    }

    /// Returns a copy with the given compression mode.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

impl Default for InstbinConfig {
    fn default() -> Self {
        Self {
            compression: Compression::Lz4,
            max_record_size: Self::DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

/// Errors from loading an [`InstbinConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse instbin config: {0}")]
    Parse(#[from] toml::de::Error),
}
