//! Vault configuration.
//!
//! One immutable value built by the caller and handed to
//! [`VaultManager::open`](crate::VaultManager::open). Nothing here is global.

use serde::{Deserialize, Serialize};

use crate::frame::FrameLayout;
use framevault_common::{Error, Result};
use framevault_crypto::{CipherMode, Salt};

/// Recommended segment size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Largest accepted segment size. Keeps encoded frames well under the
/// archive reader's line limit.
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default number of copies written per frame.
pub const DEFAULT_REPLICAS: usize = 3;

/// Upper bound on the replication factor.
pub const MAX_REPLICAS: usize = framevault_storage::MAX_REPLICAS;

/// Blank lines written after each object's frames.
pub const DEFAULT_SEPARATOR_LINES: usize = 3;

/// Frame and key-derivation format generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    /// Current format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version can be read by this build.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Settings of one vault session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Format generation this configuration targets.
    pub version: FormatVersion,
    /// Plaintext bytes per segment.
    pub chunk_size: usize,
    /// Copies written of every frame.
    pub replicas: usize,
    /// Mode used for segments written in this session.
    pub cipher_mode: CipherMode,
    /// Frame layout used by the encoder. The decoder accepts both.
    pub frame_layout: FrameLayout,
    /// Vault-wide salt of the memory-hard KDF stage.
    pub salt: Salt,
    /// Blank lines after each object.
    pub separator_lines: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            version: FormatVersion::CURRENT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            replicas: DEFAULT_REPLICAS,
            cipher_mode: CipherMode::default(),
            frame_layout: FrameLayout::default(),
            salt: Salt::default(),
            separator_lines: DEFAULT_SEPARATOR_LINES,
        }
    }
}

impl VaultConfig {
    /// Check every setting against its allowed range.
    ///
    /// # Errors
    /// - Returns error if the version is incompatible
    /// - Returns error if chunk size, replication factor or salt is out of range
    pub fn validate(&self) -> Result<()> {
        if !self.version.is_compatible() {
            return Err(Error::InvalidInput(format!(
                "Incompatible format version: {}.{}",
                self.version.major, self.version.minor
            )));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidInput(format!(
                "Chunk size must be within 1..={}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.replicas == 0 || self.replicas > MAX_REPLICAS {
            return Err(Error::InvalidInput(format!(
                "Replication factor must be within 1..={}, got {}",
                MAX_REPLICAS, self.replicas
            )));
        }
        if self.salt.is_empty() {
            return Err(Error::InvalidInput("KDF salt cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}
