//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of 256-bit keys in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of the master vault key in bytes (512-bit).
pub const MASTER_KEY_LENGTH: usize = 64;

/// Length of the token-mode segment key: encryption half plus MAC half.
pub const TOKEN_KEY_LENGTH: usize = 64;

/// Vault-wide salt used by the memory-hard stage when none is configured.
pub const DEFAULT_SALT: &[u8] = b"r3dv1t_memstep_salt_42____42";

macro_rules! secret_key {
    ($(#[$doc:meta])* $name:ident, $len:expr) => {
        $(#[$doc])*
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name {
            key: [u8; $len],
        }

        impl $name {
            /// Create the key from raw bytes.
            pub fn from_bytes(key: [u8; $len]) -> Self {
                Self { key }
            }

            /// Get the key bytes.
            ///
            /// # Security
            /// The returned slice should be used immediately and not stored.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.key
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "([REDACTED])"))
            }
        }
    };
}

secret_key!(
    /// Master vault key: output of the two stretching stages.
    ///
    /// This key is the root of the key hierarchy and is only used to derive
    /// the purpose-bound keys of a [`VaultKeys`] bundle.
    MasterKey,
    MASTER_KEY_LENGTH
);

secret_key!(
    /// Key for the keyed fingerprint that produces object ids.
    FingerprintKey,
    KEY_LENGTH
);

secret_key!(
    /// Key for authenticating frame lines.
    FrameAuthKey,
    KEY_LENGTH
);

secret_key!(
    /// Segment key for the XChaCha20-Poly1305 mode.
    StreamSegmentKey,
    KEY_LENGTH
);

secret_key!(
    /// Segment key for the token mode.
    TokenSegmentKey,
    TOKEN_KEY_LENGTH
);

impl TokenSegmentKey {
    /// Half used for AES-256-CTR.
    pub fn encryption_half(&self) -> &[u8] {
        &self.key[..KEY_LENGTH]
    }

    /// Half used for the token MAC.
    pub fn mac_half(&self) -> &[u8] {
        &self.key[KEY_LENGTH..]
    }
}

/// Immutable bundle of purpose-bound keys for one vault session.
///
/// Every member is derived from the passphrase; none of them is ever
/// persisted. Dropping the bundle zeroizes all of them.
#[derive(Clone, Debug)]
pub struct VaultKeys {
    object_fingerprint: FingerprintKey,
    frame_authentication: FrameAuthKey,
    stream_segment: StreamSegmentKey,
    token_segment: TokenSegmentKey,
}

impl VaultKeys {
    /// Assemble a bundle from already-derived keys.
    pub fn from_parts(
        object_fingerprint: FingerprintKey,
        frame_authentication: FrameAuthKey,
        stream_segment: StreamSegmentKey,
        token_segment: TokenSegmentKey,
    ) -> Self {
        Self {
            object_fingerprint,
            frame_authentication,
            stream_segment,
            token_segment,
        }
    }

    pub fn object_fingerprint_key(&self) -> &FingerprintKey {
        &self.object_fingerprint
    }

    pub fn frame_authentication_key(&self) -> &FrameAuthKey {
        &self.frame_authentication
    }

    pub fn stream_segment_key(&self) -> &StreamSegmentKey {
        &self.stream_segment
    }

    pub fn token_segment_key(&self) -> &TokenSegmentKey {
        &self.token_segment
    }
}

/// Vault-wide salt for the memory-hard KDF stage.
///
/// Unlike a per-user salt this is a deployment constant: every vault opened
/// with the same configuration uses the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(#[serde(with = "hex")] Vec<u8>);

impl Salt {
    /// Create from bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Salt {
    fn default() -> Self {
        Self(DEFAULT_SALT.to_vec())
    }
}
