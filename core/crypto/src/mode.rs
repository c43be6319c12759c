//! Cipher modes and their per-segment parameters.
//!
//! The set of modes is closed: each variant has a fixed wire tag, a typed
//! parameter struct and an exhaustive arm in [`seal_segment`] and
//! [`open_segment`]. Adding a mode is a compile-visible change.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aead;
use crate::keys::VaultKeys;
use crate::nonce::make_nonce;
use crate::token;
use framevault_common::{Error, Result};

/// Encryption scheme of a segment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherMode {
    /// XChaCha20-Poly1305 with a 24-byte nonce. Primary mode.
    #[default]
    #[serde(rename = "km_1")]
    XChaCha20Poly1305,
    /// Fernet-style AES-256-CTR + HMAC-SHA3-256 token. Alternate mode.
    #[serde(rename = "km_2")]
    Token,
}

impl CipherMode {
    pub const ALL: [CipherMode; 2] = [CipherMode::XChaCha20Poly1305, CipherMode::Token];

    /// Wire tag used as the mode key in frame metadata.
    pub fn tag(self) -> &'static str {
        match self {
            CipherMode::XChaCha20Poly1305 => "km_1",
            CipherMode::Token => "km_2",
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Parameters of the XChaCha20-Poly1305 mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XChaChaParams {
    #[serde(rename = "n", with = "hex")]
    pub nonce: Vec<u8>,
}

/// Parameters of the token mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenParams {
    #[serde(with = "hex")]
    pub iv: Vec<u8>,
}

/// Mode-specific parameters of one segment; the variant fixes the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherParams {
    XChaCha20Poly1305(XChaChaParams),
    Token(TokenParams),
}

impl CipherParams {
    /// Generate fresh parameters for a new segment.
    ///
    /// # Errors
    /// - Returns error if nonce generation fails
    pub fn generate(mode: CipherMode) -> Result<Self> {
        Ok(match mode {
            CipherMode::XChaCha20Poly1305 => CipherParams::XChaCha20Poly1305(XChaChaParams {
                nonce: make_nonce(aead::NONCE_SIZE)?,
            }),
            CipherMode::Token => CipherParams::Token(TokenParams {
                iv: make_nonce(token::IV_SIZE)?,
            }),
        })
    }

    pub fn mode(&self) -> CipherMode {
        match self {
            CipherParams::XChaCha20Poly1305(_) => CipherMode::XChaCha20Poly1305,
            CipherParams::Token(_) => CipherMode::Token,
        }
    }

    /// Check parameter lengths.
    pub fn validate(&self) -> Result<()> {
        let (actual, expected) = match self {
            CipherParams::XChaCha20Poly1305(p) => (p.nonce.len(), aead::NONCE_SIZE),
            CipherParams::Token(p) => (p.iv.len(), token::IV_SIZE),
        };
        if actual != expected {
            return Err(Error::Crypto(format!(
                "{} parameters carry {} nonce bytes, expected {}",
                self.mode(),
                actual,
                expected
            )));
        }
        Ok(())
    }
}

/// Encrypt one segment under the key of its mode.
pub fn seal_segment(keys: &VaultKeys, params: &CipherParams, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    match params {
        CipherParams::XChaCha20Poly1305(p) => {
            aead::encrypt_with_nonce(keys.stream_segment_key().as_bytes(), &p.nonce, aad, plaintext)
        }
        CipherParams::Token(p) => token::seal(keys.token_segment_key(), &p.iv, aad, plaintext),
    }
}

/// Decrypt one segment under the key of its mode.
pub fn open_segment(keys: &VaultKeys, params: &CipherParams, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    match params {
        CipherParams::XChaCha20Poly1305(p) => {
            aead::decrypt_with_nonce(keys.stream_segment_key().as_bytes(), &p.nonce, aad, ciphertext)
        }
        CipherParams::Token(p) => token::open(keys.token_segment_key(), &p.iv, aad, ciphertext),
    }
}
