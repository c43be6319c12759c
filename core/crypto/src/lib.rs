//! Cryptographic primitives for framevault.
//!
//! This module provides:
//! - The passphrase key-derivation cascade (scrypt, then PBKDF2-HMAC-SHA3-512)
//! - Purpose-bound key bundles with automatic zeroization
//! - Segment ciphers: XChaCha20-Poly1305 and a Fernet-style token cipher
//! - Keyed fingerprints for content addressing and frame authentication
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time comparison of integrity tags

pub mod aead;
pub mod fingerprint;
pub mod kdf;
pub mod keys;
pub mod mode;
pub mod nonce;
pub mod token;

pub use fingerprint::{content_hash, frame_tag, object_fingerprint, verify_content_hash, verify_frame_tag};
pub use kdf::{derive_master_key, derive_vault_keys, expand_master_key};
pub use keys::{
    FingerprintKey, FrameAuthKey, MasterKey, Salt, StreamSegmentKey, TokenSegmentKey, VaultKeys,
    KEY_LENGTH, MASTER_KEY_LENGTH, TOKEN_KEY_LENGTH,
};
pub use mode::{open_segment, seal_segment, CipherMode, CipherParams, TokenParams, XChaChaParams};
pub use nonce::make_nonce;
