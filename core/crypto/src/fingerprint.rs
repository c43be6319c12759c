//! Keyed fingerprints and integrity tags.
//!
//! - Object ids: HMAC-SHA3-384 of the plaintext under the fingerprint key.
//! - Authenticated frame tags: HMAC-SHA3-256 under the frame key.
//! - Content-hash frame tags: plain SHA3-256, detects corruption only.

use hmac::{Hmac, Mac};
use sha3::{Digest, Sha3_256, Sha3_384};
use subtle::ConstantTimeEq;

use crate::keys::{FingerprintKey, FrameAuthKey};
use framevault_common::{Error, ObjectId, Result};

type HmacSha3_384 = Hmac<Sha3_384>;
type HmacSha3_256 = Hmac<Sha3_256>;

/// Size of frame tags in bytes.
pub const FRAME_TAG_SIZE: usize = 32;

/// Compute the content address of a plaintext.
pub fn object_fingerprint(key: &FingerprintKey, plaintext: &[u8]) -> Result<ObjectId> {
    let mut mac = HmacSha3_384::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid fingerprint key: {}", e)))?;
    mac.update(plaintext);
    ObjectId::from_digest(&mac.finalize().into_bytes())
}

fn frame_mac(key: &FrameAuthKey, message: &[u8]) -> Result<HmacSha3_256> {
    let mut mac = HmacSha3_256::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid frame key: {}", e)))?;
    mac.update(message);
    Ok(mac)
}

/// Authentication tag for a frame message.
pub fn frame_tag(key: &FrameAuthKey, message: &[u8]) -> Result<[u8; FRAME_TAG_SIZE]> {
    Ok(frame_mac(key, message)?.finalize().into_bytes().into())
}

/// Verify an authentication tag in constant time.
pub fn verify_frame_tag(key: &FrameAuthKey, message: &[u8], tag: &[u8]) -> Result<bool> {
    Ok(frame_mac(key, message)?.verify_slice(tag).is_ok())
}

/// Public content hash for a frame message.
pub fn content_hash(message: &[u8]) -> [u8; FRAME_TAG_SIZE] {
    Sha3_256::digest(message).into()
}

/// Verify a content hash in constant time.
pub fn verify_content_hash(message: &[u8], tag: &[u8]) -> bool {
    tag.len() == FRAME_TAG_SIZE && bool::from(content_hash(message)[..].ct_eq(tag))
}
