//! Token cipher: a Fernet-style encrypt-then-MAC construction.
//!
//! Token layout: `version (1) || timestamp (8, big endian) || ciphertext || mac (32)`.
//! The ciphertext is AES-256-CTR under the encryption half of the token key;
//! the MAC is HMAC-SHA3-256 under the MAC half, computed over the version,
//! timestamp, IV, associated data (length-prefixed) and ciphertext. The IV is
//! not part of the token, it travels in the segment's mode parameters.

use aes::Aes256;
use chrono::Utc;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha3::Sha3_256;

use crate::keys::TokenSegmentKey;
use framevault_common::{Error, Result};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type TokenMac = Hmac<Sha3_256>;

/// Leading byte of every token.
pub const TOKEN_VERSION: u8 = 0x80;

/// IV size for AES-CTR (16 bytes).
pub const IV_SIZE: usize = 16;

/// MAC size (32 bytes).
pub const MAC_SIZE: usize = 32;

const HEADER_SIZE: usize = 1 + 8;

fn token_mac(key: &TokenSegmentKey, header: &[u8], iv: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<TokenMac> {
    let mut mac = TokenMac::new_from_slice(key.mac_half())
        .map_err(|e| Error::Crypto(format!("Invalid token MAC key: {}", e)))?;
    mac.update(header);
    mac.update(iv);
    mac.update(&(aad.len() as u64).to_be_bytes());
    mac.update(aad);
    mac.update(ciphertext);
    Ok(mac)
}

fn apply_keystream(key: &TokenSegmentKey, iv: &[u8], buf: &mut [u8]) -> Result<()> {
    let mut cipher = Aes256Ctr::new_from_slices(key.encryption_half(), iv)
        .map_err(|e| Error::Crypto(format!("Invalid token key or IV: {}", e)))?;
    cipher.apply_keystream(buf);
    Ok(())
}

fn check_iv(iv: &[u8]) -> Result<()> {
    if iv.len() != IV_SIZE {
        return Err(Error::Crypto(format!(
            "Invalid token IV length: expected {}, got {}",
            IV_SIZE,
            iv.len()
        )));
    }
    Ok(())
}

/// Seal plaintext into a token.
///
/// # Errors
/// - Returns error if the IV is not IV_SIZE bytes
pub fn seal(key: &TokenSegmentKey, iv: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_iv(iv)?;

    let mut token = Vec::with_capacity(HEADER_SIZE + plaintext.len() + MAC_SIZE);
    token.push(TOKEN_VERSION);
    token.extend_from_slice(&Utc::now().timestamp().to_be_bytes());

    let mut body = plaintext.to_vec();
    apply_keystream(key, iv, &mut body)?;

    let tag = token_mac(key, &token, iv, aad, &body)?.finalize().into_bytes();
    token.extend_from_slice(&body);
    token.extend_from_slice(&tag);
    Ok(token)
}

/// Verify and open a token.
///
/// # Errors
/// - Returns error if the token is truncated or has an unknown version
/// - Returns error if the MAC does not verify (tampering, wrong key, wrong aad)
pub fn open(key: &TokenSegmentKey, iv: &[u8], aad: &[u8], token: &[u8]) -> Result<Vec<u8>> {
    check_iv(iv)?;

    if token.len() < HEADER_SIZE + MAC_SIZE {
        return Err(Error::Crypto("Token too short".to_string()));
    }
    if token[0] != TOKEN_VERSION {
        return Err(Error::Crypto(format!("Unsupported token version: {:#04x}", token[0])));
    }

    let (header, rest) = token.split_at(HEADER_SIZE);
    let (body, tag) = rest.split_at(rest.len() - MAC_SIZE);

    token_mac(key, header, iv, aad, body)?
        .verify_slice(tag)
        .map_err(|_| Error::Crypto("Token authentication failed".to_string()))?;

    let mut plaintext = body.to_vec();
    apply_keystream(key, iv, &mut plaintext)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::TOKEN_KEY_LENGTH;

    fn key(byte: u8) -> TokenSegmentKey {
        TokenSegmentKey::from_bytes([byte; TOKEN_KEY_LENGTH])
    }

    const IV: [u8; IV_SIZE] = [5u8; IV_SIZE];

    #[test]
    fn test_seal_open_roundtrip() {
        let token = seal(&key(1), &IV, b"aad", b"token payload").unwrap();
        assert_eq!(token[0], TOKEN_VERSION);
        assert_eq!(token.len(), HEADER_SIZE + 13 + MAC_SIZE);

        let plaintext = open(&key(1), &IV, b"aad", &token).unwrap();
        assert_eq!(plaintext, b"token payload");
    }

    #[test]
    fn test_ciphertext_hides_plaintext() {
        let token = seal(&key(1), &IV, b"", b"aaaaaaaaaaaaaaaa").unwrap();
        assert_ne!(&token[HEADER_SIZE..HEADER_SIZE + 16], b"aaaaaaaaaaaaaaaa");
    }

    #[test]
    fn test_tampering_detected() {
        let mut token = seal(&key(1), &IV, b"", b"payload").unwrap();
        token[HEADER_SIZE] ^= 0x01;
        assert!(open(&key(1), &IV, b"", &token).is_err());
    }

    #[test]
    fn test_wrong_key_iv_or_aad_fails() {
        let token = seal(&key(1), &IV, b"a", b"payload").unwrap();
        assert!(open(&key(2), &IV, b"a", &token).is_err());
        assert!(open(&key(1), &[6u8; IV_SIZE], b"a", &token).is_err());
        assert!(open(&key(1), &IV, b"b", &token).is_err());
    }

    #[test]
    fn test_truncated_and_bad_version() {
        assert!(open(&key(1), &IV, b"", &[TOKEN_VERSION; 10]).is_err());

        let mut token = seal(&key(1), &IV, b"", b"payload").unwrap();
        token[0] = 0x81;
        assert!(open(&key(1), &IV, b"", &token).is_err());
    }

    #[test]
    fn test_bad_iv_length() {
        assert!(seal(&key(1), &[0u8; 8], b"", b"payload").is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let token = seal(&key(3), &IV, b"", b"").unwrap();
        assert!(open(&key(3), &IV, b"", &token).unwrap().is_empty());
    }
}
