//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation. The nonce is
//! supplied by the caller and travels in the frame metadata, so ciphertexts
//! produced here carry no nonce prefix.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};

use crate::keys::KEY_LENGTH;
use framevault_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

fn cipher_for(key: &[u8]) -> Result<XChaCha20Poly1305> {
    if key.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        )));
    }
    Ok(XChaCha20Poly1305::new(GenericArray::from_slice(key)))
}

fn check_nonce(nonce: &[u8]) -> Result<&XNonce> {
    if nonce.len() != NONCE_SIZE {
        return Err(Error::Crypto(format!(
            "Invalid nonce length: expected {}, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }
    Ok(XNonce::from_slice(nonce))
}

/// Encrypt plaintext with a caller-supplied nonce.
///
/// # Preconditions
/// - `nonce` must never repeat under the same key
///
/// # Postconditions
/// - Returns ciphertext || tag, length plaintext length + TAG_SIZE
/// - `aad` is authenticated but not encrypted
///
/// # Errors
/// - Returns error if key or nonce length is incorrect
pub fn encrypt_with_nonce(key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = check_nonce(nonce)?;

    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))
}

/// Decrypt ciphertext produced by [`encrypt_with_nonce`].
///
/// # Errors
/// - Returns error if key or nonce length is incorrect
/// - Returns error if ciphertext is too short
/// - Returns error if authentication fails (tampered data, wrong key, wrong aad)
pub fn decrypt_with_nonce(key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = check_nonce(nonce)?;

    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Crypto("Ciphertext too short".to_string()));
    }

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LENGTH] = [42u8; KEY_LENGTH];
    const NONCE: [u8; NONCE_SIZE] = [1u8; NONCE_SIZE];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = b"Hello, World!";

        let ciphertext = encrypt_with_nonce(&KEY, &NONCE, b"aad", plaintext).unwrap();
        let decrypted = decrypt_with_nonce(&KEY, &NONCE, b"aad", &ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_same_nonce_is_deterministic() {
        let ct1 = encrypt_with_nonce(&KEY, &NONCE, b"", b"Deterministic").unwrap();
        let ct2 = encrypt_with_nonce(&KEY, &NONCE, b"", b"Deterministic").unwrap();
        assert_eq!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let ciphertext = encrypt_with_nonce(&[1u8; KEY_LENGTH], &NONCE, b"", b"Secret data").unwrap();
        assert!(decrypt_with_nonce(&[2u8; KEY_LENGTH], &NONCE, b"", &ciphertext).is_err());
    }

    #[test]
    fn test_wrong_aad_fails() {
        let ciphertext = encrypt_with_nonce(&KEY, &NONCE, b"owner:0", b"Secret data").unwrap();
        assert!(decrypt_with_nonce(&KEY, &NONCE, b"owner:2048", &ciphertext).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut ciphertext = encrypt_with_nonce(&KEY, &NONCE, b"", b"Important data").unwrap();
        ciphertext[5] ^= 0xFF;
        assert!(decrypt_with_nonce(&KEY, &NONCE, b"", &ciphertext).is_err());
    }

    #[test]
    fn test_invalid_lengths() {
        assert!(encrypt_with_nonce(&[0u8; 16], &NONCE, b"", b"data").is_err());
        assert!(encrypt_with_nonce(&KEY, &[0u8; 12], b"", b"data").is_err());
        assert!(decrypt_with_nonce(&KEY, &NONCE, b"", &[0u8; 4]).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let ciphertext = encrypt_with_nonce(&KEY, &NONCE, b"", b"").unwrap();
        assert_eq!(ciphertext.len(), TAG_SIZE);
        assert!(decrypt_with_nonce(&KEY, &NONCE, b"", &ciphertext).unwrap().is_empty());
    }
}
