//! Segment cipher pipeline.
//!
//! An object's plaintext is cut into fixed-size pieces, and each piece is
//! encrypted on its own with fresh mode parameters. Every segment is bound to
//! its owner and offset through associated data, so a segment moved to another
//! object or position fails to decrypt.

use tracing::trace;

use framevault_common::{Error, ObjectRef, Result};
use framevault_crypto::{open_segment, seal_segment, CipherMode, CipherParams, VaultKeys};

/// One encrypted piece of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset of the piece in the object plaintext.
    pub offset: u64,
    /// Object this piece belongs to.
    pub owner: ObjectRef,
    /// Mode parameters; the variant fixes the cipher mode.
    pub params: CipherParams,
    /// Encrypted piece.
    pub ciphertext: Vec<u8>,
}

impl Segment {
    pub fn mode(&self) -> CipherMode {
        self.params.mode()
    }

    /// Decrypt this segment.
    ///
    /// # Errors
    /// - Returns `Crypto` if authentication fails
    pub fn open(&self, keys: &VaultKeys) -> Result<Vec<u8>> {
        let aad = segment_aad(&self.owner, self.offset);
        open_segment(keys, &self.params, &aad, &self.ciphertext)
    }
}

/// Associated data binding a segment to its position.
pub fn segment_aad(owner: &ObjectRef, offset: u64) -> Vec<u8> {
    format!("{}:{}", owner, offset).into_bytes()
}

/// Split and encrypt a plaintext into segments.
///
/// # Postconditions
/// - Segments are ordered by offset and cover the plaintext exactly
/// - An empty plaintext yields one empty segment at offset 0
///
/// # Errors
/// - Returns error if `chunk_size` is zero
/// - Returns error if parameter generation or encryption fails
pub fn encrypt_object(
    plaintext: &[u8],
    owner: &ObjectRef,
    chunk_size: usize,
    mode: CipherMode,
    keys: &VaultKeys,
) -> Result<Vec<Segment>> {
    if chunk_size == 0 {
        return Err(Error::InvalidInput("Chunk size must be at least 1".to_string()));
    }

    let pieces: Vec<&[u8]> = if plaintext.is_empty() {
        vec![plaintext]
    } else {
        plaintext.chunks(chunk_size).collect()
    };

    let mut segments = Vec::with_capacity(pieces.len());
    for (index, piece) in pieces.into_iter().enumerate() {
        let offset = (index * chunk_size) as u64;
        let params = CipherParams::generate(mode)?;
        let ciphertext = seal_segment(keys, &params, &segment_aad(owner, offset), piece)?;
        segments.push(Segment {
            offset,
            owner: owner.clone(),
            params,
            ciphertext,
        });
    }

    trace!(owner = owner.short(), segments = segments.len(), mode = %mode, "Object encrypted");
    Ok(segments)
}

/// Rebuild a plaintext from an unordered bag of segments.
///
/// Segments may arrive in any order and may repeat. Pieces that overlap must
/// agree byte for byte; the decrypted pieces must cover `[0, len)` without a
/// hole.
///
/// # Errors
/// - `Reconstruction` if there are no segments, a segment fails to decrypt,
///   or coverage has a hole
/// - `Conflict` if two segments disagree about the same bytes
/// - `InvalidInput` if the segments belong to different owners
pub fn decrypt_object<'a, I>(segments: I, keys: &VaultKeys) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a Segment>,
{
    let mut ordered: Vec<&Segment> = segments.into_iter().collect();
    let owner = match ordered.first() {
        Some(first) => first.owner.clone(),
        None => return Err(Error::Reconstruction("Object has no segments".to_string())),
    };
    if ordered.iter().any(|s| s.owner != owner) {
        return Err(Error::InvalidInput(format!(
            "Segments of object {} mixed with other owners",
            owner.short()
        )));
    }
    ordered.sort_by_key(|s| s.offset);

    // The sink only ever grows to the end of contiguous coverage.
    let mut sink: Vec<u8> = Vec::new();
    for segment in ordered {
        let start = usize::try_from(segment.offset).map_err(|_| {
            Error::Reconstruction(format!("Segment offset {} out of range", segment.offset))
        })?;
        if start > sink.len() {
            return Err(Error::Reconstruction(format!(
                "Object {} is missing bytes {}..{}",
                owner.short(),
                sink.len(),
                start
            )));
        }

        let piece = segment.open(keys).map_err(|e| {
            Error::Reconstruction(format!("Segment at offset {} failed: {}", segment.offset, e))
        })?;

        let overlap = (sink.len() - start).min(piece.len());
        if sink[start..start + overlap] != piece[..overlap] {
            return Err(Error::Conflict(format!(
                "Object {} has diverging segments at offset {}",
                owner.short(),
                segment.offset
            )));
        }
        sink.extend_from_slice(&piece[overlap..]);
    }

    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framevault_common::{ObjectId, OBJECT_ID_LENGTH};
    use framevault_crypto::{expand_master_key, MasterKey, MASTER_KEY_LENGTH};
    use proptest::prelude::*;

    fn keys() -> VaultKeys {
        expand_master_key(&MasterKey::from_bytes([4u8; MASTER_KEY_LENGTH]))
    }

    fn owner() -> ObjectRef {
        ObjectRef::Object(ObjectId::from_digest(&[0x11; OBJECT_ID_LENGTH]).unwrap())
    }

    #[test]
    fn test_split_5000_bytes() {
        let plaintext = vec![7u8; 5000];
        let segments = encrypt_object(&plaintext, &owner(), 2048, CipherMode::default(), &keys()).unwrap();

        let offsets: Vec<u64> = segments.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 2048, 4096]);
        assert_eq!(segments[2].open(&keys()).unwrap().len(), 904);

        assert_eq!(decrypt_object(&segments, &keys()).unwrap(), plaintext);
    }

    #[test]
    fn test_out_of_order_and_duplicates() {
        let plaintext: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut segments = encrypt_object(&plaintext, &owner(), 100, CipherMode::Token, &keys()).unwrap();
        segments.reverse();
        let copies = segments.clone();
        segments.extend(copies);

        assert_eq!(decrypt_object(&segments, &keys()).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let segments = encrypt_object(b"", &owner(), 2048, CipherMode::default(), &keys()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].offset, 0);
        assert!(decrypt_object(&segments, &keys()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_fails() {
        assert!(encrypt_object(b"data", &owner(), 0, CipherMode::default(), &keys()).is_err());
    }

    #[test]
    fn test_no_segments_fails() {
        let none: Vec<Segment> = Vec::new();
        assert!(matches!(decrypt_object(&none, &keys()), Err(Error::Reconstruction(_))));
    }

    #[test]
    fn test_hole_detected() {
        let mut segments = encrypt_object(&[1u8; 300], &owner(), 100, CipherMode::default(), &keys()).unwrap();
        segments.remove(1);
        assert!(matches!(decrypt_object(&segments, &keys()), Err(Error::Reconstruction(_))));
    }

    #[test]
    fn test_diverging_segments_conflict() {
        let keys = keys();
        let mut segments = encrypt_object(b"aaaa", &owner(), 4, CipherMode::default(), &keys).unwrap();
        let other = encrypt_object(b"bbbb", &owner(), 4, CipherMode::default(), &keys).unwrap();
        segments.extend(other);

        assert!(matches!(decrypt_object(&segments, &keys), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_agreeing_segments_with_fresh_nonces() {
        let keys = keys();
        let mut segments = encrypt_object(b"same bytes", &owner(), 4, CipherMode::default(), &keys).unwrap();
        let again = encrypt_object(b"same bytes", &owner(), 5, CipherMode::Token, &keys).unwrap();
        segments.extend(again);

        assert_eq!(decrypt_object(&segments, &keys).unwrap(), b"same bytes");
    }

    #[test]
    fn test_moved_segment_fails() {
        let keys = keys();
        let mut segments = encrypt_object(b"abcdabcd", &owner(), 4, CipherMode::default(), &keys).unwrap();
        segments[1].offset = 0;
        segments[0].offset = 4;
        assert!(matches!(decrypt_object(&segments, &keys), Err(Error::Reconstruction(_))));
    }

    #[test]
    fn test_mixed_owners_rejected() {
        let keys = keys();
        let mut segments = encrypt_object(b"abcd", &owner(), 2, CipherMode::default(), &keys).unwrap();
        segments[1].owner = ObjectRef::Bookkeeping;
        assert!(matches!(decrypt_object(&segments, &keys), Err(Error::InvalidInput(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_decrypt_inverts_encrypt(
            plaintext in proptest::collection::vec(any::<u8>(), 0..600),
            chunk_size in 1usize..300,
            token_mode in any::<bool>(),
        ) {
            let mode = if token_mode { CipherMode::Token } else { CipherMode::XChaCha20Poly1305 };
            let keys = keys();
            let segments = encrypt_object(&plaintext, &owner(), chunk_size, mode, &keys).unwrap();
            prop_assert_eq!(decrypt_object(&segments, &keys).unwrap(), plaintext);
        }
    }
}
