//! Frame wire codec.
//!
//! A frame is one ASCII line carrying one segment:
//!
//! ```text
//! authenticated layout: meta_b64|chunk_b64
//! content-hash layout : tag_hex|meta_b64|chunk_b64
//! ```
//!
//! `meta_b64` is base64url of compact JSON with keys `i` (offset), `o`
//! (owner), exactly one cipher-mode key, `v` (layout tag) and, in the
//! authenticated layout, `h` (hex HMAC over the meta JSON without `h`
//! followed by `chunk_b64`). The content-hash tag is SHA3-256 over
//! `meta_b64` followed by `chunk_b64`; it detects corruption, not forgery.
//!
//! The field count locates the fields. A `v` key, when present, must agree
//! with it; frames without `v` are read as legacy frames of the detected
//! layout. In the authenticated layout the tag covers the compact canonical
//! JSON, so a legacy frame verifies only if its metadata was written in
//! exactly that form; spaced JSON from other writers is rejected.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::segment::Segment;
use framevault_common::{Error, ObjectRef, Result};
use framevault_crypto::fingerprint::FRAME_TAG_SIZE;
use framevault_crypto::{
    content_hash, frame_tag, verify_content_hash, verify_frame_tag, CipherParams, FrameAuthKey,
    TokenParams, XChaChaParams,
};

/// Padded base64url on output; padding optional on input.
const WIRE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const FIELD_SEPARATOR: u8 = b'|';

/// Line layout of a frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameLayout {
    /// Two fields; keyed HMAC tag inside the metadata.
    #[default]
    Authenticated,
    /// Three fields; public SHA3-256 tag in front.
    ContentHash,
}

impl FrameLayout {
    pub const ALL: [FrameLayout; 2] = [FrameLayout::Authenticated, FrameLayout::ContentHash];

    /// Value of the `v` metadata key.
    pub fn tag(self) -> &'static str {
        match self {
            FrameLayout::Authenticated => "a1",
            FrameLayout::ContentHash => "h1",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|layout| layout.tag() == tag)
    }

    /// Number of `|`-separated fields in a line.
    pub fn field_count(self) -> usize {
        match self {
            FrameLayout::Authenticated => 2,
            FrameLayout::ContentHash => 3,
        }
    }

    fn from_field_count(count: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|layout| layout.field_count() == count)
    }
}

/// Metadata as it appears on the wire. Field order is the canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FrameMeta {
    i: u64,
    o: ObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    km_1: Option<XChaChaParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    km_2: Option<TokenParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    h: Option<String>,
}

impl FrameMeta {
    fn for_segment(segment: &Segment, layout: FrameLayout) -> Self {
        let (km_1, km_2) = match &segment.params {
            CipherParams::XChaCha20Poly1305(p) => (Some(p.clone()), None),
            CipherParams::Token(p) => (None, Some(p.clone())),
        };
        Self {
            i: segment.offset,
            o: segment.owner.clone(),
            km_1,
            km_2,
            v: Some(layout.tag().to_string()),
            h: None,
        }
    }

    fn parse(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(|e| Error::Format(format!("Invalid frame metadata: {}", e)))
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn into_segment(self, ciphertext: Vec<u8>) -> Result<Segment> {
        let params = match (self.km_1, self.km_2) {
            (Some(p), None) => CipherParams::XChaCha20Poly1305(p),
            (None, Some(p)) => CipherParams::Token(p),
            (None, None) => return Err(Error::Format("Frame names no cipher mode".to_string())),
            (Some(_), Some(_)) => {
                return Err(Error::Format("Frame names more than one cipher mode".to_string()))
            }
        };
        params.validate().map_err(|e| Error::Format(e.to_string()))?;

        Ok(Segment {
            offset: self.i,
            owner: self.o,
            params,
            ciphertext,
        })
    }
}

/// A decoded and verified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Layout the line was written in.
    pub layout: FrameLayout,
    /// True when the metadata carried no `v` key.
    pub legacy: bool,
    /// Verified integrity tag.
    pub integrity_tag: Vec<u8>,
    pub segment: Segment,
}

/// Encodes segments into frame lines and decodes them back.
pub struct FrameCodec<'a> {
    layout: FrameLayout,
    key: &'a FrameAuthKey,
}

impl<'a> FrameCodec<'a> {
    /// Create a codec that writes `layout` and reads both layouts.
    pub fn new(layout: FrameLayout, key: &'a FrameAuthKey) -> Self {
        Self { layout, key }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Encode a segment as one frame line, without line terminator.
    ///
    /// # Postconditions
    /// - Output is pure ASCII and contains no newline
    pub fn encode(&self, segment: &Segment) -> Result<String> {
        let mut meta = FrameMeta::for_segment(segment, self.layout);
        let chunk_b64 = WIRE_BASE64.encode(&segment.ciphertext);

        match self.layout {
            FrameLayout::Authenticated => {
                let mut message = meta.to_json()?;
                message.extend_from_slice(chunk_b64.as_bytes());
                meta.h = Some(hex::encode(frame_tag(self.key, &message)?));

                let meta_b64 = WIRE_BASE64.encode(meta.to_json()?);
                Ok(format!("{}|{}", meta_b64, chunk_b64))
            }
            FrameLayout::ContentHash => {
                let meta_b64 = WIRE_BASE64.encode(meta.to_json()?);
                let tag = content_hash(format!("{}{}", meta_b64, chunk_b64).as_bytes());
                Ok(format!("{}|{}|{}", hex::encode(tag), meta_b64, chunk_b64))
            }
        }
    }

    /// Decode and verify one frame line.
    ///
    /// # Errors
    /// - Returns `Format` for any malformed field, tag mismatch, metadata
    ///   shape violation or unrecognized cipher mode
    pub fn decode(&self, line: &[u8]) -> Result<Frame> {
        let line = line.trim_ascii_end();
        if !line.is_ascii() {
            return Err(Error::Format("Frame line is not ASCII".to_string()));
        }

        let fields: Vec<&[u8]> = line.split(|&b| b == FIELD_SEPARATOR).collect();
        let layout = FrameLayout::from_field_count(fields.len()).ok_or_else(|| {
            Error::Format(format!("Frame line has {} fields", fields.len()))
        })?;

        let (meta, integrity_tag, chunk_b64) = match layout {
            FrameLayout::Authenticated => {
                let (meta, tag) = self.verify_authenticated(fields[0], fields[1])?;
                (meta, tag, fields[1])
            }
            FrameLayout::ContentHash => {
                let (meta, tag) = verify_content_hashed(fields[0], fields[1], fields[2])?;
                (meta, tag, fields[2])
            }
        };

        let legacy = match meta.v.as_deref() {
            None => true,
            Some(v) if FrameLayout::from_tag(v) == Some(layout) => false,
            Some(v) => {
                return Err(Error::Format(format!(
                    "Frame layout tag {:?} does not match a {}-field line",
                    v,
                    fields.len()
                )))
            }
        };

        let ciphertext = decode_base64(chunk_b64)?;
        let segment = meta.into_segment(ciphertext)?;

        Ok(Frame {
            layout,
            legacy,
            integrity_tag,
            segment,
        })
    }

    fn verify_authenticated(&self, meta_b64: &[u8], chunk_b64: &[u8]) -> Result<(FrameMeta, Vec<u8>)> {
        let raw = decode_base64(meta_b64)?;
        let mut meta = FrameMeta::parse(&raw)?;
        let tag_hex = meta
            .h
            .take()
            .ok_or_else(|| Error::Format("Authenticated frame has no tag".to_string()))?;
        let tag = decode_tag(&tag_hex)?;

        let mut message = meta.to_json()?;
        message.extend_from_slice(chunk_b64);
        if !verify_frame_tag(self.key, &message, &tag)? {
            return Err(Error::Format("Frame authentication failed".to_string()));
        }

        // The tag covers the canonical form, so any other spelling of the
        // same metadata is rejected.
        meta.h = Some(tag_hex);
        if meta.to_json()? != raw {
            return Err(Error::Format("Frame metadata is not canonical".to_string()));
        }
        meta.h = None;

        Ok((meta, tag))
    }
}

fn verify_content_hashed(tag_hex: &[u8], meta_b64: &[u8], chunk_b64: &[u8]) -> Result<(FrameMeta, Vec<u8>)> {
    let tag = std::str::from_utf8(tag_hex)
        .map_err(|_| Error::Format("Frame tag is not ASCII".to_string()))
        .and_then(decode_tag)?;

    let message = [meta_b64, chunk_b64].concat();
    if !verify_content_hash(&message, &tag) {
        return Err(Error::Format("Frame content hash mismatch".to_string()));
    }

    let meta = FrameMeta::parse(&decode_base64(meta_b64)?)?;
    if meta.h.is_some() {
        return Err(Error::Format("Content-hash frame carries an authentication tag".to_string()));
    }
    Ok((meta, tag))
}

/// Tags are accepted in lowercase hex only, so each tag has one spelling.
fn decode_tag(tag_hex: &str) -> Result<Vec<u8>> {
    let well_formed = tag_hex.len() == FRAME_TAG_SIZE * 2
        && tag_hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !well_formed {
        return Err(Error::Format("Malformed frame tag".to_string()));
    }
    hex::decode(tag_hex).map_err(|e| Error::Format(format!("Malformed frame tag: {}", e)))
}

fn decode_base64(field: &[u8]) -> Result<Vec<u8>> {
    WIRE_BASE64
        .decode(field)
        .map_err(|e| Error::Format(format!("Invalid base64 field: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::encrypt_object;
    use framevault_common::{ObjectId, OBJECT_ID_LENGTH};
    use framevault_crypto::{expand_master_key, CipherMode, MasterKey, VaultKeys, MASTER_KEY_LENGTH};

    fn keys() -> VaultKeys {
        expand_master_key(&MasterKey::from_bytes([8u8; MASTER_KEY_LENGTH]))
    }

    fn segment(mode: CipherMode) -> Segment {
        let owner = ObjectRef::Object(ObjectId::from_digest(&[0x2c; OBJECT_ID_LENGTH]).unwrap());
        encrypt_object(b"frame payload", &owner, 2048, mode, &keys())
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_layout_tags() {
        assert_eq!(FrameLayout::from_tag("a1"), Some(FrameLayout::Authenticated));
        assert_eq!(FrameLayout::from_tag("h1"), Some(FrameLayout::ContentHash));
        assert_eq!(FrameLayout::from_tag("x9"), None);
        assert_eq!(FrameLayout::from_field_count(3), Some(FrameLayout::ContentHash));
        assert_eq!(FrameLayout::from_field_count(4), None);
    }

    #[test]
    fn test_encode_decode_every_layout_and_mode() {
        let keys = keys();
        for layout in FrameLayout::ALL {
            let codec = FrameCodec::new(layout, keys.frame_authentication_key());
            for mode in CipherMode::ALL {
                let original = segment(mode);
                let line = codec.encode(&original).unwrap();

                assert!(line.is_ascii());
                assert!(!line.contains('\n'));
                assert_eq!(line.split('|').count(), layout.field_count());

                let frame = codec.decode(line.as_bytes()).unwrap();
                assert_eq!(frame.layout, layout);
                assert!(!frame.legacy);
                assert_eq!(frame.integrity_tag.len(), FRAME_TAG_SIZE);
                assert_eq!(frame.segment, original);
            }
        }
    }

    #[test]
    fn test_decoder_reads_both_layouts() {
        let keys = keys();
        let writer = FrameCodec::new(FrameLayout::ContentHash, keys.frame_authentication_key());
        let reader = FrameCodec::new(FrameLayout::Authenticated, keys.frame_authentication_key());

        let line = writer.encode(&segment(CipherMode::default())).unwrap();
        assert_eq!(reader.decode(line.as_bytes()).unwrap().layout, FrameLayout::ContentHash);
    }

    #[test]
    fn test_bookkeeping_owner() {
        let keys = keys();
        let codec = FrameCodec::new(FrameLayout::Authenticated, keys.frame_authentication_key());
        let segments = encrypt_object(b"{}", &ObjectRef::Bookkeeping, 2048, CipherMode::Token, &keys).unwrap();

        let line = codec.encode(&segments[0]).unwrap();
        let frame = codec.decode(line.as_bytes()).unwrap();
        assert_eq!(frame.segment.owner, ObjectRef::Bookkeeping);
    }

    #[test]
    fn test_any_bit_flip_is_rejected() {
        let keys = keys();
        for layout in FrameLayout::ALL {
            let codec = FrameCodec::new(layout, keys.frame_authentication_key());
            let line = codec.encode(&segment(CipherMode::default())).unwrap().into_bytes();

            for position in 0..line.len() {
                for bit in 0..8 {
                    let mut tampered = line.clone();
                    tampered[position] ^= 1 << bit;
                    assert!(
                        codec.decode(&tampered).is_err(),
                        "{:?} accepted flip of bit {} at {}",
                        layout,
                        bit,
                        position
                    );
                }
            }
        }
    }

    #[test]
    fn test_wrong_frame_key_rejected() {
        let codec_keys = keys();
        let other_keys = expand_master_key(&MasterKey::from_bytes([9u8; MASTER_KEY_LENGTH]));

        let line = FrameCodec::new(FrameLayout::Authenticated, codec_keys.frame_authentication_key())
            .encode(&segment(CipherMode::default()))
            .unwrap();
        let reader = FrameCodec::new(FrameLayout::Authenticated, other_keys.frame_authentication_key());

        assert!(reader.decode(line.as_bytes()).unwrap_err().is_format());
    }

    #[test]
    fn test_trailing_newline_and_missing_padding() {
        let keys = keys();
        let codec = FrameCodec::new(FrameLayout::Authenticated, keys.frame_authentication_key());
        let line = codec.encode(&segment(CipherMode::Token)).unwrap();

        assert!(codec.decode(format!("{}\r\n", line).as_bytes()).is_ok());

        // The tag covers the chunk text, so only the metadata field may lose padding.
        let (meta_b64, chunk_b64) = line.split_once('|').unwrap();
        let unpadded = format!("{}|{}", meta_b64.trim_end_matches('='), chunk_b64);
        assert!(codec.decode(unpadded.as_bytes()).is_ok());
    }

    fn content_hash_line(meta_json: &str, chunk: &[u8]) -> String {
        let meta_b64 = WIRE_BASE64.encode(meta_json);
        let chunk_b64 = WIRE_BASE64.encode(chunk);
        let tag = content_hash(format!("{}{}", meta_b64, chunk_b64).as_bytes());
        format!("{}|{}|{}", hex::encode(tag), meta_b64, chunk_b64)
    }

    #[test]
    fn test_legacy_frame_without_layout_tag() {
        let keys = keys();
        let codec = FrameCodec::new(FrameLayout::ContentHash, keys.frame_authentication_key());
        let meta = format!(r#"{{"i":4096,"o":"vibk","km_1":{{"n":"{}"}}}}"#, "ab".repeat(24));

        let frame = codec.decode(content_hash_line(&meta, &[0u8; 20]).as_bytes()).unwrap();
        assert!(frame.legacy);
        assert_eq!(frame.segment.offset, 4096);
        assert_eq!(frame.segment.mode(), CipherMode::XChaCha20Poly1305);
    }

    fn authenticated_line(meta_json: &str, chunk_b64: &str, key: &FrameAuthKey) -> String {
        let tag = frame_tag(key, format!("{}{}", meta_json, chunk_b64).as_bytes()).unwrap();
        let (open, _) = meta_json.rsplit_once('}').unwrap();
        let signed = format!(r#"{},"h":"{}"}}"#, open, hex::encode(tag));
        format!("{}|{}", WIRE_BASE64.encode(signed), chunk_b64)
    }

    fn legacy_meta(segment: &Segment) -> String {
        let CipherParams::XChaCha20Poly1305(params) = &segment.params else {
            panic!("expected an XChaCha20-Poly1305 segment");
        };
        format!(
            r#"{{"i":{},"o":"{}","km_1":{}}}"#,
            segment.offset,
            segment.owner,
            serde_json::to_string(params).unwrap()
        )
    }

    #[test]
    fn test_legacy_authenticated_frame() {
        let keys = keys();
        let key = keys.frame_authentication_key();
        let codec = FrameCodec::new(FrameLayout::Authenticated, key);
        let original = segment(CipherMode::XChaCha20Poly1305);
        let chunk_b64 = WIRE_BASE64.encode(&original.ciphertext);

        let line = authenticated_line(&legacy_meta(&original), &chunk_b64, key);
        let frame = codec.decode(line.as_bytes()).unwrap();

        assert_eq!(frame.layout, FrameLayout::Authenticated);
        assert!(frame.legacy);
        assert_eq!(frame.segment, original);
    }

    #[test]
    fn test_spaced_legacy_metadata_rejected() {
        let keys = keys();
        let key = keys.frame_authentication_key();
        let codec = FrameCodec::new(FrameLayout::Authenticated, key);
        let original = segment(CipherMode::XChaCha20Poly1305);
        let chunk_b64 = WIRE_BASE64.encode(&original.ciphertext);

        // Same fields, but with separators spaced as some JSON writers emit them.
        let spaced = legacy_meta(&original).replace(':', ": ").replace(',', ", ");
        let line = authenticated_line(&spaced, &chunk_b64, key);

        assert!(codec.decode(line.as_bytes()).unwrap_err().is_format());
    }

    #[test]
    fn test_metadata_shape_violations() {
        let keys = keys();
        let codec = FrameCodec::new(FrameLayout::ContentHash, keys.frame_authentication_key());
        let nonce = "ab".repeat(24);
        let iv = "cd".repeat(16);

        let cases = [
            // layout tag disagrees with field count
            format!(r#"{{"i":0,"o":"vibk","km_1":{{"n":"{}"}},"v":"a1"}}"#, nonce),
            // negative offset
            format!(r#"{{"i":-1,"o":"vibk","km_1":{{"n":"{}"}}}}"#, nonce),
            // missing owner
            format!(r#"{{"i":0,"km_1":{{"n":"{}"}}}}"#, nonce),
            // malformed owner
            format!(r#"{{"i":0,"o":"nobody","km_1":{{"n":"{}"}}}}"#, nonce),
            // no cipher mode
            r#"{"i":0,"o":"vibk"}"#.to_string(),
            // two cipher modes
            format!(r#"{{"i":0,"o":"vibk","km_1":{{"n":"{}"}},"km_2":{{"iv":"{}"}}}}"#, nonce, iv),
            // unrecognized cipher mode
            format!(r#"{{"i":0,"o":"vibk","km_3":{{"n":"{}"}}}}"#, nonce),
            // short nonce
            r#"{"i":0,"o":"vibk","km_1":{"n":"abcd"}}"#.to_string(),
        ];

        for meta in cases {
            let result = codec.decode(content_hash_line(&meta, b"x").as_bytes());
            assert!(result.unwrap_err().is_format(), "accepted {}", meta);
        }
    }

    #[test]
    fn test_wrong_field_counts() {
        let keys = keys();
        let codec = FrameCodec::new(FrameLayout::Authenticated, keys.frame_authentication_key());
        assert!(codec.decode(b"onlyonefield").is_err());
        assert!(codec.decode(b"a|b|c|d").is_err());
        assert!(codec.decode(b"").is_err());
    }
}
