//! Common types used throughout framevault.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroize;

/// Owner value reserved for vault-internal bookkeeping frames.
pub const BOOKKEEPING_SENTINEL: &str = "vibk";

/// Length of an object id digest in bytes (384-bit keyed hash).
pub const OBJECT_ID_LENGTH: usize = 48;

/// Content-addressed identifier of a vault object.
///
/// Always the lowercase hex form of a 384-bit keyed fingerprint of the
/// object's plaintext.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Create an ObjectId from raw digest bytes.
    ///
    /// # Errors
    /// - Returns error if the digest is not OBJECT_ID_LENGTH bytes
    pub fn from_digest(digest: &[u8]) -> crate::Result<Self> {
        if digest.len() != OBJECT_ID_LENGTH {
            return Err(crate::Error::InvalidInput(format!(
                "Object id digest must be {} bytes, got {}",
                OBJECT_ID_LENGTH,
                digest.len()
            )));
        }
        Ok(Self(hex::encode(digest)))
    }

    /// Parse an ObjectId from its hex form.
    ///
    /// # Errors
    /// - Returns error if the string is not lowercase hex of the right length
    pub fn parse(id: &str) -> crate::Result<Self> {
        let well_formed = id.len() == OBJECT_ID_LENGTH * 2
            && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(crate::Error::InvalidInput(format!(
                "Malformed object id: {:.16}",
                id
            )));
        }
        Ok(Self(id.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log output.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Owner of a segment: a content object or the vault bookkeeping record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ObjectRef {
    Object(ObjectId),
    Bookkeeping,
}

impl ObjectRef {
    /// Parse the `o` value of a frame.
    pub fn parse(value: &str) -> crate::Result<Self> {
        if value == BOOKKEEPING_SENTINEL {
            Ok(Self::Bookkeeping)
        } else {
            ObjectId::parse(value).map(Self::Object)
        }
    }

    /// The object id, unless this is the bookkeeping record.
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Object(id) => Some(id),
            Self::Bookkeeping => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Object(id) => id.as_str(),
            Self::Bookkeeping => BOOKKEEPING_SENTINEL,
        }
    }

    /// Shortened form for log output.
    pub fn short(&self) -> &str {
        match self {
            Self::Object(id) => id.short(),
            Self::Bookkeeping => BOOKKEEPING_SENTINEL,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ObjectId> for ObjectRef {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

impl TryFrom<String> for ObjectRef {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectRef> for String {
    fn from(owner: ObjectRef) -> Self {
        owner.as_str().to_string()
    }
}

/// A user-facing path name inside the vault.
///
/// Names are normalized POSIX-style on construction: repeated and trailing
/// separators collapse, `.` is dropped and `..` pops a component (never past
/// the root). Relative names are anchored at the root, so `a.txt`, `/a.txt`
/// and `/x/../a.txt` are the same virtual file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VirtualName {
    components: Vec<String>,
}

impl VirtualName {
    /// Parse and normalize a virtual path name.
    ///
    /// # Errors
    /// - Returns error if the name normalizes to the root
    /// - Returns error if a component contains a backslash or NUL
    pub fn parse(name: &str) -> crate::Result<Self> {
        let mut components: Vec<String> = Vec::new();
        for comp in name.split('/') {
            match comp {
                "" | "." => {}
                ".." => {
                    components.pop();
                }
                _ => {
                    if comp.contains('\\') || comp.contains('\0') {
                        return Err(crate::Error::InvalidInput(format!(
                            "Invalid character in virtual name component: {:?}",
                            comp
                        )));
                    }
                    components.push(comp.to_string());
                }
            }
        }

        if components.is_empty() {
            return Err(crate::Error::InvalidInput(format!(
                "Virtual name '{}' does not name a file",
                name
            )));
        }

        Ok(Self { components })
    }

    /// Relative filesystem path for extraction under a destination directory.
    pub fn to_relative_path(&self) -> PathBuf {
        self.components.iter().collect()
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        format!("/{}", self.components.join("/"))
    }
}

impl fmt::Display for VirtualName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

impl TryFrom<String> for VirtualName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<VirtualName> for String {
    fn from(name: VirtualName) -> Self {
        name.to_string_path()
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_id() -> ObjectId {
        ObjectId::from_digest(&[0xab; OBJECT_ID_LENGTH]).unwrap()
    }

    #[test]
    fn test_object_id_from_digest() {
        let id = sample_id();
        assert_eq!(id.as_str().len(), 96);
        assert_eq!(id.short(), "abababababab");
    }

    #[test]
    fn test_object_id_wrong_digest_length() {
        assert!(ObjectId::from_digest(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_object_id_parse_rejects_uppercase_and_short() {
        assert!(ObjectId::parse(&"AB".repeat(48)).is_err());
        assert!(ObjectId::parse("abcd").is_err());
        assert!(ObjectId::parse(sample_id().as_str()).is_ok());
    }

    #[test]
    fn test_object_ref_sentinel() {
        assert_eq!(ObjectRef::parse("vibk").unwrap(), ObjectRef::Bookkeeping);
        let owner = ObjectRef::parse(sample_id().as_str()).unwrap();
        assert_eq!(owner.object_id(), Some(&sample_id()));
        assert!(ObjectRef::parse("not-an-id").is_err());
    }

    #[test]
    fn test_virtual_name_normalization() {
        let name = VirtualName::parse("docs//./notes/../a.txt/").unwrap();
        assert_eq!(name.to_string_path(), "/docs/a.txt");
        assert_eq!(name.to_relative_path(), PathBuf::from("docs").join("a.txt"));

        assert_eq!(
            VirtualName::parse("a.txt").unwrap(),
            VirtualName::parse("/a.txt").unwrap()
        );
    }

    #[test]
    fn test_virtual_name_parent_clamped_at_root() {
        let name = VirtualName::parse("/../../etc/passwd").unwrap();
        assert_eq!(name.to_string_path(), "/etc/passwd");
        assert_eq!(name.to_relative_path(), PathBuf::from("etc/passwd"));
    }

    #[test]
    fn test_virtual_name_root_fails() {
        assert!(VirtualName::parse("").is_err());
        assert!(VirtualName::parse("/").is_err());
        assert!(VirtualName::parse("a/..").is_err());
    }

    #[test]
    fn test_virtual_name_serde() {
        let name = VirtualName::parse("/dir/file.bin").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"/dir/file.bin\"");
        let restored: VirtualName = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, name);
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(raw in "[a-c./]{1,24}") {
            if let Ok(name) = VirtualName::parse(&raw) {
                let again = VirtualName::parse(&name.to_string_path()).unwrap();
                prop_assert_eq!(again, name);
            }
        }
    }
}
