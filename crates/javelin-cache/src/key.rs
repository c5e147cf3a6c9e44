use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Width of a [`ContentKey`] in bytes.
pub const CONTENT_KEY_LEN: usize = 32;

/// A fixed-width, SHA-256-derived content key.
///
/// Two byte sequences with equal keys are treated as byte-identical for cache
/// purposes; the key is the sole identity of content-addressed entries (no
/// path or timestamp is mixed in). Keys are computed by the producers of
/// cached artifacts (the class-file and classpath analyzers) and handed to
/// the cache fully formed; the cache never hashes file contents itself.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentKey([u8; CONTENT_KEY_LEN]);

impl ContentKey {
    /// Compute the content key of an arbitrary byte slice.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_ref());
        Self(hasher.finalize().into())
    }

    /// The fixed-width binary encoding of this key.
    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_LEN] {
        &self.0
    }

    /// Reconstruct a key from its fixed-width binary encoding.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CacheError> {
        let bytes: [u8; CONTENT_KEY_LEN] =
            bytes.try_into().map_err(|_| CacheError::Format {
                message: format!(
                    "content key must be {CONTENT_KEY_LEN} bytes, got {}",
                    bytes.len()
                ),
            })?;
        Ok(Self(bytes))
    }

    /// Render the key as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a key from its lowercase hex rendering.
    pub fn from_hex(s: &str) -> Result<Self, CacheError> {
        let bytes = hex::decode(s).map_err(|err| CacheError::Format {
            message: format!("invalid content key hex: {err}"),
        })?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = ContentKey::from_bytes(b"class Foo {}");
        let b = ContentKey::from_bytes(b"class Foo {}");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_differs() {
        let a = ContentKey::from_bytes(b"class Foo {}");
        let b = ContentKey::from_bytes(b"class Bar {}");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_roundtrip() {
        let key = ContentKey::from_bytes(b"jar bytes");
        let hex = key.to_hex();
        assert_eq!(hex.len(), CONTENT_KEY_LEN * 2);
        assert_eq!(ContentKey::from_hex(&hex).unwrap(), key);
    }

    #[test]
    fn slice_roundtrip() {
        let key = ContentKey::from_bytes(b"entry");
        let back = ContentKey::from_slice(key.as_bytes()).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn wrong_length_is_format_error() {
        let err = ContentKey::from_slice(&[0_u8; 16]).unwrap_err();
        assert!(matches!(err, CacheError::Format { .. }));
    }

    #[test]
    fn invalid_hex_is_format_error() {
        let err = ContentKey::from_hex("not hex at all").unwrap_err();
        assert!(matches!(err, CacheError::Format { .. }));
    }

    #[test]
    fn display_is_hex() {
        let key = ContentKey::from_bytes(b"display");
        assert_eq!(format!("{key}"), key.to_hex());
    }

    #[test]
    fn serde_roundtrip() {
        let key = ContentKey::from_bytes(b"serde");
        let json = serde_json::to_string(&key).unwrap();
        let back: ContentKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
