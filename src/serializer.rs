//! # Key/Value Serializers
//!
//! The seam that keeps keys and values opaque to the pipeline. Everything
//! past the proxy's public surface works on serialized bytes: equality is
//! byte equality, hashing runs over the serialized form, and the wire
//! carries the bytes untouched. A serializer failure surfaces to the caller
//! untranslated as [`Error::Serialization`].

use crate::error::{Error, Result};

/// Converts a caller type to and from its canonical byte form.
///
/// Implementations must be deterministic: the same value must serialize to
/// the same bytes every time, because those bytes define both equality and
/// the bucket the key lives in.
pub trait Serializer<T>: Send + Sync {
    /// Serialize a value into its canonical bytes
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;

    /// Reconstruct a value from bytes previously produced by `serialize`
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// UTF-8 serializer for `String` keys and values
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl Serializer<String> for StringSerializer {
    fn serialize(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::serialization(format!("invalid UTF-8 value: {}", e)))
    }
}

/// Identity serializer for raw byte keys and values
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerializer;

impl Serializer<Vec<u8>> for BytesSerializer {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_roundtrip() {
        let s = StringSerializer;
        let bytes = s.serialize(&"héllo".to_string()).unwrap();
        assert_eq!(s.deserialize(&bytes).unwrap(), "héllo");
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let s = StringSerializer;
        let err = s.deserialize(&[0, 159, 146, 150]).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_bytes_identity() {
        let s = BytesSerializer;
        let raw = vec![0u8, 255, 7];
        assert_eq!(s.serialize(&raw).unwrap(), raw);
        assert_eq!(s.deserialize(&raw).unwrap(), raw);
    }
}
