use crate::error::{CacheError, Result};
use crate::key::ContentKey;
use crate::util::{bincode_deserialize, bincode_serialize};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Byte codec for a cache key or value, injected per store instance.
///
/// Every persistent table carries one serializer for its keys and one for its
/// values, so each named sub-cache can store a different shape without the
/// store layer knowing anything about it.
pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// Bincode codec for any serde-capable type.
///
/// Uses fixed-int little-endian options with a hard payload limit; decode
/// failures surface as [`CacheError::Format`] and are degraded to misses by
/// the store layer.
pub struct BincodeSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer<T> for BincodeSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        bincode_serialize(value)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        bincode_deserialize(bytes)
    }
}

/// UTF-8 codec for `String` keys (work-unit identifiers).
pub struct StringSerializer;

impl Serializer<String> for StringSerializer {
    fn serialize(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|err| CacheError::Format {
            message: format!("invalid utf-8 in string key: {err}"),
        })
    }
}

/// Fixed-width codec for [`ContentKey`] keys.
pub struct ContentKeySerializer;

impl Serializer<ContentKey> for ContentKeySerializer {
    fn serialize(&self, value: &ContentKey) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<ContentKey> {
        ContentKey::from_slice(bytes)
    }
}
