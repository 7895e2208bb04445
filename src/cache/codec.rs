//! Payload Codec Module
//!
//! Converts typed values to and from the opaque byte payloads kept in the store.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// JSON payload codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decodes a payload. Failure means the stored bytes are corrupt or were
    /// written for a different type.
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(payload)?)
    }
}
