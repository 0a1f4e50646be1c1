//! Payload codec and deep-copy isolation.
//!
//! Payloads are stored as JSON bytes and decoded fresh on every read. The
//! round-trip is what guarantees isolation: a caller mutating a returned
//! value can never reach the bytes the cache holds, and two callers never
//! share structure with each other.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::LarderError;

/// Encode a payload into its stored byte form.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LarderError> {
    serde_json::to_vec(value).map_err(|e| LarderError::DeepCopy {
        cause: e.to_string(),
    })
}

/// Decode stored bytes into a fresh, structurally independent payload.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LarderError> {
    serde_json::from_slice(bytes).map_err(|e| LarderError::DeepCopy {
        cause: e.to_string(),
    })
}

/// Produce a structurally independent copy of a value.
pub fn deep_copy<T: Serialize + DeserializeOwned>(value: &T) -> Result<T, LarderError> {
    decode(&encode(value)?)
}
