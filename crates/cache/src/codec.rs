//! Serialization of analyzer results.
//!
//! Results are stored as JSON. The format only has to stay stable for as long
//! as one version marker is in use; a new analyzer version wipes the store.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).or_raise(|| ErrorKind::InvalidData)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).or_raise(|| ErrorKind::InvalidData)
}
