//! Typed decoding of the object embedded in an admission request

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::MutationError;

/// Decode the raw embedded object into the typed view `K`
///
/// `kind` only labels the error; the dispatcher has already matched it.
pub fn decode_object<K: DeserializeOwned>(object: &Value, kind: &str) -> Result<K, MutationError> {
    K::deserialize(object).map_err(|source| MutationError::Decode {
        kind: kind.to_string(),
        source,
    })
}
