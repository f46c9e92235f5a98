use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;

/// SHA-256 digest of the logically relevant parts of a request.
///
/// Two requests share a fingerprint when they use the same method, the same
/// path and a body that is identical after canonicalization. Query strings
/// and headers do not participate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a request.
    pub fn compute(method: &str, path: &str, body: &[u8]) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b"|");
        hasher.update(path.as_bytes());
        hasher.update(b"|");
        hasher.update(canonical_body(body).as_ref());

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the canonical byte form of a request body.
///
/// JSON bodies are re-serialized compactly with object keys sorted, so that
/// key order and whitespace do not change the fingerprint. Anything that is
/// not JSON is used verbatim.
pub fn canonical_body(body: &[u8]) -> Cow<'_, [u8]> {
    if body.is_empty() {
        return Cow::Borrowed(body);
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => match serde_json::to_vec(&sort_keys(value)) {
            Ok(bytes) => Cow::Owned(bytes),
            Err(_) => Cow::Borrowed(body),
        },
        Err(_) => Cow::Borrowed(body),
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, sort_keys(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
