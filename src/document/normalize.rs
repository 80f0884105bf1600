/// Canonical serialization of JSON documents before hashing.
use serde_json::{Map, Value};

use crate::error::Result;

/// Turns a document into the exact bytes that get hashed.
///
/// Implementations must be deterministic: equal documents produce equal
/// bytes regardless of key order in the input.
pub trait DocumentNormalizer: Send + Sync {
    fn normalize(&self, document: &Value) -> Result<Vec<u8>>;
}

/// Compact JSON with object keys in sorted order at every depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalJson;

impl DocumentNormalizer for CanonicalJson {
    fn normalize(&self, document: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&sorted(document))?)
    }
}

// Rebuilt explicitly so the output does not depend on whether
// serde_json's `preserve_order` feature is enabled in the build.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
