//! Cache key generation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive a key from the request inputs that determine its response.
    ///
    /// Object keys are sorted at every depth before hashing, so two
    /// semantically identical requests always map to the same key.
    pub fn derive(
        method: &str,
        url: &str,
        params: Option<&BTreeMap<String, Value>>,
        body: Option<&Value>,
    ) -> Self {
        let mut parts: BTreeMap<&str, Value> = BTreeMap::new();
        parts.insert("method", Value::String(method.to_ascii_uppercase()));
        parts.insert("url", Value::String(url.to_string()));
        if let Some(params) = params {
            let params: serde_json::Map<String, Value> = params
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            parts.insert("params", Value::Object(params));
        }
        if let Some(body) = body {
            parts.insert("body", canonicalize(body));
        }
        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
