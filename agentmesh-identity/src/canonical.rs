//! Canonical JSON encoding and body hashing.
//!
//! Signatures are computed over the canonical form: object keys sorted
//! lexicographically, no insignificant whitespace, and `null` members
//! removed at every depth.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::SecurityError;

/// Encodes a JSON value in canonical form.
///
/// # Examples
///
/// ```
/// use agentmesh_identity::canonical_json;
/// use serde_json::json;
///
/// let value = json!({"b": 1, "a": {"d": null, "c": [true]}});
/// assert_eq!(canonical_json(&value), r#"{"a":{"c":[true]},"b":1}"#);
/// ```
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Serializes any value and encodes it in canonical form.
///
/// # Errors
///
/// Returns `SecurityError::Encoding` if the value cannot be represented
/// as JSON.
pub fn to_canonical<T: Serialize + ?Sized>(value: &T) -> Result<String, SecurityError> {
    let value = serde_json::to_value(value).map_err(|e| SecurityError::Encoding {
        reason: e.to_string(),
    })?;
    Ok(canonical_json(&value))
}

/// Returns the lowercase hex SHA-256 of a raw request body.
#[must_use]
pub fn hash_body(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Returns the lowercase hex SHA-256 of a JSON body in canonical form.
#[must_use]
pub fn hash_json(value: &Value) -> String {
    hash_body(canonical_json(value).as_bytes())
}

// Keys are sorted here rather than trusting the map type, whose order
// depends on serde_json's `preserve_order` feature.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let members: BTreeMap<&str, &Value> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.as_str(), v))
                .collect();
            out.push('{');
            for (i, (key, member)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key).to_string());
                out.push(':');
                write_canonical(member, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
