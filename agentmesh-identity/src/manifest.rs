//! Manifest signatures.
//!
//! A manifest is the JSON object of an agent's declared fields. Server-
//! managed fields are removed before signing, so the registry can update
//! health, trust, and timestamps without invalidating the signature.

use serde_json::Value;

use crate::canonical::canonical_json;
use crate::error::SecurityError;
use crate::keys::{SigningKey, VerifyingKey};

/// Top-level fields never covered by a manifest signature.
pub const MANIFEST_EXCLUDED_FIELDS: &[&str] = &[
    "public_key",
    "manifest_signature",
    "signature",
    "created_at",
    "updated_at",
    "trust_score",
    "health_status",
    "last_heartbeat",
];

/// Returns the canonical bytes a manifest signature covers.
#[must_use]
pub fn manifest_payload(manifest: &Value) -> String {
    match manifest {
        Value::Object(map) => {
            let declared: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !MANIFEST_EXCLUDED_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            canonical_json(&Value::Object(declared))
        }
        other => canonical_json(other),
    }
}

/// Signs a manifest and returns the `ed25519:<base64>` signature.
///
/// # Examples
///
/// ```
/// use agentmesh_identity::{SigningKey, sign_manifest, verify_manifest};
/// use serde_json::json;
///
/// let key = SigningKey::generate();
/// let public_key = key.verifying_key().to_base64();
/// let manifest = json!({"name": "summarizer", "version": "1.0.0"});
///
/// let signature = sign_manifest(&key, &manifest);
/// assert!(verify_manifest(&manifest, Some(&signature), Some(&public_key)).is_ok());
/// ```
#[must_use]
pub fn sign_manifest(key: &SigningKey, manifest: &Value) -> String {
    key.sign(manifest_payload(manifest).as_bytes())
}

/// Verifies a manifest signature against a base64 public key.
///
/// # Errors
///
/// - `MissingSignature` if either the signature or the key is absent or empty
/// - `InvalidKeyFormat` if the key or signature cannot be decoded
/// - `InvalidSignature` if the signature does not cover this manifest
pub fn verify_manifest(
    manifest: &Value,
    signature: Option<&str>,
    public_key: Option<&str>,
) -> Result<(), SecurityError> {
    let signature = signature
        .filter(|s| !s.is_empty())
        .ok_or(SecurityError::MissingSignature {
            field: "manifest_signature",
        })?;
    let public_key = public_key
        .filter(|k| !k.is_empty())
        .ok_or(SecurityError::MissingSignature {
            field: "public_key",
        })?;

    let key = VerifyingKey::from_base64(public_key)?;
    key.verify(manifest_payload(manifest).as_bytes(), signature)
}

/// Returns true if the manifest signature verifies.
#[must_use]
pub fn verify_manifest_signature(
    manifest: &Value,
    signature: Option<&str>,
    public_key: Option<&str>,
) -> bool {
    verify_manifest(manifest, signature, public_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> Value {
        json!({
            "id": "abc",
            "name": "translator",
            "version": "2.1.0",
            "skills": [{"name": "translate", "description": "en to fr"}],
            "trust_score": 0.5,
            "health_status": "unknown",
            "updated_at": "2024-01-01T00:00:00Z",
        })
    }

    #[test]
    fn excluded_fields_do_not_affect_payload() {
        let mut changed = manifest();
        changed["trust_score"] = json!(0.9);
        changed["health_status"] = json!("healthy");
        changed["updated_at"] = json!("2025-06-01T00:00:00Z");

        assert_eq!(manifest_payload(&manifest()), manifest_payload(&changed));
    }

    #[test]
    fn declared_field_change_breaks_signature() {
        let key = SigningKey::generate();
        let public_key = key.verifying_key().to_base64();
        let signature = sign_manifest(&key, &manifest());

        let mut tampered = manifest();
        tampered["name"] = json!("impostor");

        assert_eq!(
            verify_manifest(&tampered, Some(&signature), Some(&public_key)),
            Err(SecurityError::InvalidSignature)
        );
    }

    #[test]
    fn missing_signature_is_reported() {
        let result = verify_manifest(&manifest(), None, Some("key"));
        assert_eq!(
            result,
            Err(SecurityError::MissingSignature {
                field: "manifest_signature"
            })
        );
    }

    #[test]
    fn empty_public_key_is_missing() {
        let result = verify_manifest(&manifest(), Some("ed25519:AAAA"), Some(""));
        assert_eq!(
            result,
            Err(SecurityError::MissingSignature {
                field: "public_key"
            })
        );
    }
}
