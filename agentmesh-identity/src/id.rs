//! Agent ID derivation from public keys.

use sha2::{Digest, Sha256};

use crate::error::SecurityError;

/// Prefix of the decentralized identifier form.
pub const DID_PREFIX: &str = "did:agent:";

/// Number of hash bytes kept in the short ID form.
pub const ID_BYTES: usize = 20;

/// Derives the agent ID for a base64 public key.
///
/// The ID is computed as:
///
/// ```text
/// id = hex(SHA256(public_key_base64)[..20])
/// ```
///
/// The hash is taken over the key's textual form, so two encodings of the
/// same key bytes give different IDs. Always pass the canonical base64.
///
/// # Examples
///
/// ```
/// use agentmesh_identity::{SigningKey, derive_id};
///
/// let public_key = SigningKey::generate().verifying_key().to_base64();
/// let id = derive_id(&public_key);
///
/// assert_eq!(id.len(), 40);
/// assert_eq!(id, derive_id(&public_key));
/// ```
#[must_use]
pub fn derive_id(public_key: &str) -> String {
    let digest = Sha256::digest(public_key.as_bytes());
    hex::encode(&digest[..ID_BYTES])
}

/// Derives the `did:agent:` identifier for a base64 public key.
///
/// Uses the full 32-byte digest.
#[must_use]
pub fn derive_did(public_key: &str) -> String {
    let digest = Sha256::digest(public_key.as_bytes());
    format!("{DID_PREFIX}{}", hex::encode(digest))
}

/// Returns true if `id` is the identifier derived from `public_key`.
///
/// Both the short hex form and the `did:agent:` form are accepted. An
/// empty key never validates.
#[must_use]
pub fn validate_id(id: &str, public_key: &str) -> bool {
    if public_key.is_empty() {
        return false;
    }
    if id.starts_with(DID_PREFIX) {
        id == derive_did(public_key)
    } else {
        id == derive_id(public_key)
    }
}

/// Checks that `id` is bound to `public_key`.
///
/// # Errors
///
/// Returns `SecurityError::IdMismatch` with the expected ID when the check
/// in [`validate_id`] fails.
pub fn ensure_id_matches(id: &str, public_key: &str) -> Result<(), SecurityError> {
    if validate_id(id, public_key) {
        return Ok(());
    }
    let expected = if id.starts_with(DID_PREFIX) {
        derive_did(public_key)
    } else {
        derive_id(public_key)
    };
    Err(SecurityError::id_mismatch(id, expected))
}
