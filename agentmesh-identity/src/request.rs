//! Signed request (handshake) verification.
//!
//! A request signature covers the string
//!
//! ```text
//! METHOD|path|timestamp|body_hash
//! ```
//!
//! with the method upper-cased and the fields in that fixed order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SecurityError;
use crate::keys::{SigningKey, VerifyingKey};
use crate::replay::check_timestamp_at;

/// Builds the canonical string a request signature covers.
///
/// # Examples
///
/// ```
/// use agentmesh_identity::canonical_request_string;
///
/// let s = canonical_request_string("post", "/agents", "2024-01-01T00:00:00Z", "abc");
/// assert_eq!(s, "POST|/agents|2024-01-01T00:00:00Z|abc");
/// ```
#[must_use]
pub fn canonical_request_string(method: &str, path: &str, timestamp: &str, body_hash: &str) -> String {
    format!("{}|{path}|{timestamp}|{body_hash}", method.to_uppercase())
}

/// Signs a request and returns the `ed25519:<base64>` signature.
#[must_use]
pub fn sign_request(
    key: &SigningKey,
    method: &str,
    path: &str,
    timestamp: &str,
    body_hash: &str,
) -> String {
    key.sign(canonical_request_string(method, path, timestamp, body_hash).as_bytes())
}

/// Returns true if `signature` is a valid request signature by `public_key`.
///
/// Malformed keys or signatures return false. This does not check the
/// timestamp; see [`SignedRequest::verify`] for the full check.
#[must_use]
pub fn verify_request_signature(
    method: &str,
    path: &str,
    timestamp: &str,
    body_hash: &str,
    signature: &str,
    public_key: &str,
) -> bool {
    let Ok(key) = VerifyingKey::from_base64(public_key) else {
        return false;
    };
    key.verify(
        canonical_request_string(method, path, timestamp, body_hash).as_bytes(),
        signature,
    )
    .is_ok()
}

/// The handshake headers of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    /// ID of the agent claiming to have signed the request.
    pub agent_id: String,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Lowercase hex SHA-256 of the body.
    pub body_hash: String,
    /// `ed25519:<base64>` signature.
    pub signature: String,
}

impl SignedRequest {
    /// Signs a request now, as the given agent.
    #[must_use]
    pub fn sign(
        key: &SigningKey,
        agent_id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        body_hash: impl Into<String>,
    ) -> Self {
        Self::sign_at(key, agent_id, method, path, body_hash, Utc::now())
    }

    /// Signs a request with an explicit timestamp.
    #[must_use]
    pub fn sign_at(
        key: &SigningKey,
        agent_id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        body_hash: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let method = method.into();
        let path = path.into();
        let body_hash = body_hash.into();
        let timestamp = at.to_rfc3339();
        let signature = sign_request(key, &method, &path, &timestamp, &body_hash);
        Self {
            agent_id: agent_id.into(),
            method,
            path,
            timestamp,
            body_hash,
            signature,
        }
    }

    /// Returns the canonical string this request's signature covers.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        canonical_request_string(&self.method, &self.path, &self.timestamp, &self.body_hash)
    }

    /// Verifies the replay window and the signature against `public_key`.
    ///
    /// # Errors
    ///
    /// - `MissingSignature` if the signature is empty
    /// - `InvalidTimestamp` / `StaleTimestamp` from the replay window
    /// - `InvalidKeyFormat` if the key or signature is malformed
    /// - `InvalidSignature` if the signature does not verify
    pub fn verify(&self, public_key: &str) -> Result<(), SecurityError> {
        self.verify_at(public_key, Utc::now())
    }

    /// Like [`verify`](Self::verify) with an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`verify`](Self::verify).
    pub fn verify_at(&self, public_key: &str, now: DateTime<Utc>) -> Result<(), SecurityError> {
        if self.signature.is_empty() {
            return Err(SecurityError::MissingSignature { field: "signature" });
        }
        check_timestamp_at(&self.timestamp, now)?;
        let key = VerifyingKey::from_base64(public_key)?;
        key.verify(self.canonical_string().as_bytes(), &self.signature)
    }
}
