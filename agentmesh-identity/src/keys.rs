//! Ed25519 key types for agent identity.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{
    Signature as DalekSignature, Signer as _, SigningKey as DalekSigningKey, Verifier as _,
    VerifyingKey as DalekVerifyingKey,
};

use crate::error::SecurityError;

/// Wire prefix for Ed25519 signatures.
pub const ED25519_PREFIX: &str = "ed25519:";

/// A private key an agent uses to sign its manifest and its requests.
///
/// # Example
///
/// ```
/// use agentmesh_identity::SigningKey;
///
/// let signing_key = SigningKey::generate();
/// let public_key = signing_key.verifying_key().to_base64();
/// assert_eq!(public_key.len(), 44);
/// ```
#[derive(Clone)]
pub struct SigningKey {
    inner: DalekSigningKey,
}

impl SigningKey {
    /// Creates a new random signing key.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            inner: DalekSigningKey::generate(&mut rng),
        }
    }

    /// Creates a signing key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: DalekSigningKey::from_bytes(bytes),
        }
    }

    /// Parses a base64-encoded 32-byte private key.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::InvalidKeyFormat` if the text is not base64 or
    /// does not decode to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, SecurityError> {
        let bytes = decode_fixed::<32>(encoded, "private key")?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Returns the private key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.inner.to_bytes())
    }

    /// Returns the corresponding verifying (public) key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Signs `message` and returns the `ed25519:<base64>` wire form.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> String {
        let signature = self.inner.sign(message);
        format!("{ED25519_PREFIX}{}", STANDARD.encode(signature.to_bytes()))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

/// A public key bound to an agent identity.
///
/// Agents publish this key (base64) in their record; the registry derives
/// the agent ID from it.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: DalekVerifyingKey,
}

impl VerifyingKey {
    /// Creates a verifying key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::InvalidKeyFormat` if the bytes are not a valid
    /// Ed25519 curve point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SecurityError> {
        DalekVerifyingKey::from_bytes(bytes)
            .map(|inner| Self { inner })
            .map_err(|e| SecurityError::invalid_key(e.to_string()))
    }

    /// Parses a base64-encoded public key.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::InvalidKeyFormat` on bad base64, wrong length,
    /// or an invalid curve point.
    pub fn from_base64(encoded: &str) -> Result<Self, SecurityError> {
        let bytes = decode_fixed::<32>(encoded, "public key")?;
        Self::from_bytes(&bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Returns the key as base64, the form stored in agent records.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.inner.to_bytes())
    }

    /// Verifies an `ed25519:<base64>` (or bare base64) signature over `message`.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::InvalidKeyFormat` if the signature text is
    /// malformed and `SecurityError::InvalidSignature` if it does not verify.
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<(), SecurityError> {
        let encoded = signature.strip_prefix(ED25519_PREFIX).unwrap_or(signature);
        let bytes = decode_fixed::<64>(encoded, "signature")?;
        let signature = DalekSignature::from_bytes(&bytes);
        self.inner
            .verify(message, &signature)
            .map_err(|_| SecurityError::InvalidSignature)
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.to_bytes();
        write!(
            f,
            "VerifyingKey({:02x}{:02x}{:02x}{:02x}...)",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}

fn decode_fixed<const N: usize>(encoded: &str, what: &str) -> Result<[u8; N], SecurityError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SecurityError::invalid_key(format!("{what} is not base64: {e}")))?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        SecurityError::invalid_key(format!(
            "{what} must be {N} bytes, got {}",
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_generates_unique_keys() {
        let key1 = SigningKey::generate();
        let key2 = SigningKey::generate();

        assert_ne!(key1.to_bytes(), key2.to_bytes());
    }

    #[test]
    fn signing_key_base64_roundtrip() {
        let original = SigningKey::generate();
        let recovered = SigningKey::from_base64(&original.to_base64()).unwrap();

        assert_eq!(original.to_bytes(), recovered.to_bytes());
    }

    #[test]
    fn verifying_key_base64_roundtrip() {
        let verifying_key = SigningKey::generate().verifying_key();
        let recovered = VerifyingKey::from_base64(&verifying_key.to_base64()).unwrap();

        assert_eq!(verifying_key, recovered);
    }

    #[test]
    fn sign_and_verify() {
        let signing_key = SigningKey::generate();
        let signature = signing_key.sign(b"hello");

        assert!(signature.starts_with(ED25519_PREFIX));
        assert!(signing_key.verifying_key().verify(b"hello", &signature).is_ok());
    }

    #[test]
    fn verify_rejects_other_message() {
        let signing_key = SigningKey::generate();
        let signature = signing_key.sign(b"hello");

        let result = signing_key.verifying_key().verify(b"goodbye", &signature);
        assert_eq!(result, Err(SecurityError::InvalidSignature));
    }

    #[test]
    fn verify_rejects_other_key() {
        let signature = SigningKey::generate().sign(b"hello");
        let other = SigningKey::generate().verifying_key();

        assert_eq!(
            other.verify(b"hello", &signature),
            Err(SecurityError::InvalidSignature)
        );
    }

    #[test]
    fn short_public_key_is_rejected() {
        let result = VerifyingKey::from_base64("AAAA");
        assert!(matches!(
            result,
            Err(SecurityError::InvalidKeyFormat { .. })
        ));
    }

    #[test]
    fn garbage_signature_is_key_format_error() {
        let key = SigningKey::generate().verifying_key();
        let result = key.verify(b"hello", "ed25519:not-base64!!");
        assert!(matches!(
            result,
            Err(SecurityError::InvalidKeyFormat { .. })
        ));
    }

    #[test]
    fn verifying_key_debug_shows_partial_bytes() {
        let verifying_key = SigningKey::generate().verifying_key();
        let debug_output = format!("{verifying_key:?}");

        assert!(debug_output.contains("VerifyingKey("));
        assert!(debug_output.contains("..."));
    }
}
