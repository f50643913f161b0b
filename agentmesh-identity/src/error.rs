//! Error types for identity and signature checks.

use std::fmt;

/// Errors raised when an identity or signature check fails.
///
/// Every variant is a rejection: callers must never treat a
/// `SecurityError` as a soft warning or silently fall through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// A signature (or the public key needed to check it) was required but absent.
    MissingSignature {
        /// What was missing (e.g. "manifest_signature", "public_key")
        field: &'static str,
    },
    /// The agent ID is not the one derived from the presented public key.
    IdMismatch {
        /// The ID that was presented
        agent_id: String,
        /// The ID derived from the public key
        expected: String,
    },
    /// Signature verification failed.
    InvalidSignature,
    /// The request timestamp is outside the replay window.
    StaleTimestamp {
        /// Absolute clock skew in seconds
        skew_secs: i64,
        /// Window size in seconds
        window_secs: i64,
    },
    /// The claimed signer is not registered.
    UnknownSigner {
        /// The agent ID that claimed to sign
        agent_id: String,
    },
    /// The public key or signature bytes are malformed.
    InvalidKeyFormat {
        /// Description of the key error
        reason: String,
    },
    /// The timestamp could not be parsed.
    InvalidTimestamp {
        /// The raw timestamp
        timestamp: String,
    },
    /// The payload could not be put into canonical form.
    Encoding {
        /// Description of the encoding error
        reason: String,
    },
}

impl fmt::Display for SecurityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignature { field } => {
                write!(f, "missing required '{field}'; signed registration is enforced")
            }
            Self::IdMismatch { agent_id, expected } => {
                write!(
                    f,
                    "agent ID '{agent_id}' does not match the ID derived from its public key ('{expected}')"
                )
            }
            Self::InvalidSignature => {
                write!(
                    f,
                    "signature verification failed; payload may have been tampered with"
                )
            }
            Self::StaleTimestamp {
                skew_secs,
                window_secs,
            } => {
                write!(
                    f,
                    "request timestamp is {skew_secs}s away from now, outside the {window_secs}s replay window"
                )
            }
            Self::UnknownSigner { agent_id } => {
                write!(f, "signer '{agent_id}' is not registered with a public key")
            }
            Self::InvalidKeyFormat { reason } => {
                write!(f, "invalid key format: {reason}")
            }
            Self::InvalidTimestamp { timestamp } => {
                write!(f, "invalid timestamp '{timestamp}'; expected RFC 3339")
            }
            Self::Encoding { reason } => {
                write!(f, "failed to encode canonical payload: {reason}")
            }
        }
    }
}

impl std::error::Error for SecurityError {}

impl SecurityError {
    /// Creates an `IdMismatch` error.
    #[must_use]
    pub fn id_mismatch(agent_id: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::IdMismatch {
            agent_id: agent_id.into(),
            expected: expected.into(),
        }
    }

    /// Creates an `UnknownSigner` error.
    #[must_use]
    pub fn unknown_signer(agent_id: impl Into<String>) -> Self {
        Self::UnknownSigner {
            agent_id: agent_id.into(),
        }
    }

    /// Creates an `InvalidKeyFormat` error.
    #[must_use]
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKeyFormat {
            reason: reason.into(),
        }
    }

    /// Returns true if this error is a signature failure (forgery or corruption).
    #[must_use]
    pub const fn is_invalid_signature(&self) -> bool {
        matches!(self, Self::InvalidSignature)
    }

    /// Returns true if this error came from the replay window.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleTimestamp { .. })
    }
}
