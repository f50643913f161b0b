//! Error types for registry, storage, federation, and settings operations.

use std::fmt;

use agentmesh_identity::SecurityError;

/// Errors returned synchronously by registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The record failed shape validation.
    Validation(ValidationError),
    /// An identity or signature check failed.
    Security(SecurityError),
    /// The agent is not registered.
    NotFound {
        /// The agent ID that was not found
        agent_id: String,
    },
}

/// Specific record validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is empty.
    Empty {
        /// Name of the empty field
        field: &'static str,
    },
    /// A field exceeds its maximum length.
    TooLong {
        /// Name of the field
        field: &'static str,
        /// Maximum allowed length
        max: usize,
        /// Actual length
        actual: usize,
    },
    /// The agent ID contains a character outside letters, digits, `_`, `-`, `:`.
    InvalidIdChar {
        /// The offending character
        char: char,
    },
    /// The record declares no skills.
    NoSkills,
    /// Two skills share a name.
    DuplicateSkill {
        /// The repeated skill name
        name: String,
    },
    /// A limit that must be positive is zero.
    NotPositive {
        /// Name of the field
        field: &'static str,
    },
    /// The trust score is outside [0, 1].
    TrustOutOfRange,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "'{field}' must not be empty"),
            Self::TooLong { field, max, actual } => {
                write!(f, "'{field}' is {actual} chars, maximum is {max}")
            }
            Self::InvalidIdChar { char } => write!(
                f,
                "invalid character '{char}' in agent ID; use letters, digits, '_', '-' or ':'"
            ),
            Self::NoSkills => write!(f, "agent must declare at least one skill"),
            Self::DuplicateSkill { name } => {
                write!(f, "skill '{name}' is declared more than once; skill names must be unique")
            }
            Self::NotPositive { field } => write!(f, "'{field}' must be greater than zero"),
            Self::TrustOutOfRange => write!(f, "trust score must be within [0, 1]"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "invalid agent record: {e}"),
            Self::Security(e) => write!(f, "security check failed: {e}"),
            Self::NotFound { agent_id } => write!(
                f,
                "agent '{agent_id}' is not registered; verify the ID or register the agent first"
            ),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Security(e) => Some(e),
            Self::NotFound { .. } => None,
        }
    }
}

impl From<ValidationError> for RegistryError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<SecurityError> for RegistryError {
    fn from(e: SecurityError) -> Self {
        Self::Security(e)
    }
}

impl RegistryError {
    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(agent_id: impl Into<String>) -> Self {
        Self::NotFound {
            agent_id: agent_id.into(),
        }
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a security rejection.
    #[must_use]
    pub const fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }

    /// Returns true if this is a validation rejection.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Errors from a storage backend.
///
/// These are logged and never fail a registry operation; the in-memory
/// state stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    Backend {
        /// Backend error message
        message: String,
    },
    /// A stored record could not be encoded or decoded.
    Serialization {
        /// Description of the failure
        reason: String,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { message } => write!(f, "storage backend error: {message}"),
            Self::Serialization { reason } => {
                write!(f, "failed to (de)serialize stored record: {reason}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    /// Creates a `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Errors from pulling a federation peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The peer could not be reached.
    Unreachable {
        /// Peer URL
        peer: String,
        /// Transport error message
        reason: String,
    },
    /// The peer did not answer in time.
    Timeout {
        /// Peer URL
        peer: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },
    /// The peer answered with a non-success status.
    BadStatus {
        /// Peer URL
        peer: String,
        /// HTTP status code
        status: u16,
    },
    /// The response body was not a valid pull snapshot.
    Decode {
        /// Peer URL
        peer: String,
        /// Decoding error message
        reason: String,
    },
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { peer, reason } => {
                write!(f, "peer '{peer}' is unreachable: {reason}")
            }
            Self::Timeout { peer, timeout_ms } => {
                write!(f, "peer '{peer}' did not respond within {timeout_ms}ms")
            }
            Self::BadStatus { peer, status } => {
                write!(f, "peer '{peer}' answered pull with HTTP {status}")
            }
            Self::Decode { peer, reason } => {
                write!(f, "peer '{peer}' sent an invalid pull snapshot: {reason}")
            }
        }
    }
}

impl std::error::Error for PeerError {}

impl PeerError {
    /// Creates an `Unreachable` error.
    #[must_use]
    pub fn unreachable(peer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            peer: peer.into(),
            reason: reason.into(),
        }
    }

    /// Returns the URL of the peer that failed.
    #[must_use]
    pub fn peer(&self) -> &str {
        match self {
            Self::Unreachable { peer, .. }
            | Self::Timeout { peer, .. }
            | Self::BadStatus { peer, .. }
            | Self::Decode { peer, .. } => peer,
        }
    }

    /// Returns true if the peer timed out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors from loading settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The configuration sources could not be read or merged.
    Load {
        /// Loader error message
        message: String,
    },
    /// A value is present but unusable.
    Invalid {
        /// Settings key
        key: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { message } => write!(f, "failed to load settings: {message}"),
            Self::Invalid { key, reason } => write!(f, "invalid setting '{key}': {reason}"),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<config::ConfigError> for SettingsError {
    fn from(e: config::ConfigError) -> Self {
        Self::Load {
            message: e.to_string(),
        }
    }
}
