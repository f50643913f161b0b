//! Key-derived identity and Ed25519 signatures for `AgentMesh`.
//!
//! An agent's identity is its key pair. The registry never assigns names:
//! the agent ID is derived from the public key, the agent's declared
//! manifest is signed with the private key, and every authenticated request
//! carries a signature over its method, path, timestamp, and body hash.
//!
//! # Example
//!
//! ```rust
//! use agentmesh_identity::{SigningKey, SignedRequest, derive_id, hash_body, validate_id};
//!
//! let key = SigningKey::generate();
//! let public_key = key.verifying_key().to_base64();
//! let agent_id = derive_id(&public_key);
//! assert!(validate_id(&agent_id, &public_key));
//!
//! let request = SignedRequest::sign(&key, agent_id, "POST", "/invoke", hash_body(b"{}"));
//! assert!(request.verify(&public_key).is_ok());
//! ```
//!
//! # Identifiers
//!
//! | Form | Derivation |
//! |------|------------|
//! | short | `hex(SHA256(public_key_base64)[..20])` (40 chars) |
//! | DID | `did:agent:` + `hex(SHA256(public_key_base64))` |
//!
//! # Security Properties
//!
//! | Property | How Achieved |
//! |----------|--------------|
//! | No name squatting | ID is a hash of the public key |
//! | Tamper detection | Ed25519 over the canonical manifest |
//! | Request binding | Signature covers method, path, timestamp, body hash |
//! | Bounded replay | 60 s timestamp window, no nonce cache |

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod canonical;
mod error;
mod id;
mod keys;
mod manifest;
mod replay;
mod request;

pub use canonical::{canonical_json, hash_body, hash_json, to_canonical};
pub use error::SecurityError;
pub use id::{DID_PREFIX, ID_BYTES, derive_did, derive_id, ensure_id_matches, validate_id};
pub use keys::{ED25519_PREFIX, SigningKey, VerifyingKey};
pub use manifest::{
    MANIFEST_EXCLUDED_FIELDS, manifest_payload, sign_manifest, verify_manifest,
    verify_manifest_signature,
};
pub use replay::{REPLAY_WINDOW_SECS, check_timestamp, check_timestamp_at, parse_timestamp};
pub use request::{
    SignedRequest, canonical_request_string, sign_request, verify_request_signature,
};
