//! Convenient re-exports for glob imports.
//!
//! ```rust
//! use agentmesh::prelude::*;
//!
//! let registry = Registry::builder().build();
//! let key = SigningKey::generate();
//! assert!(registry.is_empty());
//! ```

pub use crate::{
    // Records
    AgentRecord, AgentUpdate, HealthStatus, Protocol, Skill,
    // Components
    EventBus, FederationManager, MeshNode, Registry, RegistryBuilder, TrustEngine,
    // Queries and results
    RankedAgent, SearchQuery, SortBy, SortOrder, TrustEventKind,
    // Configuration
    MeshSettings,
    // Errors
    PeerError, RegistryError, StorageError,
};
pub use agentmesh_identity::{SecurityError, SignedRequest, SigningKey, VerifyingKey};
