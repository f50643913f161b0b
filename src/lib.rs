//! Decentralized agent registry with key-bound identity, trust scoring,
//! health monitoring, capability discovery and peer federation.
//!
//! # Overview
//!
//! Agents register an [`AgentRecord`] describing their skills and endpoint.
//! A signed record's ID is derived from its public key and its declared
//! fields are covered by an Ed25519 manifest signature (see
//! [`agentmesh_identity`]). The [`Registry`] owns the record set and
//! routes every mutation through one place:
//!
//! ```text
//! caller -> Registry -> {verify -> index -> trust -> invalidate cache} -> events, storage
//! peer   -> FederationManager -> {verify -> last-write-wins} -> Registry
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use agentmesh::{AgentRecord, HealthStatus, Registry, SearchQuery, Skill};
//! use agentmesh_identity::SigningKey;
//!
//! # futures::executor::block_on(async {
//! let registry = Registry::builder().build();
//!
//! let key = SigningKey::generate();
//! let record = AgentRecord::new("Translator", "1.0.0", "http://localhost:9000")
//!     .with_skill(Skill::new("translate", "Translate text between languages"))
//!     .with_tag("nlp")
//!     .signed_by(&key)
//!     .unwrap();
//! let stored = registry.register(record).await.unwrap();
//!
//! registry.heartbeat(&stored.id, HealthStatus::Healthy).await.unwrap();
//!
//! let hits = registry.search(&SearchQuery::text("translate").healthy_only());
//! assert_eq!(hits[0].record.id, stored.id);
//! # });
//! ```
//!
//! # Ranking
//!
//! | Factor | Default weight | Source |
//! |--------|----------------|--------|
//! | Similarity | 0.3 | keyword match and optional [`Similarity`] collaborator |
//! | Trust | 0.5 | [`TrustEngine`] score |
//! | Uptime | 0.2 | healthy 1.0, unknown 0.5, unhealthy 0.25, offline 0.0 |
//!
//! # Trust Events
//!
//! | Event | Delta |
//! |-------|-------|
//! | Successful invocation | +0.01 |
//! | Verified handshake | +0.005 |
//! | Valid heartbeat | +0.001 |
//! | Timeout | -0.05 |
//! | Invocation failure | -0.10 |
//! | Rate-limit abuse | -0.02 |
//! | Signature forgery | reset to 0 |

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod builder;
mod cache;
mod config;
mod discovery;
mod error;
mod events;
mod federation;
mod health;
mod index;
mod logging;
mod node;
mod peer_client;
pub mod prelude;
mod record;
mod registry;
mod settings;
mod similarity;
mod storage;
mod tasks;
mod trust;

pub use builder::RegistryBuilder;
pub use cache::SearchCache;
pub use config::{DiscoveryConfig, FederationConfig, HealthConfig, RegistryConfig, TrustConfig};
pub use discovery::{DiscoveryService, RankedAgent, SearchQuery, SortBy, SortOrder};
pub use error::{PeerError, RegistryError, SettingsError, StorageError, ValidationError};
pub use events::{Event, EventBus, EventKind, Subscription};
pub use federation::{FederationManager, FederationPeer, MergeCounts, PeerOutcome, SyncReport};
pub use health::{HealthMonitor, HealthTransition, HeartbeatReceipt};
pub use index::CapabilityIndex;
pub use logging::init_logging;
pub use node::MeshNode;
pub use peer_client::{HttpPeerClient, PULL_PATH, PeerClient, PullSnapshot, normalize_peer_url};
pub use record::{
    AgentRecord, AgentUpdate, HealthStatus, MAX_DESCRIPTION_LENGTH, MAX_ID_LENGTH,
    MAX_NAME_LENGTH, MAX_VERSION_LENGTH, NEUTRAL_TRUST, Protocol, Skill,
};
pub use registry::{ChangeSet, MergeOutcome, Registry, RegistryStats};
pub use settings::{
    DiscoverySettings, FederationSettings, HealthSettings, LoggingSettings, MeshSettings,
    RegistrySettings, TrustSettings,
};
pub use similarity::{Similarity, cosine_similarity};
pub use storage::{MemoryStorage, Storage};
pub use tasks::BackgroundTasks;
pub use trust::{TrustBreakdown, TrustEngine, TrustEvent, TrustEventKind, TrustUpdate};
