//! Builder for assembling a [`Registry`] from its collaborators.

use std::fmt;
use std::sync::Arc;

use crate::config::{DiscoveryConfig, HealthConfig, RegistryConfig, TrustConfig};
use crate::discovery::DiscoveryService;
use crate::events::EventBus;
use crate::health::HealthMonitor;
use crate::registry::Registry;
use crate::similarity::Similarity;
use crate::storage::{MemoryStorage, Storage};
use crate::trust::TrustEngine;

/// Assembles a [`Registry`].
///
/// Every collaborator has a default: an empty [`MemoryStorage`], a fresh
/// [`EventBus`], keyword-only discovery and default configs.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use agentmesh::{EventBus, RegistryBuilder, RegistryConfig};
///
/// let events = Arc::new(EventBus::new());
/// let registry = RegistryBuilder::new()
///     .config(RegistryConfig::new().with_require_signed_registration(true))
///     .event_bus(Arc::clone(&events))
///     .build();
///
/// assert!(registry.config().require_signed_registration);
/// assert!(registry.is_empty());
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    trust: TrustConfig,
    health: HealthConfig,
    discovery: DiscoveryConfig,
    similarity: Option<Arc<dyn Similarity>>,
    events: Option<Arc<EventBus>>,
    storage: Option<Arc<dyn Storage>>,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .field("trust", &self.trust)
            .field("health", &self.health)
            .field("discovery", &self.discovery)
            .field("similarity", &self.similarity.is_some())
            .field("storage", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    /// Creates a builder with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registry configuration.
    #[must_use]
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the trust engine configuration.
    #[must_use]
    pub fn trust_config(mut self, config: TrustConfig) -> Self {
        self.trust = config;
        self
    }

    /// Sets the health monitor configuration.
    #[must_use]
    pub fn health_config(mut self, config: HealthConfig) -> Self {
        self.health = config;
        self
    }

    /// Sets the discovery configuration.
    #[must_use]
    pub fn discovery_config(mut self, config: DiscoveryConfig) -> Self {
        self.discovery = config;
        self
    }

    /// Adds a similarity collaborator for free-text search.
    #[must_use]
    pub fn similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Shares an existing event bus.
    #[must_use]
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the storage backend.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Builds the registry.
    #[must_use]
    pub fn build(self) -> Registry {
        let mut discovery = DiscoveryService::new(self.discovery);
        if let Some(similarity) = self.similarity {
            discovery = discovery.with_similarity(similarity);
        }
        Registry::from_parts(
            self.config,
            TrustEngine::new(self.trust),
            HealthMonitor::new(self.health),
            discovery,
            self.events.unwrap_or_default(),
            self.storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_build() {
        let registry = RegistryBuilder::new().build();
        assert!(!registry.config().require_signed_registration);
        assert_eq!(
            registry.health().config().max_unhealthy,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn shares_event_bus() {
        let events = Arc::new(EventBus::new());
        let registry = RegistryBuilder::new()
            .event_bus(Arc::clone(&events))
            .build();

        let _sub = registry.subscribe();
        assert_eq!(events.subscriber_count(), 1);
    }

    #[test]
    fn applies_configs() {
        let registry = RegistryBuilder::new()
            .trust_config(TrustConfig::new().with_history_limit(5))
            .discovery_config(DiscoveryConfig::new().with_default_limit(3))
            .build();
        assert_eq!(registry.trust().config().history_limit, 5);
        assert_eq!(registry.discovery().config().default_limit, 3);
    }
}
