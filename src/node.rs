//! A complete mesh node: registry, federation and background loops.

use std::sync::Arc;

use crate::error::StorageError;
use crate::federation::FederationManager;
use crate::peer_client::{HttpPeerClient, PeerClient};
use crate::registry::Registry;
use crate::settings::MeshSettings;
use crate::similarity::Similarity;
use crate::storage::{MemoryStorage, Storage};
use crate::tasks::BackgroundTasks;

/// Wires every component from [`MeshSettings`].
///
/// # Examples
///
/// ```
/// use agentmesh::{MeshNode, MeshSettings};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut node = MeshNode::new(MeshSettings::default());
/// node.start().await.unwrap();
/// assert_eq!(node.running_tasks(), 3);
/// node.shutdown().await;
/// # }
/// ```
#[derive(Debug)]
pub struct MeshNode {
    settings: MeshSettings,
    registry: Arc<Registry>,
    federation: Arc<FederationManager>,
    tasks: BackgroundTasks,
}

impl MeshNode {
    /// Creates a node with in-memory storage and the HTTP peer client.
    #[must_use]
    pub fn new(settings: MeshSettings) -> Self {
        let client = Arc::new(HttpPeerClient::new(
            settings.federation_config().fetch_timeout,
        ));
        Self::with_collaborators(settings, Arc::new(MemoryStorage::new()), client, None)
    }

    /// Creates a node with explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        settings: MeshSettings,
        storage: Arc<dyn Storage>,
        client: Arc<dyn PeerClient>,
        similarity: Option<Arc<dyn Similarity>>,
    ) -> Self {
        let mut builder = Registry::builder()
            .config(settings.registry_config())
            .trust_config(settings.trust_config())
            .health_config(settings.health_config())
            .discovery_config(settings.discovery_config())
            .storage(storage);
        if let Some(similarity) = similarity {
            builder = builder.similarity(similarity);
        }
        let registry = Arc::new(builder.build());
        let federation = Arc::new(FederationManager::new(
            settings.federation_config(),
            Arc::clone(&registry),
            client,
        ));
        Self {
            settings,
            registry,
            federation,
            tasks: BackgroundTasks::new(),
        }
    }

    /// Returns the settings the node was built from.
    #[must_use]
    pub const fn settings(&self) -> &MeshSettings {
        &self.settings
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the federation manager.
    #[must_use]
    pub const fn federation(&self) -> &Arc<FederationManager> {
        &self.federation
    }

    /// Number of running background loops.
    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Loads persisted records and starts the health sweep, trust decay
    /// and federation sync loops. Returns the number of records loaded.
    ///
    /// # Errors
    ///
    /// Returns the storage error if persisted records cannot be read; no
    /// loop is started in that case.
    pub async fn start(&mut self) -> Result<usize, StorageError> {
        let loaded = self.registry.load_from_storage().await?;

        let registry = Arc::clone(&self.registry);
        self.tasks.spawn_periodic(
            "health-sweep",
            self.registry.health().config().check_interval,
            move || {
                let registry = Arc::clone(&registry);
                async move {
                    registry.sweep_health().await;
                }
            },
        );

        let registry = Arc::clone(&self.registry);
        self.tasks.spawn_periodic(
            "trust-decay",
            self.registry.trust().config().decay_interval,
            move || {
                let registry = Arc::clone(&registry);
                async move {
                    registry.apply_trust_decay().await;
                }
            },
        );

        self.federation.start_background_sync(&mut self.tasks);

        tracing::info!(
            loaded,
            peers = self.federation.peers().len(),
            node_url = ?self.settings.federation.node_url,
            "mesh node started"
        );
        Ok(loaded)
    }

    /// Stops every background loop and waits for them.
    pub async fn shutdown(self) {
        tracing::info!("mesh node shutting down");
        self.tasks.shutdown().await;
    }
}
