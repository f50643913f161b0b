//! Peer-to-peer registry synchronisation.
//!
//! Each node periodically pulls every known peer concurrently and merges
//! what it receives through [`Registry::merge_remote`]: records must
//! verify, and a known record is only replaced by a strictly newer
//! `updated_at`. Peers are never forgotten; repeated failures only mark
//! them unreachable until the next successful pull.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::config::FederationConfig;
use crate::error::PeerError;
use crate::peer_client::{PeerClient, PullSnapshot, normalize_peer_url};
use crate::registry::{MergeOutcome, Registry};
use crate::tasks::BackgroundTasks;

/// What this node knows about a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationPeer {
    /// Normalized peer URL.
    pub url: String,
    /// Time of the last successful pull.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Peers the peer advertised on its last pull.
    pub known_peers: Vec<String>,
    /// Failed pulls since the last success.
    pub consecutive_failures: u32,
    /// False after too many consecutive failures.
    pub reachable: bool,
    /// Peer clock from its last snapshot; the next pull's `since`.
    pub cursor: Option<DateTime<Utc>>,
}

impl FederationPeer {
    fn new(url: String) -> Self {
        Self {
            url,
            last_sync_at: None,
            known_peers: Vec::new(),
            consecutive_failures: 0,
            reachable: true,
            cursor: None,
        }
    }
}

/// Merge tallies for one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
    /// New records inserted.
    pub inserted: usize,
    /// Known records replaced by newer ones.
    pub updated: usize,
    /// Records no newer than the local copy.
    pub unchanged: usize,
    /// Records dropped for failing to decode, validate or verify.
    pub rejected: usize,
}

impl MergeCounts {
    fn tally(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Updated => self.updated += 1,
            MergeOutcome::Unchanged => self.unchanged += 1,
            MergeOutcome::Rejected { .. } => self.rejected += 1,
        }
    }

    fn add(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.rejected += other.rejected;
    }
}

/// Outcome of syncing one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOutcome {
    /// The peer.
    pub url: String,
    /// Merge tallies, or why the pull failed.
    pub result: Result<MergeCounts, PeerError>,
}

/// Outcome of one sync round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// One entry per peer pulled.
    pub peers: Vec<PeerOutcome>,
}

impl SyncReport {
    /// Number of peers pulled successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.peers.iter().filter(|p| p.result.is_ok()).count()
    }

    /// Number of peers that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.peers.len() - self.succeeded()
    }

    /// Merge tallies summed over all successful peers.
    #[must_use]
    pub fn totals(&self) -> MergeCounts {
        let mut totals = MergeCounts::default();
        for counts in self.peers.iter().filter_map(|p| p.result.as_ref().ok()) {
            totals.add(*counts);
        }
        totals
    }
}

/// Keeps the peer set and drives sync rounds.
pub struct FederationManager {
    config: FederationConfig,
    registry: Arc<Registry>,
    client: Arc<dyn PeerClient>,
    peers: RwLock<BTreeMap<String, FederationPeer>>,
}

impl fmt::Debug for FederationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederationManager")
            .field("config", &self.config)
            .field("peers", &self.peers)
            .finish_non_exhaustive()
    }
}

impl FederationManager {
    /// Creates a manager seeded with the configured peers.
    #[must_use]
    pub fn new(
        config: FederationConfig,
        registry: Arc<Registry>,
        client: Arc<dyn PeerClient>,
    ) -> Self {
        let manager = Self {
            config,
            registry,
            client,
            peers: RwLock::new(BTreeMap::new()),
        };
        for seed in manager.config.seed_peers.clone() {
            manager.add_peer(&seed);
        }
        manager
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Returns the registry being synchronised.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn is_self(&self, url: &str) -> bool {
        self.config
            .node_url
            .as_deref()
            .is_some_and(|own| normalize_peer_url(own) == url)
    }

    /// Adds a peer. Returns false for this node's own URL, blank URLs and
    /// peers already known.
    ///
    /// # Panics
    ///
    /// Panics if the peer lock is poisoned.
    pub fn add_peer(&self, url: &str) -> bool {
        if url.trim().is_empty() {
            return false;
        }
        let url = normalize_peer_url(url);
        if self.is_self(&url) {
            return false;
        }
        let mut peers = self.peers.write().expect("lock poisoned");
        if peers.contains_key(&url) {
            return false;
        }
        tracing::info!(peer = %url, "federation peer added");
        peers.insert(url.clone(), FederationPeer::new(url));
        true
    }

    /// Returns a snapshot of every known peer.
    ///
    /// # Panics
    ///
    /// Panics if the peer lock is poisoned.
    #[must_use]
    pub fn peers(&self) -> Vec<FederationPeer> {
        self.peers
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Returns one peer.
    ///
    /// # Panics
    ///
    /// Panics if the peer lock is poisoned.
    #[must_use]
    pub fn peer(&self, url: &str) -> Option<FederationPeer> {
        self.peers
            .read()
            .expect("lock poisoned")
            .get(&normalize_peer_url(url))
            .cloned()
    }

    /// Answers a pull: records this node changed at or after `since` and
    /// the peers it knows, including itself.
    ///
    /// `since` is compared with the time each record was last applied
    /// here, not its `updated_at`, so records relayed from other peers are
    /// passed on even when their origin timestamp is older than the cursor.
    ///
    /// # Panics
    ///
    /// Panics if the peer lock is poisoned.
    #[must_use]
    pub fn pull(&self, since: Option<DateTime<Utc>>) -> PullSnapshot {
        let changes = self.registry.changed_since(since);
        let mut peers: Vec<String> = self
            .peers
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        if let Some(own) = &self.config.node_url {
            peers.push(normalize_peer_url(own));
        }
        PullSnapshot::new(&changes.agents, peers, changes.as_of)
    }

    /// Pulls every known peer concurrently and merges the results.
    ///
    /// A failing peer never affects the others; its failure is logged and
    /// reported.
    ///
    /// # Panics
    ///
    /// Panics if the peer lock is poisoned.
    pub async fn sync_from_seeds(&self) -> SyncReport {
        let targets: Vec<(String, Option<DateTime<Utc>>)> = self
            .peers
            .read()
            .expect("lock poisoned")
            .values()
            .map(|p| (p.url.clone(), p.cursor))
            .collect();

        let fetches = targets.into_iter().map(|(url, since)| async move {
            let result = tokio::time::timeout(self.config.fetch_timeout, self.client.pull(&url, since))
                .await
                .unwrap_or_else(|_| {
                    Err(PeerError::Timeout {
                        peer: url.clone(),
                        timeout_ms: u64::try_from(self.config.fetch_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    })
                });
            (url, result)
        });
        let fetched = join_all(fetches).await;

        let mut report = SyncReport::default();
        for (url, result) in fetched {
            let result = match result {
                Ok(snapshot) => Ok(self.apply_snapshot(&url, snapshot).await),
                Err(e) => {
                    self.record_failure(&url, &e);
                    Err(e)
                }
            };
            report.peers.push(PeerOutcome { url, result });
        }

        let totals = report.totals();
        tracing::info!(
            peers = report.peers.len(),
            failed = report.failed(),
            inserted = totals.inserted,
            updated = totals.updated,
            rejected = totals.rejected,
            "federation sync finished"
        );
        report
    }

    async fn apply_snapshot(&self, url: &str, snapshot: PullSnapshot) -> MergeCounts {
        let mut counts = MergeCounts::default();
        for decoded in snapshot.records() {
            let agent = match decoded {
                Ok(agent) => agent,
                Err((agent_id, reason)) => {
                    tracing::warn!(
                        peer = %url,
                        ?agent_id,
                        %reason,
                        "dropped undecodable remote agent"
                    );
                    counts.rejected += 1;
                    continue;
                }
            };
            let agent_id = agent.id.clone();
            let outcome = self.registry.merge_remote(agent).await;
            if let MergeOutcome::Rejected { reason } = &outcome {
                tracing::warn!(peer = %url, %agent_id, %reason, "dropped remote agent");
            }
            counts.tally(&outcome);
        }

        for advertised in &snapshot.peers {
            self.add_peer(advertised);
        }

        let mut peers = self.peers.write().expect("lock poisoned");
        if let Some(peer) = peers.get_mut(url) {
            if !peer.reachable {
                tracing::info!(peer = %url, "federation peer reachable again");
            }
            peer.last_sync_at = Some(Utc::now());
            peer.cursor = Some(snapshot.timestamp);
            peer.known_peers = snapshot.peers;
            peer.consecutive_failures = 0;
            peer.reachable = true;
        }
        counts
    }

    fn record_failure(&self, url: &str, error: &PeerError) {
        let mut peers = self.peers.write().expect("lock poisoned");
        let Some(peer) = peers.get_mut(url) else {
            return;
        };
        peer.consecutive_failures += 1;
        if peer.consecutive_failures >= self.config.max_peer_failures && peer.reachable {
            peer.reachable = false;
            tracing::warn!(
                peer = %url,
                failures = peer.consecutive_failures,
                error = %error,
                "federation peer marked unreachable"
            );
        } else {
            tracing::warn!(peer = %url, error = %error, "federation pull failed");
        }
    }

    /// Runs [`sync_from_seeds`](Self::sync_from_seeds) every
    /// `sync_interval` until `tasks` shuts down.
    pub fn start_background_sync(self: &Arc<Self>, tasks: &mut BackgroundTasks) {
        let manager = Arc::clone(self);
        tasks.spawn_periodic("federation-sync", self.config.sync_interval, move || {
            let manager = Arc::clone(&manager);
            async move {
                manager.sync_from_seeds().await;
            }
        });
    }
}
