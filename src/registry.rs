//! The authoritative agent record set.
//!
//! Records and their capability index live behind one `RwLock`. Every
//! mutation takes the write lock for a short synchronous critical section
//! (index update, trust bookkeeping, cache invalidation) and never awaits
//! while holding it. Persistence and event publication happen afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use agentmesh_identity::{SecurityError, SignedRequest, ensure_id_matches};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RegistryConfig;
use crate::discovery::{DiscoveryService, RankedAgent, SearchQuery, SortBy, SortOrder};
use crate::error::{RegistryError, StorageError};
use crate::events::{Event, EventBus, EventKind, Subscription};
use crate::health::{HealthMonitor, HealthTransition, HeartbeatReceipt};
use crate::index::CapabilityIndex;
use crate::record::{AgentRecord, AgentUpdate, HealthStatus};
use crate::storage::Storage;
use crate::trust::{TrustBreakdown, TrustEngine, TrustEventKind, TrustUpdate};

/// Result of merging one record received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The record was new and was inserted.
    Inserted,
    /// The record was newer than the local copy and replaced it.
    Updated,
    /// The local copy is as new or newer.
    Unchanged,
    /// The record failed validation or verification and was dropped.
    Rejected {
        /// Why the record was dropped
        reason: String,
    },
}

impl MergeOutcome {
    /// Returns true if local state changed.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

/// Counts describing the registry contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Registered agents.
    pub total_agents: usize,
    /// Agents per health status.
    pub by_health: HashMap<HealthStatus, usize>,
    /// Agents without a public key.
    pub legacy_agents: usize,
    /// Distinct indexed skills.
    pub indexed_skills: usize,
    /// Distinct indexed tags.
    pub indexed_tags: usize,
    /// Mean trust score, 0 when empty.
    pub average_trust: f64,
    /// Live event subscribers.
    pub subscribers: usize,
}

/// Records changed since a pull cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    /// Local clock when the set was collected; the caller's next cursor.
    pub as_of: DateTime<Utc>,
    /// Changed records, oldest `updated_at` first.
    pub agents: Vec<AgentRecord>,
}

#[derive(Debug, Default)]
struct RegistryState {
    records: HashMap<String, AgentRecord>,
    index: CapabilityIndex,
    // When each record was last written on this node.
    changed_at: HashMap<String, DateTime<Utc>>,
}

impl RegistryState {
    fn mark_changed(&mut self, agent_id: &str) {
        self.changed_at.insert(agent_id.to_string(), Utc::now());
    }
}

/// Checks that `replacement` may overwrite `existing`.
///
/// A record that carries a public key can only be replaced by a signed
/// record under the same key. The signature itself is verified before the
/// state lock is taken.
fn ensure_same_owner(
    existing: &AgentRecord,
    replacement: &AgentRecord,
) -> Result<(), SecurityError> {
    let Some(owner) = existing.public_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(());
    };
    match replacement.public_key.as_deref().filter(|k| !k.is_empty()) {
        None => Err(SecurityError::MissingSignature { field: "public_key" }),
        Some(key) if key != owner => Err(SecurityError::InvalidSignature),
        Some(_) if !replacement.is_signed() => Err(SecurityError::MissingSignature {
            field: "manifest_signature",
        }),
        Some(_) => Ok(()),
    }
}

/// The registry: records, indexes, and the components that act on them.
///
/// # Examples
///
/// ```
/// use agentmesh::{AgentRecord, Registry, SearchQuery, Skill};
/// use agentmesh_identity::SigningKey;
///
/// # futures::executor::block_on(async {
/// let registry = Registry::builder().build();
/// let key = SigningKey::generate();
/// let record = AgentRecord::new("Summarizer", "1.0.0", "http://localhost:9000")
///     .with_skill(Skill::new("summarize", "Condense long text"))
///     .signed_by(&key)
///     .unwrap();
///
/// let stored = registry.register(record).await.unwrap();
/// let hits = registry.search(&SearchQuery::text("summar"));
/// assert_eq!(hits[0].record.id, stored.id);
/// # });
/// ```
pub struct Registry {
    config: RegistryConfig,
    state: RwLock<RegistryState>,
    trust: TrustEngine,
    health: HealthMonitor,
    discovery: DiscoveryService,
    events: Arc<EventBus>,
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("trust", &self.trust)
            .field("health", &self.health)
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Returns a [`RegistryBuilder`](crate::RegistryBuilder).
    #[must_use]
    pub fn builder() -> crate::RegistryBuilder {
        crate::RegistryBuilder::new()
    }

    pub(crate) fn from_parts(
        config: RegistryConfig,
        trust: TrustEngine,
        health: HealthMonitor,
        discovery: DiscoveryService,
        events: Arc<EventBus>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            config,
            state: RwLock::new(RegistryState::default()),
            trust,
            health,
            discovery,
            events,
            storage,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the trust engine.
    #[must_use]
    pub const fn trust(&self) -> &TrustEngine {
        &self.trust
    }

    /// Returns the health monitor.
    #[must_use]
    pub const fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// Returns the discovery service.
    #[must_use]
    pub const fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    /// Returns the shared event bus.
    #[must_use]
    pub const fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Subscribes to registry events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Checks the identity rules for a record about to be stored.
    ///
    /// A present public key must derive the ID and any present signature
    /// must verify. When signed registration is required, both must be
    /// present.
    fn verify_identity(&self, record: &AgentRecord) -> Result<(), SecurityError> {
        let Some(public_key) = record.public_key.as_deref().filter(|k| !k.is_empty()) else {
            if self.config.require_signed_registration || record.is_signed() {
                return Err(SecurityError::MissingSignature { field: "public_key" });
            }
            return Ok(());
        };

        ensure_id_matches(&record.id, public_key)?;
        if record.is_signed() {
            record.verify_signature()
        } else if self.config.require_signed_registration {
            Err(SecurityError::MissingSignature {
                field: "manifest_signature",
            })
        } else {
            Ok(())
        }
    }

    async fn persist(&self, record: &AgentRecord) {
        if let Err(e) = self.storage.save(record).await {
            tracing::error!(agent_id = %record.id, error = %e, "failed to persist agent");
        }
    }

    fn publish_trust(&self, update: &TrustUpdate) {
        if update.changed() {
            self.events.publish(&Event::trust_changed(
                update.agent_id(),
                update.previous,
                update.score(),
                update.event.kind.as_str(),
            ));
        }
    }

    /// Registers an agent, or replaces the declared fields of an existing
    /// one.
    ///
    /// Re-registration keeps `created_at`, the trust score and the health
    /// fields of the stored record. New agents start with neutral trust and
    /// unknown health; any server-managed values the caller sent are
    /// ignored.
    ///
    /// Once an agent is registered with a public key, re-registration must
    /// present the same key and a valid signature.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Validation` if the record shape is invalid
    /// - `RegistryError::Security` if the ID does not match the key, a
    ///   required signature is missing, a signature does not verify, or
    ///   the record would replace a keyed agent without its key
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn register(&self, record: AgentRecord) -> Result<AgentRecord, RegistryError> {
        record.validate()?;
        self.verify_identity(&record)?;

        let now = Utc::now();
        let (stored, kind) = {
            let mut state = self.state.write().expect("lock poisoned");
            let mut record = record;
            let kind = if let Some(existing) = state.records.get(&record.id).cloned() {
                ensure_same_owner(&existing, &record)?;
                state.index.remove(&existing);
                record.created_at = existing.created_at;
                record.trust_score = self.trust.get_score(&record.id);
                record.health_status = existing.health_status;
                record.last_heartbeat = existing.last_heartbeat;
                record.updated_at = existing.updated_at;
                record.touch_at(now);
                EventKind::AgentUpdated
            } else {
                record.trust_score = self
                    .trust
                    .seed(&record.id, self.trust.config().initial_score);
                record.health_status = HealthStatus::Unknown;
                record.last_heartbeat = None;
                record.created_at = now;
                record.updated_at = now;
                EventKind::AgentRegistered
            };
            state.index.insert(&record);
            state.mark_changed(&record.id);
            state.records.insert(record.id.clone(), record.clone());
            self.discovery.invalidate();
            (record, kind)
        };

        tracing::info!(
            agent_id = %stored.id,
            name = %stored.name,
            legacy = stored.is_legacy(),
            ?kind,
            "agent registered"
        );
        self.persist(&stored).await;
        self.events.publish(&Event::record_changed(kind, &stored));
        Ok(stored)
    }

    /// Returns a copy of a record.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.state
            .read()
            .expect("lock poisoned")
            .records
            .get(agent_id)
            .cloned()
    }

    /// Number of registered agents.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").records.len()
    }

    /// Returns true if no agent is registered.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deregisters an agent and returns its last record.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the agent is not registered.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn remove(&self, agent_id: &str) -> Result<AgentRecord, RegistryError> {
        let removed = {
            let mut state = self.state.write().expect("lock poisoned");
            let removed = state
                .records
                .remove(agent_id)
                .ok_or_else(|| RegistryError::not_found(agent_id))?;
            state.index.remove(&removed);
            state.changed_at.remove(agent_id);
            self.discovery.invalidate();
            removed
        };
        self.trust.forget(agent_id);

        tracing::info!(%agent_id, "agent deregistered");
        if let Err(e) = self.storage.delete(agent_id).await {
            tracing::error!(%agent_id, error = %e, "failed to delete agent from storage");
        }
        self.events.publish(&Event::deregistered(agent_id));
        Ok(removed)
    }

    /// Lists agents, sorted and paginated.
    ///
    /// `limit` falls back to the configured default page size.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn list(
        &self,
        skip: usize,
        limit: Option<usize>,
        sort_by: SortBy,
        order: SortOrder,
    ) -> Vec<AgentRecord> {
        let mut agents: Vec<AgentRecord> = self
            .state
            .read()
            .expect("lock poisoned")
            .records
            .values()
            .cloned()
            .collect();
        DiscoveryService::sort(&mut agents, sort_by, order, &self.trust);
        agents
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(self.config.default_list_limit))
            .collect()
    }

    /// Applies a partial profile update.
    ///
    /// The identity rules are checked against the resulting record, so a
    /// signed agent changing declared fields must send a fresh
    /// `manifest_signature`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if the agent is not registered
    /// - `RegistryError::Validation` if the result is invalid
    /// - `RegistryError::Security` if the result fails verification
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn update(
        &self,
        agent_id: &str,
        update: AgentUpdate,
    ) -> Result<AgentRecord, RegistryError> {
        let stored = loop {
            let current = self
                .get(agent_id)
                .ok_or_else(|| RegistryError::not_found(agent_id))?;
            let mut next = current.clone();
            update.clone().apply_to(&mut next);
            next.validate()?;
            self.verify_identity(&next)?;

            let mut state = self.state.write().expect("lock poisoned");
            let Some(existing) = state.records.get(agent_id).cloned() else {
                return Err(RegistryError::not_found(agent_id));
            };
            if existing.updated_at != current.updated_at {
                // Changed while we were verifying; start over.
                continue;
            }
            state.index.remove(&existing);
            next.trust_score = existing.trust_score;
            next.health_status = existing.health_status;
            next.last_heartbeat = existing.last_heartbeat;
            ensure_same_owner(&existing, &next)?;
            next.touch();
            state.index.insert(&next);
            state.mark_changed(agent_id);
            state.records.insert(agent_id.to_string(), next.clone());
            self.discovery.invalidate();
            break next;
        };

        tracing::info!(%agent_id, "agent profile updated");
        self.persist(&stored).await;
        self.events
            .publish(&Event::record_changed(EventKind::AgentUpdated, &stored));
        Ok(stored)
    }

    /// Records a heartbeat and a `valid_heartbeat` trust event.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the agent is not registered.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn heartbeat(
        &self,
        agent_id: &str,
        status: HealthStatus,
    ) -> Result<HeartbeatReceipt, RegistryError> {
        let now = Utc::now();
        let (receipt, transition, trust_update, snapshot) = {
            let mut state = self.state.write().expect("lock poisoned");
            let record = state
                .records
                .get_mut(agent_id)
                .ok_or_else(|| RegistryError::not_found(agent_id))?;
            let (receipt, transition) = self.health.record_heartbeat(record, status, now);
            let trust_update =
                self.trust
                    .record_event_at(agent_id, TrustEventKind::ValidHeartbeat, None, now);
            record.trust_score = trust_update.score();
            let snapshot = record.clone();
            state.mark_changed(agent_id);
            self.discovery.invalidate();
            (receipt, transition, trust_update, snapshot)
        };

        tracing::debug!(%agent_id, %status, "heartbeat received");
        self.persist(&snapshot).await;
        if let Some(transition) = transition {
            self.publish_transition(&transition);
        }
        self.publish_trust(&trust_update);
        Ok(receipt)
    }

    fn publish_transition(&self, transition: &HealthTransition) {
        self.events.publish(&Event::health_changed(
            &transition.agent_id,
            transition.previous,
            transition.current,
        ));
    }

    /// Runs the staleness check for one agent and returns its status.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the agent is not registered.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn check_health(&self, agent_id: &str) -> Result<HealthStatus, RegistryError> {
        let (status, changed) = {
            let mut state = self.state.write().expect("lock poisoned");
            let record = state
                .records
                .get_mut(agent_id)
                .ok_or_else(|| RegistryError::not_found(agent_id))?;
            let transition = self.health.check_agent(record, Utc::now());
            let status = record.health_status;
            let changed = transition.map(|t| (t, record.clone()));
            if changed.is_some() {
                state.mark_changed(agent_id);
                self.discovery.invalidate();
            }
            (status, changed)
        };

        if let Some((transition, snapshot)) = changed {
            self.persist(&snapshot).await;
            self.publish_transition(&transition);
        }
        Ok(status)
    }

    /// Marks every silent agent offline.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn sweep_health(&self) -> Vec<HealthTransition> {
        self.sweep_health_at(Utc::now()).await
    }

    /// [`sweep_health`](Self::sweep_health) as of `now`.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn sweep_health_at(&self, now: DateTime<Utc>) -> Vec<HealthTransition> {
        let (transitions, snapshots) = {
            let mut state = self.state.write().expect("lock poisoned");
            let transitions = self.health.sweep(state.records.values_mut(), now);
            let snapshots: Vec<AgentRecord> = transitions
                .iter()
                .filter_map(|t| state.records.get(&t.agent_id).cloned())
                .collect();
            for transition in &transitions {
                state.mark_changed(&transition.agent_id);
            }
            if !transitions.is_empty() {
                self.discovery.invalidate();
            }
            (transitions, snapshots)
        };

        for snapshot in &snapshots {
            self.persist(snapshot).await;
        }
        for transition in &transitions {
            self.publish_transition(transition);
        }
        if !transitions.is_empty() {
            tracing::info!(offline = transitions.len(), "health sweep marked agents offline");
        }
        transitions
    }

    /// Runs a discovery search.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn search(&self, query: &SearchQuery) -> Vec<RankedAgent> {
        let state = self.state.read().expect("lock poisoned");
        self.discovery
            .search(&state.records, &state.index, &self.trust, query)
    }

    /// Records a trust event for a registered agent.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the agent is not registered.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn record_trust_event(
        &self,
        agent_id: &str,
        kind: TrustEventKind,
        counterparty: Option<&str>,
    ) -> Result<TrustUpdate, RegistryError> {
        let (update, snapshot) = {
            let mut state = self.state.write().expect("lock poisoned");
            let record = state
                .records
                .get_mut(agent_id)
                .ok_or_else(|| RegistryError::not_found(agent_id))?;
            let update = self.trust.record_event(agent_id, kind, counterparty);
            let snapshot = update.changed().then(|| {
                record.trust_score = update.score();
                record.touch();
                record.clone()
            });
            if snapshot.is_some() {
                state.mark_changed(agent_id);
                self.discovery.invalidate();
            }
            (update, snapshot)
        };

        if let Some(snapshot) = snapshot {
            tracing::debug!(
                %agent_id,
                kind = kind.as_str(),
                score = update.score(),
                "trust score changed"
            );
            self.persist(&snapshot).await;
            self.publish_trust(&update);
        }
        Ok(update)
    }

    /// Returns the trust breakdown for a registered agent.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the agent is not registered.
    pub fn trust_breakdown(&self, agent_id: &str) -> Result<TrustBreakdown, RegistryError> {
        if self.get(agent_id).is_none() {
            return Err(RegistryError::not_found(agent_id));
        }
        Ok(self.trust.breakdown(agent_id))
    }

    /// Decays idle trust scores toward neutral and mirrors them onto the
    /// records.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn apply_trust_decay(&self) -> Vec<TrustUpdate> {
        self.apply_trust_decay_at(Utc::now()).await
    }

    /// [`apply_trust_decay`](Self::apply_trust_decay) as of `now`.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn apply_trust_decay_at(&self, now: DateTime<Utc>) -> Vec<TrustUpdate> {
        let updates = self.trust.decay_tick_at(now);
        if updates.is_empty() {
            return updates;
        }

        let snapshots: Vec<AgentRecord> = {
            let mut state = self.state.write().expect("lock poisoned");
            let snapshots = updates
                .iter()
                .filter_map(|update| {
                    let record = state.records.get_mut(update.agent_id())?;
                    record.trust_score = update.score();
                    record.touch();
                    Some(record.clone())
                })
                .collect::<Vec<_>>();
            for snapshot in &snapshots {
                state.mark_changed(&snapshot.id);
            }
            self.discovery.invalidate();
            snapshots
        };

        for snapshot in &snapshots {
            self.persist(snapshot).await;
        }
        for update in &updates {
            self.publish_trust(update);
        }
        updates
    }

    /// Verifies a signed request against the signer's registered key.
    ///
    /// On success the signer earns a `verified_handshake` trust event.
    ///
    /// # Errors
    ///
    /// `RegistryError::Security` with:
    /// - `UnknownSigner` if the agent is not registered or has no key
    /// - `StaleTimestamp` / `InvalidTimestamp` outside the replay window
    /// - `InvalidSignature` if the signature does not verify
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn authenticate_request(
        &self,
        request: &SignedRequest,
    ) -> Result<AgentRecord, RegistryError> {
        let unknown = || SecurityError::UnknownSigner {
            agent_id: request.agent_id.clone(),
        };
        let record = self.get(&request.agent_id).ok_or_else(unknown)?;
        let public_key = record
            .public_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(unknown)?;

        if let Err(e) = request.verify(public_key) {
            tracing::warn!(agent_id = %request.agent_id, error = %e, "request authentication failed");
            return Err(e.into());
        }

        self.record_trust_event(&request.agent_id, TrustEventKind::VerifiedHandshake, None)
            .await?;
        Ok(self.get(&request.agent_id).unwrap_or(record))
    }

    /// Merges a record received from a federation peer.
    ///
    /// New records are inserted; known records are replaced only by a
    /// strictly newer `updated_at`, keeping the local trust score and
    /// `created_at`. Records failing validation or verification are
    /// dropped, as is any copy of a keyed agent that is unsigned or under
    /// another key.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn merge_remote(&self, record: AgentRecord) -> MergeOutcome {
        if let Err(e) = record.validate() {
            return MergeOutcome::Rejected {
                reason: e.to_string(),
            };
        }
        if let Err(e) = self.verify_identity(&record) {
            return MergeOutcome::Rejected {
                reason: e.to_string(),
            };
        }

        let (outcome, stored) = {
            let mut state = self.state.write().expect("lock poisoned");
            let mut record = record;
            match state.records.get(&record.id).cloned() {
                None => {
                    record.trust_score = self
                        .trust
                        .seed(&record.id, self.trust.config().initial_score);
                    state.index.insert(&record);
                    state.mark_changed(&record.id);
                    state.records.insert(record.id.clone(), record.clone());
                    self.discovery.invalidate();
                    (MergeOutcome::Inserted, Some(record))
                }
                Some(local) if record.updated_at > local.updated_at => {
                    if let Err(e) = ensure_same_owner(&local, &record) {
                        return MergeOutcome::Rejected {
                            reason: e.to_string(),
                        };
                    }
                    state.index.remove(&local);
                    record.trust_score = local.trust_score;
                    record.created_at = local.created_at;
                    state.index.insert(&record);
                    state.mark_changed(&record.id);
                    state.records.insert(record.id.clone(), record.clone());
                    self.discovery.invalidate();
                    (MergeOutcome::Updated, Some(record))
                }
                Some(_) => (MergeOutcome::Unchanged, None),
            }
        };

        if let Some(stored) = stored {
            tracing::debug!(agent_id = %stored.id, ?outcome, "merged remote agent");
            self.persist(&stored).await;
            let kind = if outcome == MergeOutcome::Inserted {
                EventKind::AgentRegistered
            } else {
                EventKind::AgentUpdated
            };
            self.events.publish(&Event::record_changed(kind, &stored));
        }
        outcome
    }

    /// Records written on this node at or after `since` (all records when
    /// `None`), oldest `updated_at` first.
    ///
    /// The filter uses local write times, so a record merged from a peer
    /// counts as changed when it arrives whatever its `updated_at`. The
    /// returned `as_of` is read under the same lock as the records; passing
    /// it back as `since` never skips a write.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn changed_since(&self, since: Option<DateTime<Utc>>) -> ChangeSet {
        let state = self.state.read().expect("lock poisoned");
        let as_of = Utc::now();
        let mut agents: Vec<AgentRecord> = state
            .records
            .values()
            .filter(|r| {
                since.is_none_or(|since| {
                    state
                        .changed_at
                        .get(&r.id)
                        .is_none_or(|changed| *changed >= since)
                })
            })
            .cloned()
            .collect();
        drop(state);
        agents.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
        ChangeSet { as_of, agents }
    }

    /// Loads persisted records into memory and returns how many were
    /// loaded.
    ///
    /// Stored trust scores seed the trust engine. Invalid records are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the backend cannot be read.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub async fn load_from_storage(&self) -> Result<usize, StorageError> {
        let records = self.storage.load_all().await?;
        let mut state = self.state.write().expect("lock poisoned");
        let mut loaded = 0;
        for mut record in records {
            if let Err(e) = record.validate() {
                tracing::warn!(agent_id = %record.id, error = %e, "skipping invalid stored agent");
                continue;
            }
            if let Some(existing) = state.records.get(&record.id).cloned() {
                state.index.remove(&existing);
            }
            record.trust_score = self.trust.seed(&record.id, record.trust_score);
            state.index.insert(&record);
            state.mark_changed(&record.id);
            state.records.insert(record.id.clone(), record);
            loaded += 1;
        }
        self.discovery.invalidate();
        tracing::info!(loaded, "agents loaded from storage");
        Ok(loaded)
    }

    /// Returns counts describing the registry.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read().expect("lock poisoned");
        let mut by_health = HashMap::new();
        let mut legacy_agents = 0;
        let mut trust_sum = 0.0;
        for record in state.records.values() {
            *by_health.entry(record.health_status).or_insert(0) += 1;
            if record.is_legacy() {
                legacy_agents += 1;
            }
            trust_sum += self.trust.get_score(&record.id);
        }
        let total_agents = state.records.len();
        #[allow(clippy::cast_precision_loss)]
        let average_trust = if total_agents == 0 {
            0.0
        } else {
            trust_sum / total_agents as f64
        };
        RegistryStats {
            total_agents,
            by_health,
            legacy_agents,
            indexed_skills: state.index.skill_count(),
            indexed_tags: state.index.tag_count(),
            average_trust,
            subscribers: self.events.subscriber_count(),
        }
    }

    /// Returns true if the capability index matches the record set.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn index_is_consistent(&self) -> bool {
        let state = self.state.read().expect("lock poisoned");
        state.index.is_consistent_with(state.records.values())
    }
}
