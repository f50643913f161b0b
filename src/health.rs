//! Heartbeat bookkeeping and staleness detection.
//!
//! The monitor decides transitions; it does not own records. The registry
//! passes records in under its write lock, then persists and publishes the
//! transitions it gets back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HealthConfig;
use crate::record::{AgentRecord, HealthStatus};

/// Acknowledgement returned to a heartbeating agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReceipt {
    /// Agent that sent the heartbeat.
    pub agent_id: String,
    /// Status now on record.
    pub status: HealthStatus,
    /// Time the heartbeat was recorded.
    pub timestamp: DateTime<Utc>,
    /// When the agent should heartbeat next.
    pub next_check: DateTime<Utc>,
}

/// A status change produced by a heartbeat or a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTransition {
    /// Agent whose status changed.
    pub agent_id: String,
    /// Status before.
    pub previous: HealthStatus,
    /// Status after.
    pub current: HealthStatus,
}

/// Applies heartbeats and detects silent agents.
#[derive(Debug, Clone, Default)]
pub struct HealthMonitor {
    config: HealthConfig,
}

impl HealthMonitor {
    /// Creates a monitor.
    #[must_use]
    pub const fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn max_silence(&self) -> Duration {
        Duration::from_std(self.config.max_unhealthy).unwrap_or(Duration::MAX)
    }

    fn next_check(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + Duration::from_std(self.config.check_interval).unwrap_or(Duration::zero())
    }

    /// Records a heartbeat on `record`.
    ///
    /// Sets the status and `last_heartbeat`, advances `updated_at`, and
    /// returns a transition only if the status changed.
    pub fn record_heartbeat(
        &self,
        record: &mut AgentRecord,
        status: HealthStatus,
        timestamp: DateTime<Utc>,
    ) -> (HeartbeatReceipt, Option<HealthTransition>) {
        let previous = record.health_status;
        record.health_status = status;
        record.last_heartbeat = Some(timestamp);
        record.touch_at(timestamp);

        let receipt = HeartbeatReceipt {
            agent_id: record.id.clone(),
            status,
            timestamp,
            next_check: self.next_check(timestamp),
        };
        let transition = (previous != status).then(|| HealthTransition {
            agent_id: record.id.clone(),
            previous,
            current: status,
        });
        (receipt, transition)
    }

    /// Returns true if the agent has heartbeated before but not within the
    /// offline threshold.
    #[must_use]
    pub fn is_stale(&self, record: &AgentRecord, now: DateTime<Utc>) -> bool {
        record
            .last_heartbeat
            .is_some_and(|last| now - last > self.max_silence())
    }

    /// Marks `record` offline if it is stale and not offline already.
    pub fn check_agent(
        &self,
        record: &mut AgentRecord,
        now: DateTime<Utc>,
    ) -> Option<HealthTransition> {
        if !self.is_stale(record, now) || record.health_status == HealthStatus::Offline {
            return None;
        }
        let previous = record.health_status;
        record.health_status = HealthStatus::Offline;
        record.touch_at(now);
        tracing::warn!(agent_id = %record.id, %previous, "agent marked offline");
        Some(HealthTransition {
            agent_id: record.id.clone(),
            previous,
            current: HealthStatus::Offline,
        })
    }

    /// Runs [`check_agent`](Self::check_agent) over every record.
    ///
    /// Agents that never heartbeated are skipped.
    pub fn sweep<'a>(
        &self,
        records: impl IntoIterator<Item = &'a mut AgentRecord>,
        now: DateTime<Utc>,
    ) -> Vec<HealthTransition> {
        records
            .into_iter()
            .filter_map(|record| self.check_agent(record, now))
            .collect()
    }
}
