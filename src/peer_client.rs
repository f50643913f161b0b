//! Client side of the federation pull contract.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PeerError;
use crate::record::AgentRecord;

/// Path peers serve snapshots on.
pub const PULL_PATH: &str = "/federation/pull";

/// What a peer returns from a pull.
///
/// Agents stay raw JSON on the wire so a single malformed record can be
/// dropped without losing the rest of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullSnapshot {
    /// Records changed since the requested cursor.
    pub agents: Vec<serde_json::Value>,
    /// Peer URLs the responding node knows.
    #[serde(default)]
    pub peers: Vec<String>,
    /// The responder's clock when the snapshot was taken; the next cursor.
    pub timestamp: DateTime<Utc>,
}

impl PullSnapshot {
    /// Builds a snapshot from typed records.
    #[must_use]
    pub fn new(records: &[AgentRecord], peers: Vec<String>, timestamp: DateTime<Utc>) -> Self {
        let agents = records
            .iter()
            .filter_map(|record| match serde_json::to_value(record) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(agent_id = %record.id, error = %e, "failed to encode agent");
                    None
                }
            })
            .collect();
        Self {
            agents,
            peers,
            timestamp,
        }
    }

    /// Decodes each agent on its own, pairing failures with the claimed ID
    /// when one is present.
    #[must_use]
    pub fn records(&self) -> Vec<Result<AgentRecord, (Option<String>, String)>> {
        self.agents
            .iter()
            .map(|value| {
                serde_json::from_value::<AgentRecord>(value.clone()).map_err(|e| {
                    let id = value.get("id").and_then(|id| id.as_str()).map(String::from);
                    (id, e.to_string())
                })
            })
            .collect()
    }
}

/// Fetches snapshots from peers.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Pulls records changed after `since` (everything when `None`).
    async fn pull(
        &self,
        peer_url: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<PullSnapshot, PeerError>;
}

/// Prepends `http://` to a peer URL without a scheme and drops any
/// trailing slash.
///
/// # Examples
///
/// ```
/// use agentmesh::normalize_peer_url;
///
/// assert_eq!(normalize_peer_url("node-b:8000/"), "http://node-b:8000");
/// assert_eq!(normalize_peer_url("https://node-c"), "https://node-c");
/// ```
#[must_use]
pub fn normalize_peer_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// [`PeerClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPeerClient {
    /// Creates a client whose requests time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_error(&self, peer: &str, e: &reqwest::Error) -> PeerError {
        if e.is_timeout() {
            PeerError::Timeout {
                peer: peer.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else if e.is_decode() {
            PeerError::Decode {
                peer: peer.to_string(),
                reason: e.to_string(),
            }
        } else {
            PeerError::unreachable(peer, e.to_string())
        }
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn pull(
        &self,
        peer_url: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<PullSnapshot, PeerError> {
        let url = format!("{}{PULL_PATH}", normalize_peer_url(peer_url));
        tracing::debug!(%url, ?since, "pulling peer");

        let mut request = self.client.get(&url).timeout(self.timeout);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_error(peer_url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::BadStatus {
                peer: peer_url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<PullSnapshot>()
            .await
            .map_err(|e| match self.map_error(peer_url, &e) {
                PeerError::Unreachable { peer, reason } => PeerError::Decode { peer, reason },
                other => other,
            })
    }
}
