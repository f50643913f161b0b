//! Trust scoring.
//!
//! The engine owns one scalar per agent in [0, 1] and nothing else about
//! the agent. It never writes to records: every mutation returns a
//! [`TrustUpdate`] that the registry applies and publishes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrustConfig;
use crate::record::NEUTRAL_TRUST;

/// Scores closer than this to neutral are not decayed.
const DECAY_DEADBAND: f64 = 0.001;

/// An observed interaction that moves an agent's trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEventKind {
    /// The agent served an invocation successfully.
    SuccessfulInvocation,
    /// The agent completed a signed handshake.
    VerifiedHandshake,
    /// The agent sent a heartbeat.
    ValidHeartbeat,
    /// An invocation timed out.
    Timeout,
    /// An invocation failed.
    InvocationFailure,
    /// The agent exceeded its rate limit.
    RateLimitAbuse,
    /// A signature claiming to be the agent's failed verification.
    SignatureForgery,
    /// Drift toward neutral, produced by the decay tick.
    Decay,
}

impl TrustEventKind {
    /// Score change for this event, before the diversity discount.
    ///
    /// `SignatureForgery` does not use its weight: it resets the score to 0.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::SuccessfulInvocation => 0.01,
            Self::VerifiedHandshake => 0.005,
            Self::ValidHeartbeat => 0.001,
            Self::Timeout => -0.05,
            Self::InvocationFailure => -0.10,
            Self::RateLimitAbuse => -0.02,
            Self::SignatureForgery => -1.0,
            Self::Decay => 0.0,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuccessfulInvocation => "successful_invocation",
            Self::VerifiedHandshake => "verified_handshake",
            Self::ValidHeartbeat => "valid_heartbeat",
            Self::Timeout => "timeout",
            Self::InvocationFailure => "invocation_failure",
            Self::RateLimitAbuse => "rate_limit_abuse",
            Self::SignatureForgery => "signature_forgery",
            Self::Decay => "decay",
        }
    }
}

impl fmt::Display for TrustEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One applied trust change, kept in the agent's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEvent {
    /// Agent whose score changed.
    pub agent_id: String,
    /// What caused the change.
    pub kind: TrustEventKind,
    /// Applied delta after discounting and clamping.
    pub delta: f64,
    /// Score after the change.
    pub score: f64,
    /// The other party of the interaction, if known.
    pub counterparty: Option<String>,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

/// The result of recording an event: the change the registry should apply.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustUpdate {
    /// Score before the event.
    pub previous: f64,
    /// The applied change.
    pub event: TrustEvent,
}

impl TrustUpdate {
    /// Agent the update is for.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.event.agent_id
    }

    /// New score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.event.score
    }

    /// Returns true if the score moved.
    #[must_use]
    pub fn changed(&self) -> bool {
        (self.event.score - self.previous).abs() > f64::EPSILON
    }
}

/// Detailed view of an agent's trust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustBreakdown {
    /// Current score.
    pub overall: f64,
    /// Successes over all non-timeout outcomes.
    pub reliability: f64,
    /// Non-timeout outcomes over all outcomes.
    pub performance: f64,
    /// Heartbeat presence blended with the score.
    pub availability: f64,
    /// Events seen per kind.
    pub counts: BTreeMap<TrustEventKind, u64>,
    /// Most recent changes, oldest first.
    pub history: Vec<TrustEvent>,
}

#[derive(Debug)]
struct AgentTrust {
    score: f64,
    last_activity: DateTime<Utc>,
    counts: BTreeMap<TrustEventKind, u64>,
    history: VecDeque<TrustEvent>,
    interactions: VecDeque<(String, DateTime<Utc>)>,
}

impl AgentTrust {
    fn new(score: f64, now: DateTime<Utc>) -> Self {
        Self {
            score,
            last_activity: now,
            counts: BTreeMap::new(),
            history: VecDeque::new(),
            interactions: VecDeque::new(),
        }
    }

    fn count(&self, kind: TrustEventKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    fn push_history(&mut self, event: TrustEvent, limit: usize) {
        self.history.push_back(event);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

/// Per-agent trust scores.
///
/// # Examples
///
/// ```
/// use agentmesh::{TrustConfig, TrustEngine, TrustEventKind};
///
/// let engine = TrustEngine::new(TrustConfig::default());
/// assert_eq!(engine.get_score("unknown"), 0.5);
///
/// let update = engine.record_event("a1", TrustEventKind::SignatureForgery, None);
/// assert_eq!(update.score(), 0.0);
/// ```
#[derive(Debug)]
pub struct TrustEngine {
    agents: RwLock<HashMap<String, AgentTrust>>,
    config: TrustConfig,
}

impl TrustEngine {
    /// Creates an engine with no tracked agents.
    #[must_use]
    pub fn new(config: TrustConfig) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Returns the agent's score, or the initial score if unknown.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn get_score(&self, agent_id: &str) -> f64 {
        self.agents
            .read()
            .expect("lock poisoned")
            .get(agent_id)
            .map_or(self.config.initial_score, |t| t.score)
    }

    /// Starts tracking an agent at `score` unless it is already tracked.
    ///
    /// Returns the score in effect afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn seed(&self, agent_id: &str, score: f64) -> f64 {
        let mut agents = self.agents.write().expect("lock poisoned");
        agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentTrust::new(score.clamp(0.0, 1.0), Utc::now()))
            .score
    }

    /// Stops tracking an agent.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn forget(&self, agent_id: &str) {
        self.agents.write().expect("lock poisoned").remove(agent_id);
    }

    /// Returns the number of tracked agents.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn tracked_agents(&self) -> usize {
        self.agents.read().expect("lock poisoned").len()
    }

    /// Records an event now.
    ///
    /// See [`record_event_at`](Self::record_event_at).
    pub fn record_event(
        &self,
        agent_id: &str,
        kind: TrustEventKind,
        counterparty: Option<&str>,
    ) -> TrustUpdate {
        self.record_event_at(agent_id, kind, counterparty, Utc::now())
    }

    /// Records an event at `now` and returns the resulting update.
    ///
    /// Positive deltas from a counterparty other than the agent itself are
    /// halved for every earlier interaction with that counterparty inside
    /// the diversity window. Forgery resets the score to exactly 0.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn record_event_at(
        &self,
        agent_id: &str,
        kind: TrustEventKind,
        counterparty: Option<&str>,
        now: DateTime<Utc>,
    ) -> TrustUpdate {
        let window = Duration::from_std(self.config.diversity_window).unwrap_or(Duration::MAX);
        let mut agents = self.agents.write().expect("lock poisoned");
        let trust = agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentTrust::new(self.config.initial_score, now));

        *trust.counts.entry(kind).or_insert(0) += 1;
        trust.last_activity = now;
        let previous = trust.score;

        let new_score = if kind == TrustEventKind::SignatureForgery {
            0.0
        } else {
            let mut delta = kind.weight();
            if let Some(peer) = counterparty.filter(|p| *p != agent_id && delta > 0.0) {
                while trust
                    .interactions
                    .front()
                    .is_some_and(|(_, at)| now - *at >= window)
                {
                    trust.interactions.pop_front();
                }
                let repeats = trust.interactions.iter().filter(|(p, _)| p == peer).count();
                if repeats > 0 {
                    let exponent = i32::try_from(repeats).unwrap_or(i32::MAX);
                    delta *= 0.5_f64.powi(exponent);
                    tracing::debug!(agent_id, peer, repeats, "diversity discount applied");
                }
                trust.interactions.push_back((peer.to_string(), now));
            }
            (previous + delta).clamp(0.0, 1.0)
        };

        trust.score = new_score;
        let event = TrustEvent {
            agent_id: agent_id.to_string(),
            kind,
            delta: new_score - previous,
            score: new_score,
            counterparty: counterparty.map(str::to_string),
            timestamp: now,
        };
        if (new_score - previous).abs() > f64::EPSILON {
            trust.push_history(event.clone(), self.config.history_limit);
            tracing::debug!(agent_id, %kind, previous, score = new_score, "trust updated");
        }
        TrustUpdate { previous, event }
    }

    /// Moves inactive scores toward neutral, now.
    pub fn decay_tick(&self) -> Vec<TrustUpdate> {
        self.decay_tick_at(Utc::now())
    }

    /// Moves every score whose last activity is older than the inactivity
    /// threshold a fraction `decay_rate` of the way to neutral.
    ///
    /// Returns one update per changed agent.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn decay_tick_at(&self, now: DateTime<Utc>) -> Vec<TrustUpdate> {
        let inactivity = Duration::from_std(self.config.decay_inactivity).unwrap_or(Duration::MAX);
        let mut agents = self.agents.write().expect("lock poisoned");
        let mut updates = Vec::new();

        for (agent_id, trust) in agents.iter_mut() {
            if now - trust.last_activity <= inactivity {
                continue;
            }
            let gap = NEUTRAL_TRUST - trust.score;
            if gap.abs() < DECAY_DEADBAND {
                continue;
            }
            let previous = trust.score;
            trust.score = (previous + gap * self.config.decay_rate).clamp(0.0, 1.0);
            *trust.counts.entry(TrustEventKind::Decay).or_insert(0) += 1;
            let event = TrustEvent {
                agent_id: agent_id.clone(),
                kind: TrustEventKind::Decay,
                delta: trust.score - previous,
                score: trust.score,
                counterparty: None,
                timestamp: now,
            };
            trust.push_history(event.clone(), self.config.history_limit);
            updates.push(TrustUpdate { previous, event });
        }

        if !updates.is_empty() {
            tracing::debug!(count = updates.len(), "trust scores decayed");
        }
        updates
    }

    /// Returns the detailed breakdown for an agent.
    ///
    /// Unknown agents get the initial score and empty counts.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn breakdown(&self, agent_id: &str) -> TrustBreakdown {
        let agents = self.agents.read().expect("lock poisoned");
        let Some(trust) = agents.get(agent_id) else {
            return TrustBreakdown {
                overall: self.config.initial_score,
                reliability: 1.0,
                performance: 1.0,
                availability: round2(f64::midpoint(0.5, self.config.initial_score)),
                counts: BTreeMap::new(),
                history: Vec::new(),
            };
        };

        let success = trust.count(TrustEventKind::SuccessfulInvocation);
        let failure = trust.count(TrustEventKind::InvocationFailure);
        let timeout = trust.count(TrustEventKind::Timeout);
        let forgery = trust.count(TrustEventKind::SignatureForgery);
        let rate_limit = trust.count(TrustEventKind::RateLimitAbuse);
        let heartbeat = trust.count(TrustEventKind::ValidHeartbeat);

        let outcomes = success + failure + forgery + rate_limit;
        let total = outcomes + timeout;
        let reliability = ratio(success, outcomes);
        let performance = ratio(total - timeout, total);
        let presence = if heartbeat > 0 { 1.0 } else { 0.5 };

        TrustBreakdown {
            overall: trust.score,
            reliability: round2(reliability),
            performance: round2(performance),
            availability: round2(f64::midpoint(presence, trust.score)),
            counts: trust.counts.clone(),
            history: trust.history.iter().cloned().collect(),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
