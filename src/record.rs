//! Agent record model.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use agentmesh_identity::{SecurityError, SigningKey, derive_id, sign_manifest, verify_manifest};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Maximum agent ID length.
pub const MAX_ID_LENGTH: usize = 100;

/// Maximum agent name length.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum version string length.
pub const MAX_VERSION_LENGTH: usize = 20;

/// Maximum description length.
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Trust score given to agents with no history.
pub const NEUTRAL_TRUST: f64 = 0.5;

/// Transport an agent is invoked over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP.
    #[default]
    Http,
    /// WebSocket.
    Websocket,
    /// gRPC.
    Grpc,
    /// Reached through a relay.
    Relay,
    /// Anything else.
    Custom,
    /// Agent-to-agent protocol.
    A2a,
    /// Model Context Protocol.
    Mcp,
}

impl Protocol {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Websocket => "websocket",
            Self::Grpc => "grpc",
            Self::Relay => "relay",
            Self::Custom => "custom",
            Self::A2a => "a2a",
            Self::Mcp => "mcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "websocket" => Ok(Self::Websocket),
            "grpc" => Ok(Self::Grpc),
            "relay" => Ok(Self::Relay),
            "custom" => Ok(Self::Custom),
            "a2a" => Ok(Self::A2a),
            "mcp" => Ok(Self::Mcp),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

/// Liveness of an agent as seen by the health monitor.
///
/// ```text
/// unknown -> healthy <-> unhealthy -> offline
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Heartbeating and reporting healthy.
    Healthy,
    /// Heartbeating but reporting a problem.
    Unhealthy,
    /// Silent for longer than the unhealthy threshold.
    Offline,
    /// Never heard from.
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Uptime factor used in discovery ranking.
    #[must_use]
    pub const fn uptime_weight(self) -> f64 {
        match self {
            Self::Healthy => 1.0,
            Self::Unknown => 0.5,
            Self::Unhealthy => 0.25,
            Self::Offline => 0.0,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named capability an agent offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Skill name, unique within a record.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl Skill {
    /// Creates a skill.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A registry entry for one agent.
///
/// Declared fields come from the agent and are covered by its manifest
/// signature. Server-managed fields (`health_status`, `trust_score`, the
/// timestamps) are maintained by the registry and excluded from the
/// signature.
///
/// # Examples
///
/// ```
/// use agentmesh::{AgentRecord, Skill};
/// use agentmesh_identity::SigningKey;
///
/// let key = SigningKey::generate();
/// let record = AgentRecord::new("Summarizer", "1.0.0", "http://localhost:9000")
///     .with_skill(Skill::new("summarize", "Condense long text"))
///     .with_tag("nlp")
///     .signed_by(&key)
///     .unwrap();
///
/// assert!(!record.is_legacy());
/// assert!(record.verify_signature().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent ID, derived from the public key for signed agents.
    pub id: String,
    /// Base64 Ed25519 public key.
    #[serde(default)]
    pub public_key: Option<String>,
    /// `ed25519:<base64>` signature over the manifest.
    #[serde(default)]
    pub manifest_signature: Option<String>,
    /// Display name.
    pub name: String,
    /// Agent version.
    pub version: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Offered skills, in declaration order.
    #[serde(default)]
    pub skills: Vec<Skill>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Invocation endpoint URI.
    pub endpoint: String,
    /// Invocation transport.
    #[serde(default)]
    pub protocol: Protocol,
    /// Organization providing the agent.
    #[serde(default)]
    pub provider: Option<String>,
    /// Account that owns the agent.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Capability strings used for similarity text.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Preferred text for similarity embedding.
    #[serde(default)]
    pub vector_desc: Option<String>,
    /// Global queries-per-second budget.
    #[serde(default)]
    pub qps_budget: Option<f64>,
    /// Maximum concurrent requests.
    #[serde(default)]
    pub concurrency_limit: Option<u32>,
    /// Current health status.
    #[serde(default)]
    pub health_status: HealthStatus,
    /// Current trust score in [0, 1].
    #[serde(default = "neutral_trust")]
    pub trust_score: f64,
    /// First registration time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; the federation tie-breaker.
    pub updated_at: DateTime<Utc>,
    /// Time of the last heartbeat, if any.
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

const fn neutral_trust() -> f64 {
    NEUTRAL_TRUST
}

impl AgentRecord {
    /// Creates an unsigned record with a fresh timestamp.
    ///
    /// The ID is empty until [`with_id`](Self::with_id) or
    /// [`signed_by`](Self::signed_by) sets it.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            public_key: None,
            manifest_signature: None,
            name: name.into(),
            version: version.into(),
            description: String::new(),
            skills: Vec::new(),
            tags: BTreeSet::new(),
            endpoint: endpoint.into(),
            protocol: Protocol::default(),
            provider: None,
            owner_id: None,
            capabilities: Vec::new(),
            vector_desc: None,
            qps_budget: None,
            concurrency_limit: None,
            health_status: HealthStatus::Unknown,
            trust_score: NEUTRAL_TRUST,
            created_at: now,
            updated_at: now,
            last_heartbeat: None,
        }
    }

    /// Sets the agent ID (legacy records only; signed records derive it).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a skill.
    #[must_use]
    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skills.push(skill);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sets the protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Adds a capability string.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Sets the queries-per-second budget.
    #[must_use]
    pub const fn with_qps_budget(mut self, qps: f64) -> Self {
        self.qps_budget = Some(qps);
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub const fn with_concurrency_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// Binds the record to `key`: sets the public key, derives the ID, and
    /// signs the manifest.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Encoding` if the manifest cannot be encoded.
    pub fn signed_by(mut self, key: &SigningKey) -> Result<Self, SecurityError> {
        let public_key = key.verifying_key().to_base64();
        self.id = derive_id(&public_key);
        self.public_key = Some(public_key);
        self.resign(key)?;
        Ok(self)
    }

    /// Re-signs the manifest after declared fields changed.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Encoding` if the manifest cannot be encoded.
    pub fn resign(&mut self, key: &SigningKey) -> Result<(), SecurityError> {
        let manifest = self.manifest()?;
        self.manifest_signature = Some(sign_manifest(key, &manifest));
        Ok(())
    }

    /// Returns the record as a JSON manifest.
    ///
    /// Excluded fields are still present here; the identity crate removes
    /// them when computing the signed payload.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Encoding` if serialization fails.
    pub fn manifest(&self) -> Result<Value, SecurityError> {
        serde_json::to_value(self).map_err(|e| SecurityError::Encoding {
            reason: e.to_string(),
        })
    }

    /// Verifies the manifest signature against the record's public key.
    ///
    /// # Errors
    ///
    /// Any `SecurityError` from manifest verification.
    pub fn verify_signature(&self) -> Result<(), SecurityError> {
        verify_manifest(
            &self.manifest()?,
            self.manifest_signature.as_deref(),
            self.public_key.as_deref(),
        )
    }

    /// Returns true if the record carries no public key.
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.public_key.as_deref().is_none_or(str::is_empty)
    }

    /// Returns true if the record carries a manifest signature.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.manifest_signature
            .as_deref()
            .is_some_and(|s| !s.is_empty())
    }

    /// Advances `updated_at` to now, or by one microsecond if the clock has
    /// not moved past it.
    pub fn touch(&mut self) {
        self.touch_at(Utc::now());
    }

    /// Advances `updated_at` to `now`, keeping it strictly increasing.
    pub fn touch_at(&mut self, now: DateTime<Utc>) {
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }

    /// Returns the text used for similarity scoring.
    #[must_use]
    pub fn similarity_text(&self) -> String {
        if let Some(desc) = self.vector_desc.as_deref().filter(|d| !d.is_empty()) {
            return desc.to_string();
        }
        let mut parts = vec![self.name.clone(), self.description.clone()];
        parts.extend(self.skills.iter().map(|s| format!("{} {}", s.name, s.description)));
        parts.extend(self.capabilities.iter().cloned());
        parts.extend(self.tags.iter().cloned());
        parts.retain(|p| !p.trim().is_empty());
        parts.join(" ")
    }

    /// Checks the record shape.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id(&self.id)?;
        check_text("name", &self.name, MAX_NAME_LENGTH, true)?;
        check_text("version", &self.version, MAX_VERSION_LENGTH, true)?;
        check_text("description", &self.description, MAX_DESCRIPTION_LENGTH, false)?;
        if self.endpoint.trim().is_empty() {
            return Err(ValidationError::Empty { field: "endpoint" });
        }
        validate_skills(&self.skills)?;
        if self.qps_budget.is_some_and(|q| q.is_nan() || q <= 0.0) {
            return Err(ValidationError::NotPositive {
                field: "qps_budget",
            });
        }
        if self.concurrency_limit == Some(0) {
            return Err(ValidationError::NotPositive {
                field: "concurrency_limit",
            });
        }
        if !(0.0..=1.0).contains(&self.trust_score) {
            return Err(ValidationError::TrustOutOfRange);
        }
        Ok(())
    }
}

fn validate_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::Empty { field: "id" });
    }
    let len = id.chars().count();
    if len > MAX_ID_LENGTH {
        return Err(ValidationError::TooLong {
            field: "id",
            max: MAX_ID_LENGTH,
            actual: len,
        });
    }
    match id
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '-' | ':')))
    {
        Some(char) => Err(ValidationError::InvalidIdChar { char }),
        None => Ok(()),
    }
}

fn check_text(
    field: &'static str,
    value: &str,
    max: usize,
    required: bool,
) -> Result<(), ValidationError> {
    if required && value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(())
}

fn validate_skills(skills: &[Skill]) -> Result<(), ValidationError> {
    if skills.is_empty() {
        return Err(ValidationError::NoSkills);
    }
    let mut seen = BTreeSet::new();
    for skill in skills {
        if skill.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "skill.name" });
        }
        if !seen.insert(skill.name.as_str()) {
            return Err(ValidationError::DuplicateSkill {
                name: skill.name.clone(),
            });
        }
    }
    Ok(())
}

/// A partial profile update.
///
/// Only `Some` fields are applied. Changing declared fields of a signed
/// agent invalidates its manifest signature, so a fresh
/// `manifest_signature` must accompany such updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    /// New name.
    pub name: Option<String>,
    /// New version.
    pub version: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Replacement skill list.
    pub skills: Option<Vec<Skill>>,
    /// Replacement tag set.
    pub tags: Option<BTreeSet<String>>,
    /// New endpoint.
    pub endpoint: Option<String>,
    /// New protocol.
    pub protocol: Option<Protocol>,
    /// New provider.
    pub provider: Option<String>,
    /// Replacement capability list.
    pub capabilities: Option<Vec<String>>,
    /// New similarity text.
    pub vector_desc: Option<String>,
    /// New QPS budget.
    pub qps_budget: Option<f64>,
    /// New concurrency limit.
    pub concurrency_limit: Option<u32>,
    /// Signature over the updated manifest.
    pub manifest_signature: Option<String>,
}

impl AgentUpdate {
    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the set fields to `record`. Does not touch `updated_at`.
    pub fn apply_to(self, record: &mut AgentRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(version) = self.version {
            record.version = version;
        }
        if let Some(description) = self.description {
            record.description = description;
        }
        if let Some(skills) = self.skills {
            record.skills = skills;
        }
        if let Some(tags) = self.tags {
            record.tags = tags;
        }
        if let Some(endpoint) = self.endpoint {
            record.endpoint = endpoint;
        }
        if let Some(protocol) = self.protocol {
            record.protocol = protocol;
        }
        if let Some(provider) = self.provider {
            record.provider = Some(provider);
        }
        if let Some(capabilities) = self.capabilities {
            record.capabilities = capabilities;
        }
        if let Some(vector_desc) = self.vector_desc {
            record.vector_desc = Some(vector_desc);
        }
        if let Some(qps) = self.qps_budget {
            record.qps_budget = Some(qps);
        }
        if let Some(limit) = self.concurrency_limit {
            record.concurrency_limit = Some(limit);
        }
        if let Some(signature) = self.manifest_signature {
            record.manifest_signature = Some(signature);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy() -> AgentRecord {
        AgentRecord::new("Weather", "1.0.0", "http://localhost:8080")
            .with_id("weather-agent-001")
            .with_skill(Skill::new("get_weather", "Weather by city"))
    }

    #[test]
    fn valid_legacy_record() {
        let record = legacy();
        assert!(record.validate().is_ok());
        assert!(record.is_legacy());
        assert!(!record.is_signed());
    }

    #[test]
    fn did_style_id_is_allowed() {
        let record = legacy().with_id("did:agent:abc123");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn id_with_slash_is_rejected() {
        let record = legacy().with_id("a/b");
        assert_eq!(
            record.validate(),
            Err(ValidationError::InvalidIdChar { char: '/' })
        );
    }

    #[test]
    fn skills_are_required_and_unique() {
        let mut record = legacy();
        record.skills.clear();
        assert_eq!(record.validate(), Err(ValidationError::NoSkills));

        let record = legacy().with_skill(Skill::new("get_weather", "again"));
        assert!(matches!(
            record.validate(),
            Err(ValidationError::DuplicateSkill { .. })
        ));
    }

    #[test]
    fn length_limits() {
        let mut record = legacy();
        record.version = "1".repeat(21);
        assert!(matches!(
            record.validate(),
            Err(ValidationError::TooLong {
                field: "version",
                ..
            })
        ));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let record = legacy().with_concurrency_limit(0);
        assert_eq!(
            record.validate(),
            Err(ValidationError::NotPositive {
                field: "concurrency_limit"
            })
        );
        let record = legacy().with_qps_budget(0.0);
        assert!(record.validate().is_err());
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let mut record = legacy();
        record.endpoint = " ".into();
        assert_eq!(
            record.validate(),
            Err(ValidationError::Empty { field: "endpoint" })
        );
    }

    #[test]
    fn touch_is_strictly_increasing() {
        let mut record = legacy();
        let before = record.updated_at;
        record.touch_at(before);
        assert_eq!(record.updated_at, before + Duration::microseconds(1));
        record.touch_at(before - Duration::seconds(10));
        assert!(record.updated_at > before);
    }

    #[test]
    fn signed_record_survives_server_field_changes() {
        let key = SigningKey::generate();
        let mut record = legacy().signed_by(&key).unwrap();

        record.trust_score = 0.9;
        record.health_status = HealthStatus::Healthy;
        record.touch();

        assert!(record.verify_signature().is_ok());
    }

    #[test]
    fn declared_change_breaks_signature_until_resigned() {
        let key = SigningKey::generate();
        let mut record = legacy().signed_by(&key).unwrap();

        record.endpoint = "http://elsewhere:9000".into();
        assert!(record.verify_signature().is_err());

        record.resign(&key).unwrap();
        assert!(record.verify_signature().is_ok());
    }

    #[test]
    fn update_applies_only_set_fields() {
        let mut record = legacy();
        let update = AgentUpdate {
            description: Some("Forecasts".into()),
            protocol: Some(Protocol::Grpc),
            ..AgentUpdate::default()
        };
        update.apply_to(&mut record);

        assert_eq!(record.description, "Forecasts");
        assert_eq!(record.protocol, Protocol::Grpc);
        assert_eq!(record.name, "Weather");
    }

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!("MCP".parse::<Protocol>(), Ok(Protocol::Mcp));
        assert!("smtp".parse::<Protocol>().is_err());
    }

    #[test]
    fn record_json_roundtrip_keeps_timestamps() {
        let record = legacy();
        let text = serde_json::to_string(&record).unwrap();
        let back: AgentRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn similarity_text_prefers_vector_desc() {
        let mut record = legacy();
        assert!(record.similarity_text().contains("get_weather"));
        record.vector_desc = Some("forecast service".into());
        assert_eq!(record.similarity_text(), "forecast service");
    }
}
