//! File and environment settings.
//!
//! Settings are read from `<dir>/default.toml`, then `<dir>/<AGENTMESH_ENV>`
//! (default `development`), then `AGENTMESH__*` environment variables such
//! as `AGENTMESH__FEDERATION__SYNC_INTERVAL_SECS=30`. Every key is
//! optional.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::config::{DiscoveryConfig, FederationConfig, HealthConfig, RegistryConfig, TrustConfig};
use crate::error::SettingsError;

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Reject unsigned registrations.
    pub require_signed_registration: bool,
    /// Default list page size.
    pub default_list_limit: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        let config = RegistryConfig::default();
        Self {
            require_signed_registration: config.require_signed_registration,
            default_list_limit: config.default_list_limit,
        }
    }
}

/// Trust settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustSettings {
    /// Starting score.
    pub initial_score: f64,
    /// Decay rate per tick.
    pub decay_rate: f64,
    /// Inactivity before decay, in seconds.
    pub decay_inactivity_secs: u64,
    /// Decay loop cadence, in seconds.
    pub decay_interval_secs: u64,
    /// Diversity window, in seconds.
    pub diversity_window_secs: u64,
    /// History entries kept per agent.
    pub history_limit: usize,
}

impl Default for TrustSettings {
    fn default() -> Self {
        let config = TrustConfig::default();
        Self {
            initial_score: config.initial_score,
            decay_rate: config.decay_rate,
            decay_inactivity_secs: config.decay_inactivity.as_secs(),
            decay_interval_secs: config.decay_interval.as_secs(),
            diversity_window_secs: config.diversity_window.as_secs(),
            history_limit: config.history_limit,
        }
    }
}

/// Health settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Sweep cadence, in seconds.
    pub check_interval_secs: u64,
    /// Silence before offline, in seconds.
    pub max_unhealthy_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        let config = HealthConfig::default();
        Self {
            check_interval_secs: config.check_interval.as_secs(),
            max_unhealthy_secs: config.max_unhealthy.as_secs(),
        }
    }
}

/// Discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Similarity ranking weight.
    pub similarity_weight: f64,
    /// Trust ranking weight.
    pub trust_weight: f64,
    /// Uptime ranking weight.
    pub uptime_weight: f64,
    /// Cached result sets.
    pub cache_capacity: usize,
    /// Default result limit.
    pub default_limit: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        let config = DiscoveryConfig::default();
        Self {
            similarity_weight: config.similarity_weight,
            trust_weight: config.trust_weight,
            uptime_weight: config.uptime_weight,
            cache_capacity: config.cache_capacity,
            default_limit: config.default_limit,
        }
    }
}

/// Federation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationSettings {
    /// This node's advertised URL.
    pub node_url: Option<String>,
    /// Peers known at startup.
    pub seed_peers: Vec<String>,
    /// Sync cadence, in seconds.
    pub sync_interval_secs: u64,
    /// Per-peer pull timeout, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Failures before a peer is marked unreachable.
    pub max_peer_failures: u32,
}

impl Default for FederationSettings {
    fn default() -> Self {
        let config = FederationConfig::default();
        Self {
            node_url: config.node_url,
            seed_peers: config.seed_peers,
            sync_interval_secs: config.sync_interval.as_secs(),
            fetch_timeout_ms: u64::try_from(config.fetch_timeout.as_millis()).unwrap_or(5_000),
            max_peer_failures: config.max_peer_failures,
        }
    }
}

/// All node settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Registry section.
    pub registry: RegistrySettings,
    /// Trust section.
    pub trust: TrustSettings,
    /// Health section.
    pub health: HealthSettings,
    /// Discovery section.
    pub discovery: DiscoverySettings,
    /// Federation section.
    pub federation: FederationSettings,
    /// Logging section.
    pub logging: LoggingSettings,
}

fn positive(key: &'static str, value: u64) -> Result<Duration, SettingsError> {
    if value == 0 {
        return Err(SettingsError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(value))
}

fn unit_interval(key: &'static str, value: f64) -> Result<f64, SettingsError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SettingsError::Invalid {
            key,
            reason: format!("{value} is outside [0, 1]"),
        });
    }
    Ok(value)
}

impl MeshSettings {
    /// Loads settings from `./config`.
    ///
    /// # Errors
    ///
    /// See [`load_from`](Self::load_from).
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from("config")
    }

    /// Loads settings from `config_dir` and the environment.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Load` if a source is malformed or a value has
    /// the wrong type, and `SettingsError::Invalid` if a value is out of
    /// range.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, SettingsError> {
        let config_dir = config_dir.as_ref();
        let env_name =
            std::env::var("AGENTMESH_ENV").unwrap_or_else(|_| "development".to_string());

        let settings: Self = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(env_name)).required(false))
            .add_source(
                Environment::with_prefix("AGENTMESH")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("federation.seed_peers")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` naming the first bad key.
    pub fn validate(&self) -> Result<(), SettingsError> {
        unit_interval("trust.initial_score", self.trust.initial_score)?;
        unit_interval("trust.decay_rate", self.trust.decay_rate)?;
        positive("trust.decay_interval_secs", self.trust.decay_interval_secs)?;
        positive("health.check_interval_secs", self.health.check_interval_secs)?;
        positive("federation.sync_interval_secs", self.federation.sync_interval_secs)?;
        positive("federation.fetch_timeout_ms", self.federation.fetch_timeout_ms)?;
        for (key, weight) in [
            ("discovery.similarity_weight", self.discovery.similarity_weight),
            ("discovery.trust_weight", self.discovery.trust_weight),
            ("discovery.uptime_weight", self.discovery.uptime_weight),
        ] {
            if weight < 0.0 {
                return Err(SettingsError::Invalid {
                    key,
                    reason: format!("weight {weight} is negative"),
                });
            }
        }
        Ok(())
    }

    /// Registry runtime configuration.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::new()
            .with_require_signed_registration(self.registry.require_signed_registration)
            .with_default_list_limit(self.registry.default_list_limit)
    }

    /// Trust runtime configuration.
    #[must_use]
    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig {
            initial_score: self.trust.initial_score,
            ..TrustConfig::default()
        }
        .with_decay_rate(self.trust.decay_rate)
        .with_decay_inactivity(Duration::from_secs(self.trust.decay_inactivity_secs))
        .with_decay_interval(Duration::from_secs(self.trust.decay_interval_secs))
        .with_diversity_window(Duration::from_secs(self.trust.diversity_window_secs))
        .with_history_limit(self.trust.history_limit)
    }

    /// Health runtime configuration.
    #[must_use]
    pub fn health_config(&self) -> HealthConfig {
        HealthConfig::new()
            .with_check_interval(Duration::from_secs(self.health.check_interval_secs))
            .with_max_unhealthy(Duration::from_secs(self.health.max_unhealthy_secs))
    }

    /// Discovery runtime configuration.
    #[must_use]
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig::new()
            .with_weights(
                self.discovery.similarity_weight,
                self.discovery.trust_weight,
                self.discovery.uptime_weight,
            )
            .with_cache_capacity(self.discovery.cache_capacity)
            .with_default_limit(self.discovery.default_limit)
    }

    /// Federation runtime configuration.
    #[must_use]
    pub fn federation_config(&self) -> FederationConfig {
        let mut config = FederationConfig::new()
            .with_sync_interval(Duration::from_secs(self.federation.sync_interval_secs))
            .with_fetch_timeout(Duration::from_millis(self.federation.fetch_timeout_ms))
            .with_max_peer_failures(self.federation.max_peer_failures);
        config.node_url.clone_from(&self.federation.node_url);
        config.seed_peers.clone_from(&self.federation.seed_peers);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("agentmesh-{name}-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn defaults_match_runtime_configs() {
        let settings = MeshSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.health_config().max_unhealthy,
            HealthConfig::default().max_unhealthy
        );
        assert_eq!(
            settings.federation_config().fetch_timeout,
            Duration::from_secs(5)
        );
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn missing_directory_gives_defaults() {
        let settings = MeshSettings::load_from("/nonexistent/agentmesh").unwrap();
        assert_eq!(settings.registry.default_list_limit, 100);
    }

    #[test]
    fn reads_default_toml() {
        let dir = temp_dir("toml");
        fs::write(
            dir.join("default.toml"),
            r#"
[registry]
require_signed_registration = true

[federation]
node_url = "http://node-a:8000"
seed_peers = ["node-b:8000"]
sync_interval_secs = 15

[logging]
json = true
"#,
        )
        .unwrap();

        let settings = MeshSettings::load_from(&dir).unwrap();
        assert!(settings.registry_config().require_signed_registration);
        let federation = settings.federation_config();
        assert_eq!(federation.node_url.as_deref(), Some("http://node-a:8000"));
        assert_eq!(federation.seed_peers, vec!["node-b:8000".to_string()]);
        assert_eq!(federation.sync_interval, Duration::from_secs(15));
        assert!(settings.logging.json);
        assert_eq!(settings.trust.history_limit, 50);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn out_of_range_is_invalid() {
        let mut settings = MeshSettings::default();
        settings.trust.initial_score = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid {
                key: "trust.initial_score",
                ..
            })
        ));

        let mut settings = MeshSettings::default();
        settings.health.check_interval_secs = 0;
        assert!(settings.validate().is_err());
    }
}
