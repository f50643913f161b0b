//! Runtime configuration for the mesh components.

use std::time::Duration;

/// Configuration for the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Whether registrations must carry a public key and manifest signature.
    ///
    /// When false, unsigned (legacy) records are accepted.
    /// Default: false
    pub require_signed_registration: bool,

    /// Page size for `list` when the caller passes no limit.
    ///
    /// Default: 100
    pub default_list_limit: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            require_signed_registration: false,
            default_list_limit: 100,
        }
    }
}

impl RegistryConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires (or stops requiring) signed registrations.
    #[must_use]
    pub const fn with_require_signed_registration(mut self, required: bool) -> Self {
        self.require_signed_registration = required;
        self
    }

    /// Sets the default list page size.
    #[must_use]
    pub const fn with_default_list_limit(mut self, limit: usize) -> Self {
        self.default_list_limit = limit;
        self
    }
}

/// Configuration for the trust engine.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Score given to agents with no history.
    ///
    /// Default: 0.5
    pub initial_score: f64,

    /// Fraction of the distance to neutral removed per decay tick.
    ///
    /// Default: 0.01
    pub decay_rate: f64,

    /// Trust inactivity after which decay applies.
    ///
    /// Default: 5 minutes
    pub decay_inactivity: Duration,

    /// Cadence of the background decay loop.
    ///
    /// Default: 60 seconds
    pub decay_interval: Duration,

    /// Window in which repeated positive events from the same counterparty
    /// are discounted.
    ///
    /// Default: 1 hour
    pub diversity_window: Duration,

    /// Score history entries kept per agent.
    ///
    /// Default: 50
    pub history_limit: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            initial_score: 0.5,
            decay_rate: 0.01,
            decay_inactivity: Duration::from_secs(300),
            decay_interval: Duration::from_secs(60),
            diversity_window: Duration::from_secs(3600),
            history_limit: 50,
        }
    }
}

impl TrustConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the decay rate.
    #[must_use]
    pub const fn with_decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = rate;
        self
    }

    /// Sets the inactivity threshold before decay.
    #[must_use]
    pub const fn with_decay_inactivity(mut self, inactivity: Duration) -> Self {
        self.decay_inactivity = inactivity;
        self
    }

    /// Sets the decay loop cadence.
    #[must_use]
    pub const fn with_decay_interval(mut self, interval: Duration) -> Self {
        self.decay_interval = interval;
        self
    }

    /// Sets the diversity window.
    #[must_use]
    pub const fn with_diversity_window(mut self, window: Duration) -> Self {
        self.diversity_window = window;
        self
    }

    /// Sets the history length.
    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

/// Configuration for the health monitor.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Cadence of the background sweep.
    ///
    /// Default: 30 seconds
    pub check_interval: Duration,

    /// Silence after which an agent is marked offline.
    ///
    /// Default: 5 minutes
    pub max_unhealthy: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            max_unhealthy: Duration::from_secs(300),
        }
    }
}

impl HealthConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sweep cadence.
    #[must_use]
    pub const fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Sets the offline threshold.
    #[must_use]
    pub const fn with_max_unhealthy(mut self, max: Duration) -> Self {
        self.max_unhealthy = max;
        self
    }
}

/// Configuration for discovery ranking and caching.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Ranking weight of query similarity.
    ///
    /// Default: 0.3
    pub similarity_weight: f64,

    /// Ranking weight of trust.
    ///
    /// Default: 0.5
    pub trust_weight: f64,

    /// Ranking weight of uptime.
    ///
    /// Default: 0.2
    pub uptime_weight: f64,

    /// Maximum cached search results.
    ///
    /// Default: 256
    pub cache_capacity: usize,

    /// Result limit when the query sets none.
    ///
    /// Default: 20
    pub default_limit: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.3,
            trust_weight: 0.5,
            uptime_weight: 0.2,
            cache_capacity: 256,
            default_limit: 20,
        }
    }
}

impl DiscoveryConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the three ranking weights.
    #[must_use]
    pub const fn with_weights(mut self, similarity: f64, trust: f64, uptime: f64) -> Self {
        self.similarity_weight = similarity;
        self.trust_weight = trust;
        self.uptime_weight = uptime;
        self
    }

    /// Sets the cache capacity. Zero disables caching.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the default result limit.
    #[must_use]
    pub const fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }
}

/// Configuration for federation.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// This node's own URL, never added to the peer set.
    ///
    /// Default: None
    pub node_url: Option<String>,

    /// Peers known at startup.
    ///
    /// Default: empty
    pub seed_peers: Vec<String>,

    /// Cadence of the background sync.
    ///
    /// Default: 60 seconds
    pub sync_interval: Duration,

    /// Timeout for one peer pull.
    ///
    /// Default: 5 seconds
    pub fetch_timeout: Duration,

    /// Consecutive failures after which a peer is marked unreachable.
    ///
    /// Default: 3
    pub max_peer_failures: u32,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            node_url: None,
            seed_peers: Vec::new(),
            sync_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(5),
            max_peer_failures: 3,
        }
    }
}

impl FederationConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets this node's URL.
    #[must_use]
    pub fn with_node_url(mut self, url: impl Into<String>) -> Self {
        self.node_url = Some(url.into());
        self
    }

    /// Adds a seed peer.
    #[must_use]
    pub fn with_seed_peer(mut self, url: impl Into<String>) -> Self {
        self.seed_peers.push(url.into());
        self
    }

    /// Sets the sync cadence.
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the per-peer fetch timeout.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the unreachable threshold.
    #[must_use]
    pub const fn with_max_peer_failures(mut self, max: u32) -> Self {
        self.max_peer_failures = max;
        self
    }
}
