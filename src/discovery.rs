//! Capability search and ranking.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::cache::SearchCache;
use crate::config::DiscoveryConfig;
use crate::index::CapabilityIndex;
use crate::record::{AgentRecord, HealthStatus, Protocol};
use crate::similarity::Similarity;
use crate::trust::TrustEngine;

/// Sum of all keyword field weights; keyword scores are divided by this.
const MAX_KEYWORD_SCORE: f64 = 1.0 + 0.8 + 0.9 + 0.6 + 0.7;

/// A capability search.
///
/// # Examples
///
/// ```
/// use agentmesh::{Protocol, SearchQuery};
///
/// let query = SearchQuery::text("translate")
///     .with_tag("nlp")
///     .with_protocol(Protocol::Http)
///     .healthy_only()
///     .with_limit(5);
/// assert_eq!(query.limit, Some(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query.
    pub text: Option<String>,
    /// Required skill name.
    pub skill: Option<String>,
    /// Required tags (all must match).
    pub tags: Vec<String>,
    /// Required protocol.
    pub protocol: Option<Protocol>,
    /// Only return healthy agents.
    pub healthy_only: bool,
    /// Minimum trust score.
    pub min_trust: Option<f64>,
    /// Results to skip.
    pub offset: usize,
    /// Maximum results; the configured default when unset.
    pub limit: Option<usize>,
    /// Orders hits by a record field instead of the blended score.
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    /// Direction for `sort_by`.
    #[serde(default)]
    pub order: SortOrder,
}

impl SearchQuery {
    /// Creates a query that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a free-text query.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Requires a skill.
    #[must_use]
    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = Some(skill.into());
        self
    }

    /// Requires a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Requires a protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Only returns healthy agents.
    #[must_use]
    pub const fn healthy_only(mut self) -> Self {
        self.healthy_only = true;
        self
    }

    /// Requires a minimum trust score.
    #[must_use]
    pub const fn with_min_trust(mut self, min: f64) -> Self {
        self.min_trust = Some(min);
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Orders hits by `sort_by` instead of the blended score. Hits that tie
    /// on the field keep their ranking order.
    #[must_use]
    pub const fn sorted_by(mut self, sort_by: SortBy, order: SortOrder) -> Self {
        self.sort_by = Some(sort_by);
        self.order = order;
        self
    }

    /// Returns the trimmed, lower-cased query text, if any.
    #[must_use]
    pub fn needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }

    /// Key under which results for this query are cached.
    #[must_use]
    pub fn cache_key(&self, default_limit: usize) -> String {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        format!(
            "q={}|skill={}|tags={}|protocol={}|healthy={}|trust={}|offset={}|limit={}|sort={}",
            self.needle().unwrap_or_default(),
            self.skill.as_deref().unwrap_or_default(),
            tags.join(","),
            self.protocol.map(Protocol::as_str).unwrap_or_default(),
            self.healthy_only,
            self.min_trust.map(|t| t.to_string()).unwrap_or_default(),
            self.offset,
            self.limit.unwrap_or(default_limit),
            self.sort_by
                .map(|by| format!("{}:{}", by.as_str(), self.order.as_str()))
                .unwrap_or_default(),
        )
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAgent {
    /// The matching record.
    pub record: AgentRecord,
    /// Final ranking score.
    pub score: f64,
    /// Relevance in [0, 1] used in the ranking.
    pub similarity: f64,
    /// Raw keyword score.
    pub keyword_score: f64,
    /// Fields the query text matched.
    pub matched_fields: Vec<String>,
}

/// Field a listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Current trust score.
    TrustScore,
    /// Registration time.
    CreatedAt,
    /// Last mutation time.
    #[default]
    UpdatedAt,
}

impl SortBy {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrustScore => "trust_score",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    /// Compares two records on this field, smallest first.
    ///
    /// Trust is read from the engine, not from the records.
    fn compare(self, a: &AgentRecord, b: &AgentRecord, trust: &TrustEngine) -> Ordering {
        match self {
            Self::TrustScore => trust.get_score(&a.id).total_cmp(&trust.get_score(&b.id)),
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        }
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trust_score" => Ok(Self::TrustScore),
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            other => Err(format!("cannot sort by '{other}'")),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

impl SortOrder {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

/// Ranks index candidates and caches the results.
pub struct DiscoveryService {
    config: DiscoveryConfig,
    similarity: Option<Arc<dyn Similarity>>,
    cache: Mutex<SearchCache<Vec<RankedAgent>>>,
}

impl fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("config", &self.config)
            .field("similarity", &self.similarity.is_some())
            .finish_non_exhaustive()
    }
}

impl DiscoveryService {
    /// Creates a keyword-only discovery service.
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        let cache = Mutex::new(SearchCache::new(config.cache_capacity));
        Self {
            config,
            similarity: None,
            cache,
        }
    }

    /// Adds a similarity collaborator.
    #[must_use]
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Drops every cached result.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    pub fn invalidate(&self) {
        self.cache.lock().expect("lock poisoned").clear();
    }

    /// Number of cached result sets.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    #[must_use]
    pub fn cached_searches(&self) -> usize {
        self.cache.lock().expect("lock poisoned").len()
    }

    /// Scores a record against a lower-cased needle.
    ///
    /// Case-insensitive substring matches add: name 1.0, description 0.8,
    /// skill name 0.9, skill description 0.6, tag 0.7.
    #[must_use]
    pub fn keyword_score(record: &AgentRecord, needle: &str) -> (f64, Vec<String>) {
        let mut score = 0.0;
        let mut fields = Vec::new();
        let contains = |text: &str| text.to_lowercase().contains(needle);

        if contains(&record.name) {
            score += 1.0;
            fields.push("name".to_string());
        }
        if contains(&record.description) {
            score += 0.8;
            fields.push("description".to_string());
        }
        if record.skills.iter().any(|s| contains(&s.name)) {
            score += 0.9;
            fields.push("skills".to_string());
        }
        if record.skills.iter().any(|s| contains(&s.description)) {
            score += 0.6;
            if !fields.iter().any(|f| f == "skills") {
                fields.push("skills".to_string());
            }
        }
        if record.tags.iter().any(|t| contains(t)) {
            score += 0.7;
            fields.push("tags".to_string());
        }
        (score, fields)
    }

    /// Runs a search over `records`.
    ///
    /// Candidates come from the index (all records when the query names no
    /// skill, tag or protocol). With query text, candidates with zero
    /// keyword and collaborator relevance are dropped. Results are ranked
    /// by the weighted sum of relevance, trust and uptime, ties broken by
    /// `updated_at` descending and then ID ascending. A query with
    /// `sort_by` then reorders the hits by that field before paging.
    ///
    /// Call this while holding the lock that guards `records` and `index`,
    /// so cached results are never older than the last invalidation.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    pub fn search(
        &self,
        records: &HashMap<String, AgentRecord>,
        index: &CapabilityIndex,
        trust: &TrustEngine,
        query: &SearchQuery,
    ) -> Vec<RankedAgent> {
        let key = query.cache_key(self.config.default_limit);
        if let Some(hit) = self.cache.lock().expect("lock poisoned").get(&key) {
            tracing::trace!(%key, "search cache hit");
            return hit;
        }

        let candidates: Vec<&AgentRecord> =
            match index.candidates(query.skill.as_deref(), query.protocol, &query.tags) {
                Some(ids) => ids.iter().filter_map(|id| records.get(id)).collect(),
                None => records.values().collect(),
            };

        let needle = query.needle();
        let query_vector = match (&self.similarity, &needle) {
            (Some(similarity), Some(_)) => query.text.as_deref().map(|t| similarity.embed(t)),
            _ => None,
        };

        let mut ranked: Vec<RankedAgent> = candidates
            .into_iter()
            .filter(|r| !query.healthy_only || r.health_status == HealthStatus::Healthy)
            .filter_map(|record| {
                let trust_score = trust.get_score(&record.id);
                if query.min_trust.is_some_and(|min| trust_score < min) {
                    return None;
                }

                let (keyword_score, matched_fields, similarity) = match &needle {
                    None => (0.0, Vec::new(), 1.0),
                    Some(needle) => {
                        let (keyword, mut fields) = Self::keyword_score(record, needle);
                        let collaborator = match (&self.similarity, &query_vector) {
                            (Some(similarity), Some(qv)) => similarity
                                .similarity(qv, &similarity.embed(&record.similarity_text()))
                                .clamp(0.0, 1.0),
                            _ => 0.0,
                        };
                        if collaborator > 0.0 {
                            fields.push("embedding".to_string());
                        }
                        let relevance = (keyword / MAX_KEYWORD_SCORE).max(collaborator);
                        if relevance <= 0.0 {
                            return None;
                        }
                        (keyword, fields, relevance)
                    }
                };

                let score = self.config.similarity_weight * similarity
                    + self.config.trust_weight * trust_score
                    + self.config.uptime_weight * record.health_status.uptime_weight();

                Some(RankedAgent {
                    record: record.clone(),
                    score,
                    similarity,
                    keyword_score,
                    matched_fields,
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.record.updated_at.cmp(&a.record.updated_at))
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        if let Some(sort_by) = query.sort_by {
            ranked.sort_by(|a, b| {
                query
                    .order
                    .apply(sort_by.compare(&a.record, &b.record, trust))
            });
        }

        let limit = query.limit.unwrap_or(self.config.default_limit);
        let page: Vec<RankedAgent> = ranked.into_iter().skip(query.offset).take(limit).collect();

        tracing::debug!(%key, hits = page.len(), "search executed");
        self.cache
            .lock()
            .expect("lock poisoned")
            .insert(key, page.clone());
        page
    }

    /// Sorts records in place.
    ///
    /// Trust is read from the engine, not from the records.
    pub fn sort(agents: &mut [AgentRecord], sort_by: SortBy, order: SortOrder, trust: &TrustEngine) {
        agents.sort_by(|a, b| {
            order
                .apply(sort_by.compare(a, b, trust))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

impl Default for DiscoveryService {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustConfig;
    use crate::record::Skill;
    use crate::trust::TrustEventKind;

    struct Fixture {
        records: HashMap<String, AgentRecord>,
        index: CapabilityIndex,
        trust: TrustEngine,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                records: HashMap::new(),
                index: CapabilityIndex::new(),
                trust: TrustEngine::new(TrustConfig::default()),
            }
        }

        fn add(&mut self, record: AgentRecord) {
            self.index.insert(&record);
            self.trust.seed(&record.id, record.trust_score);
            self.records.insert(record.id.clone(), record);
        }
    }

    fn agent(id: &str, name: &str, skill: &str) -> AgentRecord {
        AgentRecord::new(name, "1.0.0", "http://x")
            .with_id(id)
            .with_skill(Skill::new(skill, format!("{skill} things")))
    }

    #[test]
    fn higher_trust_ranks_first() {
        let mut f = Fixture::new();
        f.add(agent("a", "Alpha", "translate"));
        f.add(agent("b", "Beta", "translate"));
        f.trust
            .record_event("b", TrustEventKind::SuccessfulInvocation, None);

        let service = DiscoveryService::default();
        let hits = service.search(
            &f.records,
            &f.index,
            &f.trust,
            &SearchQuery::new().with_skill("translate"),
        );

        let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn explicit_sort_overrides_blended_rank() {
        let mut f = Fixture::new();
        let mut steady = agent("a", "Alpha", "translate");
        steady.health_status = HealthStatus::Healthy;
        steady.trust_score = 0.75;
        f.add(steady);
        let mut trusted = agent("b", "Beta", "translate");
        trusted.trust_score = 0.9;
        f.add(trusted);

        let service = DiscoveryService::default();
        let query = SearchQuery::new().with_skill("translate");
        let blended = service.search(&f.records, &f.index, &f.trust, &query);
        let by_trust = service.search(
            &f.records,
            &f.index,
            &f.trust,
            &query.clone().sorted_by(SortBy::TrustScore, SortOrder::Desc),
        );
        let ascending = service.search(
            &f.records,
            &f.index,
            &f.trust,
            &query.sorted_by(SortBy::TrustScore, SortOrder::Asc),
        );

        let ids = |hits: &[RankedAgent]| -> Vec<String> {
            hits.iter().map(|h| h.record.id.clone()).collect()
        };
        assert_eq!(ids(&blended), vec!["a", "b"]);
        assert_eq!(ids(&by_trust), vec!["b", "a"]);
        assert_eq!(ids(&ascending), vec!["a", "b"]);
    }

    #[test]
    fn zero_relevance_is_dropped() {
        let mut f = Fixture::new();
        f.add(agent("a", "Weather", "forecast"));
        f.add(agent("b", "Translator", "translate"));

        let service = DiscoveryService::default();
        let hits = service.search(&f.records, &f.index, &f.trust, &SearchQuery::text("TRANSL"));

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "b");
        assert!(hits[0].matched_fields.contains(&"name".to_string()));
    }

    #[test]
    fn healthy_only_and_min_trust_filter() {
        let mut f = Fixture::new();
        let mut healthy = agent("a", "A", "s");
        healthy.health_status = HealthStatus::Healthy;
        f.add(healthy);
        f.add(agent("b", "B", "s"));
        f.trust.record_event("a", TrustEventKind::Timeout, None);

        let service = DiscoveryService::new(DiscoveryConfig::default().with_cache_capacity(0));
        assert_eq!(
            service
                .search(&f.records, &f.index, &f.trust, &SearchQuery::new().healthy_only())
                .len(),
            1
        );
        assert!(
            service
                .search(
                    &f.records,
                    &f.index,
                    &f.trust,
                    &SearchQuery::new().healthy_only().with_min_trust(0.5)
                )
                .is_empty()
        );
    }

    #[test]
    fn ties_break_on_updated_then_id() {
        let mut f = Fixture::new();
        let older = agent("z", "Z", "s");
        let mut newer = agent("y", "Y", "s");
        newer.updated_at = older.updated_at + chrono::Duration::seconds(5);
        let mut same_as_older = agent("x", "X", "s");
        same_as_older.updated_at = older.updated_at;
        f.add(older);
        f.add(newer);
        f.add(same_as_older);

        let service = DiscoveryService::default();
        let hits = service.search(&f.records, &f.index, &f.trust, &SearchQuery::new());
        let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();

        assert_eq!(ids, vec!["y", "x", "z"]);
    }

    #[test]
    fn results_are_cached_until_invalidated() {
        let mut f = Fixture::new();
        f.add(agent("a", "A", "s"));
        let service = DiscoveryService::default();
        let query = SearchQuery::new();

        service.search(&f.records, &f.index, &f.trust, &query);
        assert_eq!(service.cached_searches(), 1);

        f.add(agent("b", "B", "s"));
        assert_eq!(service.search(&f.records, &f.index, &f.trust, &query).len(), 1);

        service.invalidate();
        assert_eq!(service.search(&f.records, &f.index, &f.trust, &query).len(), 2);
    }

    #[test]
    fn pagination() {
        let mut f = Fixture::new();
        for id in ["a", "b", "c", "d"] {
            f.add(agent(id, id, "s"));
        }
        let service = DiscoveryService::default();
        let hits = service.search(
            &f.records,
            &f.index,
            &f.trust,
            &SearchQuery::new().with_offset(1).with_limit(2),
        );
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn sort_by_trust_descending() {
        let trust = TrustEngine::new(TrustConfig::default());
        trust.record_event("b", TrustEventKind::SuccessfulInvocation, None);
        let mut agents = vec![agent("a", "A", "s"), agent("b", "B", "s")];

        DiscoveryService::sort(&mut agents, SortBy::TrustScore, SortOrder::Desc, &trust);
        assert_eq!(agents[0].id, "b");

        DiscoveryService::sort(&mut agents, SortBy::TrustScore, SortOrder::Asc, &trust);
        assert_eq!(agents[0].id, "a");
    }

    #[test]
    fn cache_key_normalizes() {
        let a = SearchQuery::text("  Translate ").with_tag("b").with_tag("a");
        let b = SearchQuery::text("translate").with_tag("a").with_tag("b");
        assert_eq!(a.cache_key(20), b.cache_key(20));
        assert_ne!(a.cache_key(20), a.clone().healthy_only().cache_key(20));
    }
}
