//! End-to-end registry scenarios.

use std::collections::BTreeSet;
use std::sync::Arc;

use agentmesh::{
    AgentRecord, AgentUpdate, EventKind, HealthStatus, MemoryStorage, Registry, RegistryConfig,
    RegistryError, SearchQuery, Similarity, Skill, SortBy, SortOrder, Storage, TrustEventKind,
};
use agentmesh_identity::{SecurityError, SignedRequest, SigningKey, hash_body};
use chrono::{Duration, Utc};

fn translator(name: &str, key: &SigningKey) -> AgentRecord {
    AgentRecord::new(name, "1.0.0", format!("http://{}.local:9000", name.to_lowercase()))
        .with_description("Translates text")
        .with_skill(Skill::new("translate", "Translate between languages"))
        .with_tag("nlp")
        .signed_by(key)
        .unwrap()
}

#[tokio::test]
async fn discovery_ranks_by_trust() {
    // Arrange
    let registry = Registry::builder().build();
    let a = registry
        .register(translator("Alpha", &SigningKey::generate()))
        .await
        .unwrap();
    let b = registry
        .register(translator("Beta", &SigningKey::generate()))
        .await
        .unwrap();
    for _ in 0..3 {
        registry
            .record_trust_event(&b.id, TrustEventKind::SuccessfulInvocation, None)
            .await
            .unwrap();
    }

    // Act
    let hits = registry.search(&SearchQuery::new().with_skill("translate"));

    // Assert
    let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
    assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn trust_sort_puts_trusted_agent_ahead_of_healthy_one() {
    // Arrange: A is healthy with moderate trust, B is unproven on health
    // but highly trusted
    let registry = Registry::builder().build();
    let a = registry
        .register(translator("Alpha", &SigningKey::generate()))
        .await
        .unwrap();
    let b = registry
        .register(translator("Beta", &SigningKey::generate()))
        .await
        .unwrap();
    registry.heartbeat(&a.id, HealthStatus::Healthy).await.unwrap();
    for (id, events) in [(&a.id, 25), (&b.id, 40)] {
        for _ in 0..events {
            registry
                .record_trust_event(id, TrustEventKind::SuccessfulInvocation, None)
                .await
                .unwrap();
        }
    }
    assert!((registry.trust().get_score(&b.id) - 0.9).abs() < 1e-9);

    // Act
    let query = SearchQuery::new().with_skill("translate");
    let blended = registry.search(&query);
    let by_trust = registry.search(&query.sorted_by(SortBy::TrustScore, SortOrder::Desc));

    // Assert
    let ids = |hits: &[agentmesh::RankedAgent]| -> Vec<String> {
        hits.iter().map(|h| h.record.id.clone()).collect()
    };
    assert_eq!(ids(&blended), vec![a.id.clone(), b.id.clone()]);
    assert_eq!(ids(&by_trust), vec![b.id.clone(), a.id.clone()]);
}

#[tokio::test]
async fn replayed_handshake_is_rejected() {
    // Arrange
    let registry = Registry::builder().build();
    let key = SigningKey::generate();
    let agent = registry.register(translator("Alpha", &key)).await.unwrap();
    let stale = SignedRequest::sign_at(
        &key,
        agent.id.clone(),
        "POST",
        "/invoke",
        hash_body(b"{}"),
        Utc::now() - Duration::seconds(120),
    );

    // Act
    let result = registry.authenticate_request(&stale).await;

    // Assert
    assert!(matches!(
        result,
        Err(RegistryError::Security(SecurityError::StaleTimestamp { .. }))
    ));
    assert!((registry.trust().get_score(&agent.id) - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn fresh_handshake_earns_trust() {
    // Arrange
    let registry = Registry::builder().build();
    let key = SigningKey::generate();
    let agent = registry.register(translator("Alpha", &key)).await.unwrap();
    let request = SignedRequest::sign(&key, agent.id.clone(), "post", "/invoke", hash_body(b""));

    // Act
    let record = registry.authenticate_request(&request).await.unwrap();

    // Assert
    assert!((record.trust_score - 0.505).abs() < 1e-9);
}

#[tokio::test]
async fn handshake_from_unknown_or_legacy_agent_is_rejected() {
    let registry = Registry::builder().build();
    let key = SigningKey::generate();
    let legacy = AgentRecord::new("Legacy", "1.0.0", "http://legacy")
        .with_id("legacy-1")
        .with_skill(Skill::new("echo", ""));
    registry.register(legacy).await.unwrap();

    for agent_id in ["legacy-1", "nobody"] {
        let request = SignedRequest::sign(&key, agent_id, "GET", "/", hash_body(b""));
        let err = registry.authenticate_request(&request).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Security(SecurityError::UnknownSigner { .. })
        ));
    }
}

#[tokio::test]
async fn forged_manifest_is_rejected() {
    // Arrange
    let registry = Registry::builder().build();
    let mut record = translator("Alpha", &SigningKey::generate());
    record.endpoint = "http://attacker.example".into();

    // Act
    let err = registry.register(record).await.unwrap_err();

    // Assert
    assert_eq!(err, RegistryError::Security(SecurityError::InvalidSignature));
    assert!(registry.is_empty());
    assert!(registry.search(&SearchQuery::new()).is_empty());
}

#[tokio::test]
async fn silent_agent_goes_offline_on_sweep() {
    // Arrange
    let registry = Registry::builder().build();
    let agent = registry
        .register(translator("Alpha", &SigningKey::generate()))
        .await
        .unwrap();
    let receipt = registry
        .heartbeat(&agent.id, HealthStatus::Healthy)
        .await
        .unwrap();
    let mut events = registry.subscribe();

    // Act
    let early = registry
        .sweep_health_at(receipt.timestamp + Duration::seconds(299))
        .await;
    let late = registry
        .sweep_health_at(receipt.timestamp + Duration::seconds(301))
        .await;

    // Assert
    assert!(early.is_empty());
    assert_eq!(late.len(), 1);
    assert_eq!(
        registry.get(&agent.id).unwrap().health_status,
        HealthStatus::Offline
    );
    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, EventKind::AgentHealthChanged);
    assert_eq!(event.data["new_status"], "offline");
    assert!(
        registry
            .search(&SearchQuery::new().healthy_only())
            .is_empty()
    );
}

#[tokio::test]
async fn index_tracks_register_update_remove() {
    let registry = Registry::builder().build();
    let legacy = |id: &str, skill: &str| {
        AgentRecord::new(id, "1.0.0", "http://x")
            .with_id(id)
            .with_skill(Skill::new(skill, ""))
            .with_tag("t")
    };

    registry.register(legacy("a", "ocr")).await.unwrap();
    registry.register(legacy("b", "ocr")).await.unwrap();
    registry.register(legacy("a", "translate")).await.unwrap();
    assert!(registry.index_is_consistent());
    assert_eq!(
        registry
            .search(&SearchQuery::new().with_skill("ocr"))
            .len(),
        1
    );

    registry
        .update(
            "b",
            AgentUpdate {
                tags: Some(BTreeSet::from(["u".to_string()])),
                ..AgentUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(registry.index_is_consistent());
    assert!(registry.search(&SearchQuery::new().with_tag("t")).len() == 1);

    registry.remove("a").await.unwrap();
    registry.remove("b").await.unwrap();
    assert!(registry.index_is_consistent());
    assert_eq!(registry.stats().indexed_skills, 0);
}

#[tokio::test]
async fn mutations_reach_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let registry = Registry::builder()
        .storage(Arc::clone(&storage) as Arc<dyn Storage>)
        .build();
    let agent = registry
        .register(translator("Alpha", &SigningKey::generate()))
        .await
        .unwrap();

    registry
        .heartbeat(&agent.id, HealthStatus::Healthy)
        .await
        .unwrap();
    let stored = storage.load(&agent.id).await.unwrap().unwrap();
    assert_eq!(stored.health_status, HealthStatus::Healthy);

    registry.remove(&agent.id).await.unwrap();
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn signed_only_registry_rejects_unsigned_keyed_record() {
    let registry = Registry::builder()
        .config(RegistryConfig::new().with_require_signed_registration(true))
        .build();
    let mut record = translator("Alpha", &SigningKey::generate());
    record.manifest_signature = None;

    let err = registry.register(record).await.unwrap_err();

    assert_eq!(
        err,
        RegistryError::Security(SecurityError::MissingSignature {
            field: "manifest_signature"
        })
    );
}

struct Letters;

impl Similarity for Letters {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 26];
        for c in text
            .to_ascii_lowercase()
            .bytes()
            .filter(u8::is_ascii_lowercase)
        {
            v[usize::from(c - b'a')] += 1.0;
        }
        v
    }
}

#[tokio::test]
async fn similarity_collaborator_admits_non_keyword_matches() {
    let registry = Registry::builder().similarity(Arc::new(Letters)).build();
    registry
        .register(translator("Alpha", &SigningKey::generate()))
        .await
        .unwrap();

    let hits = registry.search(&SearchQuery::text("interpreter of languages"));

    assert_eq!(hits.len(), 1);
    assert!(hits[0].keyword_score.abs() < f64::EPSILON);
    assert!(hits[0].matched_fields.contains(&"embedding".to_string()));
}
