//! Property-based tests for trust bounds, merges and index consistency.

use agentmesh::{
    AgentRecord, MergeOutcome, Registry, Skill, TrustConfig, TrustEngine, TrustEventKind,
};
use chrono::{Duration, TimeZone, Utc};
use futures::executor::block_on;
use proptest::prelude::*;

// ============================================================================
// STRATEGY DEFINITIONS
// ============================================================================

/// Generate any trust event kind except decay, which is never recorded directly.
fn event_kind_strategy() -> impl Strategy<Value = TrustEventKind> {
    prop_oneof![
        Just(TrustEventKind::SuccessfulInvocation),
        Just(TrustEventKind::VerifiedHandshake),
        Just(TrustEventKind::ValidHeartbeat),
        Just(TrustEventKind::Timeout),
        Just(TrustEventKind::InvocationFailure),
        Just(TrustEventKind::RateLimitAbuse),
        Just(TrustEventKind::SignatureForgery),
    ]
}

/// Generate an optional counterparty from a small pool so repeats happen.
fn counterparty_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec![
        "peer-1".to_string(),
        "peer-2".to_string(),
        "peer-3".to_string(),
    ]))
}

/// One registry mutation.
#[derive(Debug, Clone)]
enum Op {
    Register {
        id: usize,
        skills: Vec<String>,
        tags: Vec<String>,
    },
    Remove {
        id: usize,
    },
}

/// Generate mutations over a handful of IDs, skills and tags.
fn op_strategy() -> impl Strategy<Value = Op> {
    let name = || prop::sample::select(vec!["ocr", "translate", "summarize", "map"]);
    prop_oneof![
        3 => (
            0..4usize,
            prop::collection::btree_set(name(), 1..3),
            prop::collection::vec(prop::sample::select(vec!["nlp", "vision", "geo"]), 0..3),
        )
            .prop_map(|(id, skills, tags)| Op::Register {
                id,
                skills: skills.into_iter().map(String::from).collect(),
                tags: tags.into_iter().map(String::from).collect(),
            }),
        1 => (0..4usize).prop_map(|id| Op::Remove { id }),
    ]
}

fn record(id: usize, skills: &[String], tags: &[String]) -> AgentRecord {
    let mut record = AgentRecord::new(format!("agent-{id}"), "1.0.0", "http://agent")
        .with_id(format!("agent-{id}"));
    for skill in skills {
        record = record.with_skill(Skill::new(skill.clone(), ""));
    }
    for tag in tags {
        record = record.with_tag(tag.clone());
    }
    record
}

// ============================================================================
// PROPTEST TESTS
// ============================================================================

proptest! {
    /// Scores stay in [0, 1] whatever happens, and forgery always lands on 0
    #[test]
    fn trust_stays_bounded(
        events in prop::collection::vec((event_kind_strategy(), counterparty_strategy()), 0..200)
    ) {
        let engine = TrustEngine::new(TrustConfig::default());
        for (kind, counterparty) in events {
            let update = engine.record_event("agent", kind, counterparty.as_deref());
            prop_assert!((0.0..=1.0).contains(&update.score()));
            if kind == TrustEventKind::SignatureForgery {
                prop_assert!(update.score().abs() < f64::EPSILON);
            }
        }
        let score = engine.get_score("agent");
        prop_assert!((0.0..=1.0).contains(&score));
    }

    /// Decay never pushes a score past neutral
    #[test]
    fn decay_moves_toward_neutral(
        events in prop::collection::vec(event_kind_strategy(), 1..50),
        ticks in 1..20usize,
    ) {
        let engine = TrustEngine::new(TrustConfig::default());
        for kind in events {
            engine.record_event("agent", kind, None);
        }
        let before = engine.get_score("agent");
        let later = Utc::now() + Duration::hours(1);
        for _ in 0..ticks {
            engine.decay_tick_at(later);
        }
        let after = engine.get_score("agent");
        prop_assert!((after - 0.5).abs() <= (before - 0.5).abs() + 1e-12);
    }

    /// The index always matches the record set
    #[test]
    fn index_consistent_after_any_sequence(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let registry = Registry::builder().build();
        block_on(async {
            for op in ops {
                match op {
                    Op::Register { id, skills, tags } => {
                        registry.register(record(id, &skills, &tags)).await.unwrap();
                    }
                    Op::Remove { id } => {
                        let _ = registry.remove(&format!("agent-{id}")).await;
                    }
                }
            }
        });
        prop_assert!(registry.index_is_consistent());
    }

    /// Applying the same remote record twice changes nothing the second time,
    /// and an older copy never replaces a newer one
    #[test]
    fn merge_is_idempotent_and_monotonic(first_secs in 0i64..1_000, second_secs in 0i64..1_000) {
        let registry = Registry::builder().build();
        let stamp = |secs: i64| Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        let skills = vec!["ocr".to_string()];
        let mut a = record(1, &skills, &[]);
        a.updated_at = stamp(first_secs);
        let mut b = record(1, &skills, &["late".to_string()]);
        b.updated_at = stamp(second_secs);

        block_on(async {
            registry.merge_remote(a.clone()).await;
            let outcome = registry.merge_remote(b.clone()).await;
            let again = registry.merge_remote(b.clone()).await;

            let stored = registry.get("agent-1").unwrap();
            if second_secs > first_secs {
                assert_eq!(outcome, MergeOutcome::Updated);
                assert!(stored.tags.contains("late"));
            } else {
                assert_eq!(outcome, MergeOutcome::Unchanged);
                assert!(stored.tags.is_empty());
            }
            assert_eq!(again, MergeOutcome::Unchanged);
            assert_eq!(stored.updated_at, stamp(first_secs.max(second_secs)));
        });
        prop_assert!(registry.index_is_consistent());
    }
}
