//! Criterion benchmarks for discovery search and manifest verification.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use futures::executor::block_on;

use agentmesh::{AgentRecord, DiscoveryConfig, Registry, SearchQuery, Skill};
use agentmesh_identity::SigningKey;

const SKILLS: [&str; 5] = ["translate", "summarize", "ocr", "map", "classify"];

fn populated(agents: usize) -> Registry {
    // Caching disabled so every iteration runs the full search.
    let registry = Registry::builder()
        .discovery_config(DiscoveryConfig::new().with_cache_capacity(0))
        .build();
    block_on(async {
        for i in 0..agents {
            let record = AgentRecord::new(format!("Agent {i}"), "1.0.0", "http://agent.local")
                .with_id(format!("agent-{i}"))
                .with_description(format!("Handles {} workloads", SKILLS[i % SKILLS.len()]))
                .with_skill(Skill::new(SKILLS[i % SKILLS.len()], "Primary skill"))
                .with_tag(if i % 2 == 0 { "even" } else { "odd" });
            let _ = registry.register(record).await;
        }
    });
    registry
}

/// Benchmark: index-driven skill search with varying registry sizes
fn bench_skill_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("skill_search");

    for agents in [100, 1_000, 10_000] {
        let registry = populated(agents);
        let query = SearchQuery::new().with_skill("translate").with_tag("even");
        group.throughput(Throughput::Elements(agents as u64));
        group.bench_with_input(BenchmarkId::new("agents", agents), &query, |b, query| {
            b.iter(|| registry.search(black_box(query)));
        });
    }

    group.finish();
}

/// Benchmark: free-text keyword search over every record
fn bench_text_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_search");

    for agents in [100, 1_000] {
        let registry = populated(agents);
        let query = SearchQuery::text("summar").with_limit(10);
        group.bench_with_input(BenchmarkId::new("agents", agents), &query, |b, query| {
            b.iter(|| registry.search(black_box(query)));
        });
    }

    group.finish();
}

/// Benchmark: manifest signature verification
fn bench_verify_manifest(c: &mut Criterion) {
    let key = SigningKey::generate();
    let record = AgentRecord::new("Signed", "1.0.0", "http://signed.local")
        .with_skill(Skill::new("sign", "Sign things"))
        .with_tag("crypto")
        .signed_by(&key)
        .expect("manifest encodes");

    c.bench_function("verify_manifest", |b| {
        b.iter(|| black_box(&record).verify_signature());
    });
}

criterion_group!(
    benches,
    bench_skill_search,
    bench_text_search,
    bench_verify_manifest
);
criterion_main!(benches);
