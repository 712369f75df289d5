//! Determinism guarantees: identical inputs and seed must produce
//! identical output, independent of scheduling.

use std::collections::HashMap;
use std::sync::Arc;

use qem::{
    EngineConfig, EntityProfile, MatchEngine, MatchOptions, MemoryBaselineCache, MemorySource,
    ScoredResult,
};

fn engine() -> MatchEngine {
    MatchEngine::new(
        EngineConfig {
            dimension: 128,
            ensemble_members: 3,
            ..Default::default()
        },
        Arc::new(MemorySource::new(Vec::new())),
        Arc::new(MemoryBaselineCache::new()),
    )
    .expect("test config is valid")
}

fn candidates() -> Vec<EntityProfile> {
    vec![
        EntityProfile::new("prog-a", "manufacturing", 450.0, &["export"]),
        EntityProfile::new("prog-b", "software", 80.0, &["digital", "hiring"]),
        EntityProfile::new("prog-c", "energy", 1200.0, &["green"]),
    ]
}

async fn run(engine: &MatchEngine, opts: &MatchOptions) -> Vec<ScoredResult> {
    let query = EntityProfile::new("acme", "manufacturing", 400.0, &["export"]);
    engine
        .match_entities(&query, &candidates(), opts)
        .await
        .unwrap()
}

#[tokio::test]
async fn fixed_seed_repeats_exactly() {
    let engine = engine();
    let opts = MatchOptions {
        shots: 120,
        seed: Some(7),
        ..Default::default()
    };
    let first = run(&engine, &opts).await;
    let second = run(&engine, &opts).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn default_seed_derives_from_query_and_stays_idempotent() {
    let engine = engine();
    let opts = MatchOptions {
        shots: 120,
        ..Default::default()
    };
    // No explicit seed: the invocation seed comes from the query id.
    let first = run(&engine, &opts).await;
    let second = run(&engine, &opts).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn parallelism_does_not_change_results() {
    let engine = engine();
    let narrow = MatchOptions {
        shots: 120,
        parallelism: 1,
        seed: Some(11),
        ..Default::default()
    };
    let wide = MatchOptions {
        parallelism: 8,
        ..narrow.clone()
    };
    assert_eq!(run(&engine, &narrow).await, run(&engine, &wide).await);
}

#[tokio::test]
async fn mitigation_is_seeded_and_repeatable() {
    let engine = engine();
    let opts = MatchOptions {
        shots: 200,
        mitigate_errors: true,
        seed: Some(13),
        ..Default::default()
    };
    assert_eq!(run(&engine, &opts).await, run(&engine, &opts).await);
}

#[tokio::test]
async fn vector_search_is_deterministic() {
    let mut embeddings = HashMap::new();
    embeddings.insert("v-1".to_string(), vec![0.8, 0.1, 0.3]);
    embeddings.insert("v-2".to_string(), vec![0.2, 0.9, 0.1]);
    embeddings.insert("v-3".to_string(), vec![0.5, 0.5, 0.5]);
    let engine = MatchEngine::new(
        EngineConfig {
            dimension: 128,
            ..Default::default()
        },
        Arc::new(MemorySource::with_embeddings(Vec::new(), embeddings)),
        Arc::new(MemoryBaselineCache::new()),
    )
    .unwrap();

    let query = [0.7, 0.2, 0.4];
    let first = engine.vector_search(&query, 3).await.unwrap();
    let second = engine.vector_search(&query, 3).await.unwrap();
    assert_eq!(first, second);
}
