//! Error taxonomy and degraded-mode behavior at the engine boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qem::{
    BaselineCache, CandidateFilter, CandidateSource, EngineConfig, EntityProfile, MatchEngine,
    MatchError, MatchOptions, MemoryBaselineCache, MemorySource, SimilarityHit, SourceError,
};
use qem_rank::CacheError;

struct FailingSource;

#[async_trait]
impl CandidateSource for FailingSource {
    async fn fetch(&self, _filter: &CandidateFilter) -> Result<Vec<EntityProfile>, SourceError> {
        Err(SourceError::Unavailable("registry down".into()))
    }

    async fn similar(&self, _query: &[f64], _k: usize) -> Result<Vec<SimilarityHit>, SourceError> {
        Err(SourceError::Query("vector index offline".into()))
    }
}

struct FailingCache;

#[async_trait]
impl BaselineCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<f64>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: f64, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        dimension: 128,
        ensemble_members: 2,
        ..Default::default()
    }
}

fn quick_opts() -> MatchOptions {
    MatchOptions {
        shots: 60,
        seed: Some(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn blank_query_identifier_is_input_error() {
    let engine = MatchEngine::new(
        test_config(),
        Arc::new(MemorySource::new(Vec::new())),
        Arc::new(MemoryBaselineCache::new()),
    )
    .unwrap();
    let query = EntityProfile::new("", "software", 10.0, &[]);
    let cand = EntityProfile::new("c-1", "software", 10.0, &[]);

    let err = engine
        .match_entities(&query, &[cand], &quick_opts())
        .await
        .expect_err("blank id must fail");
    assert_eq!(err.kind(), "input");
}

#[tokio::test]
async fn invalid_options_are_rejected_before_any_work() {
    let engine = MatchEngine::new(
        test_config(),
        Arc::new(MemorySource::new(Vec::new())),
        Arc::new(MemoryBaselineCache::new()),
    )
    .unwrap();
    let query = EntityProfile::new("q", "software", 10.0, &[]);

    for opts in [
        MatchOptions {
            shots: 0,
            ..Default::default()
        },
        MatchOptions {
            parallelism: 0,
            ..Default::default()
        },
        MatchOptions {
            top_k: 0,
            ..Default::default()
        },
    ] {
        let err = engine
            .match_entities(&query, &[], &opts)
            .await
            .expect_err("options must be invalid");
        assert_eq!(err.kind(), "invalid_options");
    }
}

#[tokio::test]
async fn invalid_engine_config_is_rejected_at_construction() {
    let cfg = EngineConfig {
        dimension: 100,
        ..Default::default()
    };
    let err = MatchEngine::new(
        cfg,
        Arc::new(MemorySource::new(Vec::new())),
        Arc::new(MemoryBaselineCache::new()),
    )
    .err()
    .expect("non-power-of-two dimension must fail");
    assert_eq!(err.kind(), "invalid_options");
}

#[tokio::test]
async fn source_failure_terminates_as_upstream() {
    let engine = MatchEngine::new(
        test_config(),
        Arc::new(FailingSource),
        Arc::new(MemoryBaselineCache::new()),
    )
    .unwrap();
    let query = EntityProfile::new("q", "software", 10.0, &[]);

    let err = engine
        .match_filtered(&query, &CandidateFilter::default(), &quick_opts())
        .await
        .expect_err("failing source must surface");
    assert_eq!(err.kind(), "upstream");

    let err = engine
        .vector_search(&[0.1, 0.2], 3)
        .await
        .expect_err("failing similarity must surface");
    assert_eq!(err.kind(), "upstream");
}

#[tokio::test]
async fn cache_outage_degrades_but_invocation_succeeds() {
    let engine = MatchEngine::new(
        test_config(),
        Arc::new(MemorySource::new(Vec::new())),
        Arc::new(FailingCache),
    )
    .unwrap();
    let query = EntityProfile::new("acme", "manufacturing", 400.0, &["export"]);
    let cands = vec![
        EntityProfile::new("prog-a", "manufacturing", 450.0, &["export"]),
        EntityProfile::new("prog-b", "software", 80.0, &["digital"]),
    ];

    let results = engine
        .match_entities(&query, &cands, &quick_opts())
        .await
        .expect("cache outage must not fail the invocation");
    assert_eq!(results.len(), 2);
    for r in &results {
        assert!((0.2..0.9).contains(&r.baseline));
    }
}

#[tokio::test]
async fn expired_deadline_cancels_with_no_partial_results() {
    let engine = MatchEngine::new(
        test_config(),
        Arc::new(MemorySource::new(Vec::new())),
        Arc::new(MemoryBaselineCache::new()),
    )
    .unwrap();
    let query = EntityProfile::new("acme", "manufacturing", 400.0, &["export"]);
    let cands: Vec<EntityProfile> = (0..6)
        .map(|i| EntityProfile::new(&format!("prog-{i}"), "retail", 5.0, &[]))
        .collect();
    let opts = MatchOptions {
        deadline: Some(Duration::ZERO),
        ..quick_opts()
    };

    let err = engine
        .match_entities(&query, &cands, &opts)
        .await
        .expect_err("expired deadline must cancel");
    assert!(matches!(err, MatchError::Cancelled));
    assert_eq!(err.kind(), "cancelled");
}

#[tokio::test]
async fn generous_deadline_completes_normally() {
    let engine = MatchEngine::new(
        test_config(),
        Arc::new(MemorySource::new(Vec::new())),
        Arc::new(MemoryBaselineCache::new()),
    )
    .unwrap();
    let query = EntityProfile::new("acme", "manufacturing", 400.0, &["export"]);
    let cand = EntityProfile::new("prog-a", "manufacturing", 450.0, &["export"]);
    let opts = MatchOptions {
        deadline: Some(Duration::from_secs(30)),
        ..quick_opts()
    };

    let results = engine.match_entities(&query, &[cand], &opts).await.unwrap();
    assert_eq!(results.len(), 1);
}
