//! Concurrency behavior: bounded parallelism never changes results, and
//! a shared engine serves overlapping invocations independently.

use std::sync::Arc;

use qem::{
    EngineConfig, EntityProfile, MatchEngine, MatchOptions, MemoryBaselineCache, MemorySource,
};

fn shared_engine() -> Arc<MatchEngine> {
    Arc::new(
        MatchEngine::new(
            EngineConfig {
                dimension: 128,
                ensemble_members: 2,
                ..Default::default()
            },
            Arc::new(MemorySource::new(Vec::new())),
            Arc::new(MemoryBaselineCache::new()),
        )
        .expect("test config is valid"),
    )
}

fn candidates(n: usize) -> Vec<EntityProfile> {
    (0..n)
        .map(|i| {
            EntityProfile::new(
                &format!("prog-{i:02}"),
                ["manufacturing", "software", "energy"][i % 3],
                25.0 * (i + 1) as f64,
                &["hiring"],
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallelism_width_is_invisible_in_output() {
    let engine = shared_engine();
    let query = EntityProfile::new("acme", "software", 120.0, &["hiring"]);
    let cands = candidates(9);

    let mut baseline = None;
    for parallelism in [1, 3, 16] {
        let opts = MatchOptions {
            shots: 60,
            parallelism,
            seed: Some(5),
            ..Default::default()
        };
        let results = engine.match_entities(&query, &cands, &opts).await.unwrap();
        match &baseline {
            None => baseline = Some(results),
            Some(expected) => assert_eq!(&results, expected, "parallelism {parallelism}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_match_sequential_runs() {
    let engine = shared_engine();
    let cands = candidates(5);
    let opts = MatchOptions {
        shots: 60,
        parallelism: 4,
        ..Default::default()
    };

    let queries: Vec<EntityProfile> = (0..4)
        .map(|i| EntityProfile::new(&format!("query-{i}"), "software", 50.0 + i as f64, &[]))
        .collect();

    // Sequential reference results, one per query.
    let mut expected = Vec::new();
    for q in &queries {
        expected.push(engine.match_entities(q, &cands, &opts).await.unwrap());
    }

    // The same calls racing on one shared engine.
    let mut handles = Vec::new();
    for q in queries.clone() {
        let engine = Arc::clone(&engine);
        let cands = cands.clone();
        let opts = opts.clone();
        handles.push(tokio::spawn(async move {
            engine.match_entities(&q, &cands, &opts).await.unwrap()
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let concurrent = handle.await.unwrap();
        assert_eq!(concurrent, expected[i], "query-{i}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_cache_keeps_baselines_consistent_across_engines() {
    let cache = Arc::new(MemoryBaselineCache::new());
    let make = |cache: Arc<MemoryBaselineCache>| {
        MatchEngine::new(
            EngineConfig {
                dimension: 128,
                ensemble_members: 2,
                ..Default::default()
            },
            Arc::new(MemorySource::new(Vec::new())),
            cache,
        )
        .expect("test config is valid")
    };
    let first = make(cache.clone());
    let second = make(cache);

    let query = EntityProfile::new("acme", "software", 120.0, &[]);
    let cands = candidates(3);
    let opts = MatchOptions {
        shots: 60,
        seed: Some(2),
        ..Default::default()
    };

    let a = first.match_entities(&query, &cands, &opts).await.unwrap();
    let b = second.match_entities(&query, &cands, &opts).await.unwrap();
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.id, y.id);
        assert_eq!(x.baseline, y.baseline);
    }
}
