//! # QEM Rank (`qem_rank`)
//!
//! Final stage of the QEM pipeline: merges per-candidate ensemble
//! statistics with a cached classical baseline score and emits a
//! rank-stable top-K list.
//!
//! The classical-baseline cache is the only shared, cross-invocation
//! resource in the whole pipeline and is treated as best-effort: an outage
//! degrades to a freshly generated baseline and is logged, never surfaced.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

use qem_ensemble::CandidateStatistics;

/// Errors surfaced by baseline-cache implementations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    /// The cache backend is unreachable or failing.
    #[error("baseline cache unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the ranking stage itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RankError {
    /// Configuration is inconsistent.
    #[error("invalid rank config: {0}")]
    InvalidConfig(String),
}

/// Key-value store for classical baseline scores, keyed by candidate
/// identifier, with TTL semantics.
///
/// Implementations must be safe to share across concurrent invocations;
/// each call holds the backend for no longer than one get/set round trip.
#[async_trait]
pub trait BaselineCache: Send + Sync {
    /// Fetch a baseline; `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<f64>, CacheError>;
    /// Store a baseline with a time-to-live.
    async fn set(&self, key: &str, value: f64, ttl: Duration) -> Result<(), CacheError>;
}

/// In-memory [`BaselineCache`] with per-entry expiry. The default backend
/// for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryBaselineCache {
    entries: RwLock<HashMap<String, (f64, Instant)>>,
}

impl MemoryBaselineCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaselineCache for MemoryBaselineCache {
    async fn get(&self, key: &str) -> Result<Option<f64>, CacheError> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|(_, expiry)| *expiry > Instant::now())
            .map(|(value, _)| *value))
    }

    async fn set(&self, key: &str, value: f64, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write();
        // Drop expired entries opportunistically so the map stays bounded.
        let now = Instant::now();
        entries.retain(|_, (_, expiry)| *expiry > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}

/// Configuration for the ranking stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankConfig {
    /// State dimension D; only used for the structural advantage
    /// multiplier `D / log2(D)`.
    pub dimension: usize,
    /// Maximum number of results returned to the caller.
    pub top_k: usize,
    /// TTL applied when lazily populating the baseline cache.
    pub baseline_ttl: Duration,
    /// Width of the fixed request pool for baseline lookups.
    pub baseline_concurrency: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            dimension: 1024,
            top_k: 10,
            baseline_ttl: Duration::from_secs(3600),
            baseline_concurrency: 8,
        }
    }
}

impl RankConfig {
    pub fn validate(&self) -> Result<(), RankError> {
        if self.dimension < 2 {
            return Err(RankError::InvalidConfig(
                "dimension must be at least 2".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(RankError::InvalidConfig(
                "top_k must be greater than zero".into(),
            ));
        }
        if self.baseline_concurrency == 0 {
            return Err(RankError::InvalidConfig(
                "baseline_concurrency must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Final output row for one ranked candidate. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredResult {
    pub id: String,
    pub probability: f64,
    pub phase: f64,
    pub dispersion: f64,
    /// Fixed-width binary label of the modal outcome. Diagnostic only.
    pub collapse_state: String,
    /// Structural multiplier `(D / log2(D)) * probability`. Reporting
    /// metric only; ordering is by probability alone.
    pub advantage: f64,
    /// Classical baseline pulled from (or lazily written to) the cache.
    pub baseline: f64,
}

/// Merge candidate statistics with cached baselines and return the top-K.
///
/// Baseline lookups run through a fixed-size request pool
/// (`cfg.baseline_concurrency`); cache failures degrade to a fresh
/// baseline per candidate. Ordering is by probability descending with an
/// identifier-ascending tie-break, truncated to `cfg.top_k`.
pub async fn rank(
    candidates: Vec<(String, CandidateStatistics)>,
    cache: Arc<dyn BaselineCache>,
    cfg: &RankConfig,
) -> Result<Vec<ScoredResult>, RankError> {
    cfg.validate()?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let advantage_factor = cfg.dimension as f64 / (cfg.dimension as f64).log2();
    let pool = Arc::new(Semaphore::new(cfg.baseline_concurrency));

    let mut handles = Vec::with_capacity(candidates.len());
    for (id, stats) in candidates {
        let cache = Arc::clone(&cache);
        let pool = Arc::clone(&pool);
        let ttl = cfg.baseline_ttl;
        handles.push(tokio::spawn(async move {
            // The semaphore is never closed, so acquisition cannot fail.
            let _permit = pool.acquire_owned().await.ok();
            let baseline = fetch_baseline(cache.as_ref(), &id, ttl).await;
            ScoredResult {
                advantage: advantage_factor * stats.probability,
                probability: stats.probability,
                phase: stats.phase,
                dispersion: stats.dispersion,
                collapse_state: stats.collapse_state,
                baseline,
                id,
            }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(err) => warn!(error = %err, "baseline task failed; candidate dropped"),
        }
    }

    sort_and_truncate(&mut results, cfg.top_k);
    Ok(results)
}

/// Get-or-populate the classical baseline for one candidate. Any cache
/// error is logged and the freshly generated value used instead.
async fn fetch_baseline(cache: &dyn BaselineCache, id: &str, ttl: Duration) -> f64 {
    match cache.get(id).await {
        Ok(Some(value)) => return value,
        Ok(None) => {}
        Err(err) => {
            warn!(candidate = id, error = %err, "baseline cache get failed; using fresh baseline");
            return fresh_baseline(id);
        }
    }

    let value = fresh_baseline(id);
    if let Err(err) = cache.set(id, value, ttl).await {
        warn!(candidate = id, error = %err, "baseline cache set failed");
    }
    value
}

/// Default baseline when the cache has no entry: uniform in [0.2, 0.9),
/// seeded from the candidate identifier so repeated invocations agree.
fn fresh_baseline(id: &str) -> f64 {
    let mut rng = StdRng::seed_from_u64(qem_ensemble::id_seed(id));
    rng.random_range(0.2..0.9)
}

/// Probability descending, identifier ascending on ties, truncated to K.
fn sort_and_truncate(results: &mut Vec<ScoredResult>, top_k: usize) {
    results.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(top_k);
}
