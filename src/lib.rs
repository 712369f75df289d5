//! # Quantum Entity Matcher (QEM)
//!
//! Umbrella crate for the QEM pipeline: a deterministic, seeded
//! randomized-ensemble scorer that ranks candidate entities against a
//! query entity.
//!
//! The pipeline runs in fixed stage order for every candidate:
//!
//! 1. **Encode** ([`qem_encode`]) — profile fields to a 64-dim feature
//!    vector in `[0, 1]`.
//! 2. **Prepare** ([`qem_state`]) — feature vector to a seeded
//!    1024-dim amplitude/phase state.
//! 3. **Couple** ([`qem_state::coupling`]) — query and candidate states
//!    to a joint representation with an entropy-derived strength.
//! 4. **Score** ([`qem_ensemble`]) — N randomized members × M shots over
//!    a 256-way measurement basis.
//! 5. **Aggregate** ([`qem_ensemble::aggregate`]) — pooled shots to
//!    probability, phase, dispersion, and a collapse label.
//! 6. **Rank** ([`qem_rank`]) — merge with cached classical baselines,
//!    sort, truncate to top-K.
//!
//! This crate wires the stages behind [`MatchEngine`], adds the
//! candidate-source and baseline-cache boundaries, bounded concurrency,
//! deadline cancellation, and the invocation-level error taxonomy.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use qem::{EngineConfig, EntityProfile, MatchEngine, MatchOptions, MemorySource};
//! use qem_rank::MemoryBaselineCache;
//!
//! # async fn run() -> Result<(), qem::MatchError> {
//! let candidates = vec![
//!     EntityProfile::new("acme", "manufacturing", 500.0, &["export", "hiring"]),
//!     EntityProfile::new("globex", "software", 90.0, &["digital"]),
//! ];
//! let engine = MatchEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(MemorySource::new(candidates.clone())),
//!     Arc::new(MemoryBaselineCache::new()),
//! )?;
//!
//! let query = EntityProfile::new("query-co", "manufacturing", 420.0, &["export"]);
//! let ranked = engine
//!     .match_entities(&query, &candidates, &MatchOptions::default())
//!     .await?;
//! for hit in ranked {
//!     println!("{} p={:.4} baseline={:.3}", hit.id, hit.probability, hit.baseline);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Determinism
//!
//! Every random draw flows from a single invocation seed (caller-supplied
//! or derived from the query identifier), split per candidate, per member,
//! and per concern with [`qem_ensemble::mix_seed`]. Two calls with the
//! same inputs and seed return identical results regardless of
//! `parallelism`.

use serde::{Deserialize, Serialize};

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod source;

pub use config::{EngineConfig, MatchOptions};
pub use engine::{MatchEngine, DEFAULT_SEARCH_K};
pub use error::MatchError;
pub use metrics::{set_match_metrics, MatchMetrics};
pub use source::{CandidateFilter, CandidateSource, MemorySource, SimilarityHit, SourceError};

pub use qem_encode::{encode, EncoderConfig, EntityProfile, FeatureVector};
pub use qem_ensemble::{aggregate, mix_seed, score_ensemble, CandidateStatistics};
pub use qem_rank::{BaselineCache, MemoryBaselineCache, ScoredResult};
pub use qem_state::{couple, prepare, CouplingResult, EntityState, StateConfig};

/// One re-ranked vector-search hit: the upstream similarity score with the
/// coupling-derived dispersion bonus applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
}
