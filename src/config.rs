//! Engine configuration and per-request options.
//!
//! The engine carries no global state: everything the source system kept
//! in a module-level singleton lives in [`EngineConfig`] and the injected
//! collaborators, so parallel test instances never interfere.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// Engine-level configuration shared by every invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// State dimension D. Must be a power of two >= 64; 1024 in
    /// production.
    #[serde(default = "EngineConfig::default_dimension")]
    pub dimension: usize,
    /// Number of randomized ensemble members per candidate.
    #[serde(default = "EngineConfig::default_ensemble_members")]
    pub ensemble_members: usize,
    /// Ensemble members for the reduced vector-search re-rank pass.
    #[serde(default = "EngineConfig::default_search_members")]
    pub search_members: usize,
    /// Shots per member for the vector-search re-rank pass.
    #[serde(default = "EngineConfig::default_search_shots")]
    pub search_shots: usize,
    /// TTL for lazily populated baseline cache entries.
    #[serde(default = "EngineConfig::default_baseline_ttl")]
    pub baseline_ttl: Duration,
}

impl EngineConfig {
    fn default_dimension() -> usize {
        1024
    }

    fn default_ensemble_members() -> usize {
        8
    }

    fn default_search_members() -> usize {
        2
    }

    fn default_search_shots() -> usize {
        64
    }

    fn default_baseline_ttl() -> Duration {
        Duration::from_secs(3600)
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.dimension < 64 || !self.dimension.is_power_of_two() {
            return Err(MatchError::InvalidOptions(format!(
                "dimension must be a power of two >= 64, got {}",
                self.dimension
            )));
        }
        if self.ensemble_members == 0 {
            return Err(MatchError::InvalidOptions(
                "ensemble_members must be greater than zero".into(),
            ));
        }
        if self.search_members == 0 || self.search_shots == 0 {
            return Err(MatchError::InvalidOptions(
                "search_members and search_shots must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: Self::default_dimension(),
            ensemble_members: Self::default_ensemble_members(),
            search_members: Self::default_search_members(),
            search_shots: Self::default_search_shots(),
            baseline_ttl: Self::default_baseline_ttl(),
        }
    }
}

/// Per-request options for [`MatchEngine::match_entities`](crate::MatchEngine::match_entities).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchOptions {
    /// Shot samples per ensemble member.
    #[serde(default = "MatchOptions::default_shots")]
    pub shots: usize,
    /// Maximum candidates scored concurrently.
    #[serde(default = "MatchOptions::default_parallelism")]
    pub parallelism: usize,
    /// Apply the historical bit-flip "error mitigation" before
    /// aggregation. Noise in expectation; see DESIGN.md.
    #[serde(default = "MatchOptions::default_mitigate_errors")]
    pub mitigate_errors: bool,
    /// Maximum results returned.
    #[serde(default = "MatchOptions::default_top_k")]
    pub top_k: usize,
    /// Invocation seed. When absent, derived from the query identifier so
    /// identical calls stay idempotent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Wall-clock budget for the invocation: once this much time has
    /// elapsed the call returns `Cancelled` with no partial results.
    #[serde(default)]
    pub deadline: Option<Duration>,
}

impl MatchOptions {
    fn default_shots() -> usize {
        1000
    }

    fn default_parallelism() -> usize {
        10
    }

    fn default_mitigate_errors() -> bool {
        true
    }

    fn default_top_k() -> usize {
        10
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.shots == 0 {
            return Err(MatchError::InvalidOptions(
                "shots must be greater than zero".into(),
            ));
        }
        if self.parallelism == 0 {
            return Err(MatchError::InvalidOptions(
                "parallelism must be greater than zero".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(MatchError::InvalidOptions(
                "top_k must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            shots: Self::default_shots(),
            parallelism: Self::default_parallelism(),
            mitigate_errors: Self::default_mitigate_errors(),
            top_k: Self::default_top_k(),
            seed: None,
            deadline: None,
        }
    }
}
