//! Candidate-source boundary.
//!
//! The engine never queries business storage directly; it talks to a
//! [`CandidateSource`] that yields candidate profiles for filtered
//! matching and pre-embedded similarity hits for vector search. An empty
//! result set is a valid answer, not an error.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use qem_encode::EntityProfile;

/// Errors produced by candidate-source implementations. These terminate
/// the invocation as `MatchError::Upstream`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    /// The backing store is unreachable or failing.
    #[error("candidate source unavailable: {0}")]
    Unavailable(String),
    /// The filter or query could not be executed.
    #[error("candidate query failed: {0}")]
    Query(String),
}

/// Caller-supplied criteria for [`CandidateSource::fetch`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateFilter {
    /// Category membership; empty means any category.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Inclusive lower bound on the scale field.
    #[serde(default)]
    pub min_scale: Option<f64>,
    /// Inclusive upper bound on the scale field.
    #[serde(default)]
    pub max_scale: Option<f64>,
}

impl CandidateFilter {
    pub fn matches(&self, entity: &EntityProfile) -> bool {
        if !self.categories.is_empty()
            && !self
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&entity.category))
        {
            return false;
        }
        if let Some(min) = self.min_scale {
            if entity.scale < min {
                return false;
            }
        }
        if let Some(max) = self.max_scale {
            if entity.scale > max {
                return false;
            }
        }
        true
    }
}

/// One externally computed similarity hit, input to the vector-search
/// re-rank pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityHit {
    pub id: String,
    /// Upstream similarity score (e.g., cosine), before the re-rank bonus.
    pub score: f64,
    /// The candidate's embedding, used for the coupling pass.
    pub vector: Vec<f64>,
}

/// Read-only access to candidate records and their embeddings.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Candidates matching the filter. An empty list is a valid result.
    async fn fetch(&self, filter: &CandidateFilter) -> Result<Vec<EntityProfile>, SourceError>;

    /// Top-`k` similarity hits for a pre-embedded query vector.
    async fn similar(&self, query: &[f64], k: usize) -> Result<Vec<SimilarityHit>, SourceError>;
}

/// In-memory [`CandidateSource`] for tests and ephemeral matching.
#[derive(Default)]
pub struct MemorySource {
    profiles: Vec<EntityProfile>,
    embeddings: HashMap<String, Vec<f64>>,
}

impl MemorySource {
    pub fn new(profiles: Vec<EntityProfile>) -> Self {
        Self {
            profiles,
            embeddings: HashMap::new(),
        }
    }

    pub fn with_embeddings(
        profiles: Vec<EntityProfile>,
        embeddings: HashMap<String, Vec<f64>>,
    ) -> Self {
        Self {
            profiles,
            embeddings,
        }
    }
}

#[async_trait]
impl CandidateSource for MemorySource {
    async fn fetch(&self, filter: &CandidateFilter) -> Result<Vec<EntityProfile>, SourceError> {
        Ok(self
            .profiles
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn similar(&self, query: &[f64], k: usize) -> Result<Vec<SimilarityHit>, SourceError> {
        let mut hits: Vec<SimilarityHit> = self
            .embeddings
            .iter()
            .map(|(id, vector)| SimilarityHit {
                id: id.clone(),
                score: cosine(query, vector),
                vector: vector.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

/// Cosine similarity; 0.0 when either vector is empty or has zero norm.
fn cosine(query: &[f64], candidate: &[f64]) -> f64 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    let len = query.len().min(candidate.len());
    let mut dot = 0.0_f64;
    let mut norm_q = 0.0_f64;
    let mut norm_c = 0.0_f64;

    for i in 0..len {
        dot += query[i] * candidate[i];
        norm_q += query[i] * query[i];
        norm_c += candidate[i] * candidate[i];
    }
    for v in &query[len..] {
        norm_q += v * v;
    }
    for v in &candidate[len..] {
        norm_c += v * v;
    }

    let denom = norm_q.sqrt() * norm_c.sqrt();
    if denom < 1e-15 {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}
