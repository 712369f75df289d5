//! The match engine: orchestrates the full scoring pipeline.
//!
//! One invocation is atomic from the caller's perspective: it either
//! returns a ranked list (possibly shorter than requested when individual
//! candidates fail scoring) or a single terminal [`MatchError`]. All
//! intermediate vectors are owned by the invocation and dropped at call
//! end; the only cross-call state is the injected baseline cache.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task;
use tokio::time::{timeout_at, Instant as TokioInstant};
use tracing::{debug, warn};

use qem_encode::{encode, EncoderConfig, EntityProfile};
use qem_ensemble::{aggregate, id_seed, mix_seed, score_ensemble, CandidateStatistics};
use qem_rank::{rank, BaselineCache, RankConfig, ScoredResult};
use qem_state::{couple, couple_raw, particle, prepare, EntityState, StateConfig};

use crate::config::{EngineConfig, MatchOptions};
use crate::error::MatchError;
use crate::metrics::metrics_recorder;
use crate::source::{CandidateFilter, CandidateSource};
use crate::SearchHit;

// Salts keep the derived seed streams (query state, candidate states,
// ensemble members, mitigation, search re-rank) from overlapping.
const QUERY_SALT: u64 = 0x51_55_45_52_59;
const STATE_SALT: u64 = 0x53_54_41_54_45;
const ENSEMBLE_SALT: u64 = 0x45_4E_53_42_4C;
const MITIGATE_SALT: u64 = 0x4D_49_54_49_47;
const SEARCH_SALT: u64 = 0x53_45_41_52_43;

/// Default result width for [`MatchEngine::vector_search`] when the caller
/// has no preference.
pub const DEFAULT_SEARCH_K: usize = 10;

/// Entity-matching engine with explicit injected collaborators.
pub struct MatchEngine {
    cfg: EngineConfig,
    encoder_cfg: Arc<EncoderConfig>,
    state_cfg: StateConfig,
    source: Arc<dyn CandidateSource>,
    cache: Arc<dyn BaselineCache>,
}

impl MatchEngine {
    /// Construct an engine from a validated configuration and injected
    /// candidate source and baseline cache.
    pub fn new(
        cfg: EngineConfig,
        source: Arc<dyn CandidateSource>,
        cache: Arc<dyn BaselineCache>,
    ) -> Result<Self, MatchError> {
        cfg.validate()?;
        let state_cfg = StateConfig {
            dimension: cfg.dimension,
        };
        Ok(Self {
            encoder_cfg: Arc::new(EncoderConfig::default()),
            state_cfg,
            cfg,
            source,
            cache,
        })
    }

    /// Replace the default encoder lookup tables.
    pub fn with_encoder_config(mut self, encoder_cfg: EncoderConfig) -> Self {
        self.encoder_cfg = Arc::new(encoder_cfg);
        self
    }

    /// Score and rank `candidates` against `query`, returning at most
    /// `opts.top_k` results ordered by probability descending.
    ///
    /// Candidates are scored concurrently, bounded by `opts.parallelism`;
    /// a candidate whose scoring fails is logged and dropped rather than
    /// failing the batch. An expired deadline abandons in-flight work and
    /// returns [`MatchError::Cancelled`] with no partial results.
    pub async fn match_entities(
        &self,
        query: &EntityProfile,
        candidates: &[EntityProfile],
        opts: &MatchOptions,
    ) -> Result<Vec<ScoredResult>, MatchError> {
        opts.validate()?;
        if query.id.trim().is_empty() {
            return Err(MatchError::Input(
                "query entity is missing an identifier".into(),
            ));
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let seed = opts.seed.unwrap_or_else(|| id_seed(&query.id));
        let deadline = opts.deadline.map(|d| TokioInstant::now() + d);

        let query_state = Arc::new(self.prepare_query_state(query, seed).await?);
        debug!(
            query = %query.id,
            coherence = query_state.coherence,
            candidates = candidates.len(),
            "query state prepared"
        );

        let limiter = Arc::new(Semaphore::new(opts.parallelism));
        let mut handles = Vec::with_capacity(candidates.len());
        for cand in candidates {
            check_deadline(deadline)?;
            let permit = match deadline {
                Some(dl) => timeout_at(dl, limiter.clone().acquire_owned())
                    .await
                    .map_err(|_| MatchError::Cancelled)?,
                None => limiter.clone().acquire_owned().await,
            }
            .map_err(|e| MatchError::Compute(format!("scoring pool closed: {e}")))?;

            let cand = cand.clone();
            let encoder_cfg = Arc::clone(&self.encoder_cfg);
            let state_cfg = self.state_cfg.clone();
            let query_state = Arc::clone(&query_state);
            let members = self.cfg.ensemble_members;
            let shots = opts.shots;
            let mitigate = opts.mitigate_errors;
            let cand_seed = mix_seed(seed, id_seed(&cand.id));

            let id = cand.id.clone();
            let handle = task::spawn_blocking(move || {
                let _permit = permit;
                score_candidate(
                    &cand,
                    &encoder_cfg,
                    &state_cfg,
                    &query_state,
                    members,
                    shots,
                    mitigate,
                    cand_seed,
                )
            });
            handles.push((id, handle));
        }

        let mut scored = Vec::with_capacity(handles.len());
        let mut failures = 0usize;
        for (id, handle) in handles {
            let joined = match deadline {
                Some(dl) => timeout_at(dl, handle)
                    .await
                    .map_err(|_| MatchError::Cancelled)?,
                None => handle.await,
            };
            match joined {
                Ok(Ok(stats)) => scored.push((id, stats)),
                Ok(Err(err)) => {
                    warn!(candidate = %id, error = %err, "candidate scoring failed; dropped from batch");
                    failures += 1;
                }
                Err(err) => {
                    warn!(candidate = %id, error = %err, "candidate scoring task aborted; dropped from batch");
                    failures += 1;
                }
            }
        }
        check_deadline(deadline)?;
        ensure_survivors(scored.len(), failures)?;

        let survivors = scored.len();
        let rank_cfg = RankConfig {
            dimension: self.cfg.dimension,
            top_k: opts.top_k,
            baseline_ttl: self.cfg.baseline_ttl,
            baseline_concurrency: opts.parallelism.min(8),
        };
        let results = rank(scored, Arc::clone(&self.cache), &rank_cfg)
            .await
            .map_err(|e| MatchError::Compute(e.to_string()))?;

        if let Some(recorder) = metrics_recorder() {
            recorder.record_match(start.elapsed(), candidates.len(), survivors, results.len());
        }
        debug!(
            query = %query.id,
            survivors,
            failures,
            hits = results.len(),
            "match completed"
        );
        Ok(results)
    }

    /// Fetch candidates from the injected source by filter, then match.
    /// Source failures terminate the invocation as `Upstream`; an empty
    /// fetch yields an empty ranked list.
    pub async fn match_filtered(
        &self,
        query: &EntityProfile,
        filter: &CandidateFilter,
        opts: &MatchOptions,
    ) -> Result<Vec<ScoredResult>, MatchError> {
        let candidates = self.source.fetch(filter).await?;
        self.match_entities(query, &candidates, opts).await
    }

    /// Re-rank an externally supplied similarity result set for a
    /// pre-embedded query, skipping the encoder and state preparer.
    ///
    /// Each hit's upstream score gets a coupling-derived bonus:
    /// `score *= 1 + dispersion * 0.2`. Returns at most `k` entries,
    /// sorted descending; [`DEFAULT_SEARCH_K`] is the conventional width.
    pub async fn vector_search(
        &self,
        query: &[f64],
        k: usize,
    ) -> Result<Vec<SearchHit>, MatchError> {
        if query.is_empty() {
            return Err(MatchError::Input("query vector is empty".into()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        // Oversample so the re-rank bonus can actually reorder the tail.
        let fetched = self.source.similar(query, k.saturating_mul(2)).await?;
        let mut hits = Vec::with_capacity(fetched.len());
        for hit in fetched {
            let coupling = couple_raw(query, &hit.vector);
            let outcomes = score_ensemble(
                &coupling,
                self.cfg.search_members,
                self.cfg.search_shots,
                mix_seed(id_seed(&hit.id), SEARCH_SALT),
            )
            .map_err(|e| MatchError::Compute(e.to_string()))?;
            let pooled: Vec<u16> = outcomes.into_iter().flat_map(|m| m.outcomes).collect();
            let stats = aggregate(&pooled, false, 0);
            hits.push(SearchHit {
                id: hit.id,
                score: hit.score * (1.0 + stats.dispersion * 0.2),
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Encode and prepare the query state on the blocking pool. A failure
    /// here is terminal for the invocation.
    async fn prepare_query_state(
        &self,
        query: &EntityProfile,
        seed: u64,
    ) -> Result<EntityState, MatchError> {
        let features = encode(query, &self.encoder_cfg);
        let state_cfg = self.state_cfg.clone();
        let query_seed = mix_seed(seed, QUERY_SALT);
        task::spawn_blocking(move || prepare(&features, &state_cfg, query_seed))
            .await
            .map_err(|e| MatchError::Compute(format!("query state task aborted: {e}")))?
            .map_err(|e| MatchError::Compute(e.to_string()))
    }
}

/// Score one candidate end to end: encode → prepare → particle → couple →
/// ensemble → aggregate. Pure CPU work; runs on the blocking pool.
#[allow(clippy::too_many_arguments)]
fn score_candidate(
    cand: &EntityProfile,
    encoder_cfg: &EncoderConfig,
    state_cfg: &StateConfig,
    query_state: &EntityState,
    members: usize,
    shots: usize,
    mitigate: bool,
    cand_seed: u64,
) -> Result<CandidateStatistics, MatchError> {
    let features = encode(cand, encoder_cfg);
    let state = prepare(&features, state_cfg, mix_seed(cand_seed, STATE_SALT))
        .map_err(|e| MatchError::Compute(e.to_string()))?;
    let part = particle(&cand.id, &state).map_err(|e| MatchError::Compute(e.to_string()))?;

    let coupling = couple(query_state, &part);
    debug!(candidate = %cand.id, strength = coupling.strength, "candidate coupled");

    let outcomes = score_ensemble(&coupling, members, shots, mix_seed(cand_seed, ENSEMBLE_SALT))
        .map_err(|e| MatchError::Compute(e.to_string()))?;
    let pooled: Vec<u16> = outcomes.into_iter().flat_map(|m| m.outcomes).collect();
    Ok(aggregate(
        &pooled,
        mitigate,
        mix_seed(cand_seed, MITIGATE_SALT),
    ))
}

/// Individual scoring failures are tolerated, but a batch where every
/// candidate failed is a terminal `Compute` error rather than a silent
/// empty ranking.
fn ensure_survivors(survivors: usize, failures: usize) -> Result<(), MatchError> {
    if survivors == 0 && failures > 0 {
        return Err(MatchError::Compute(format!(
            "all {failures} candidates failed scoring"
        )));
    }
    Ok(())
}

fn check_deadline(deadline: Option<TokioInstant>) -> Result<(), MatchError> {
    match deadline {
        Some(dl) if TokioInstant::now() >= dl => Err(MatchError::Cancelled),
        _ => Ok(()),
    }
}
