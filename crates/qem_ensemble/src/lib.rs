//! # QEM Ensemble (`qem_ensemble`)
//!
//! Third stage of the QEM pipeline: runs N independent randomized scoring
//! passes ("ensemble members") over a coupled joint representation. Each
//! member derives a seeded random projection onto a fixed 256-way
//! measurement basis and then draws M shot samples from the induced
//! categorical distribution.
//!
//! This is the dominant cost center of the pipeline,
//! O(members × (basis · |joint| + shots)); members fan out across the
//! rayon pool. Determinism holds regardless of scheduling because every
//! member owns its own seeded generator and results are collected in
//! member order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use qem_state::CouplingResult;

pub mod aggregate;

pub use aggregate::{aggregate, CandidateStatistics};

/// Size of the fixed measurement basis: 8-bit outcome indices.
pub const OUTCOME_SPACE: usize = 256;

/// Errors produced by the ensemble scorer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnsembleError {
    /// Member or shot counts outside the accepted range.
    #[error("invalid ensemble request: {0}")]
    InvalidRequest(String),
}

/// One ensemble member's shot record: the chosen basis index per shot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberOutcome {
    pub member: usize,
    pub outcomes: Vec<u16>,
}

/// Deterministically derive a sub-seed from an invocation seed and a salt.
///
/// splitmix64 finalizer; used for (invocation, member) and
/// (invocation, candidate) seed derivation so streams never overlap.
pub fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut z = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Stable seed derived from an identifier (FNV-1a over its bytes). Used
/// for per-candidate seed derivation and deterministic fallback baselines.
pub fn id_seed(id: &str) -> u64 {
    let mut hash = 0xCBF2_9CE4_8422_2325u64;
    for b in id.as_bytes() {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}

/// Score a coupled pair with `members` independent randomized passes of
/// `shots` samples each.
///
/// Fully reproducible: the same `(coupling, members, shots, seed)` always
/// yields the same outcome indices.
pub fn score_ensemble(
    coupling: &CouplingResult,
    members: usize,
    shots: usize,
    seed: u64,
) -> Result<Vec<MemberOutcome>, EnsembleError> {
    if members == 0 {
        return Err(EnsembleError::InvalidRequest(
            "members must be greater than zero".into(),
        ));
    }
    if shots == 0 {
        return Err(EnsembleError::InvalidRequest(
            "shots must be greater than zero".into(),
        ));
    }

    let results = (0..members)
        .into_par_iter()
        .map(|m| MemberOutcome {
            member: m,
            outcomes: score_member(&coupling.joint, shots, mix_seed(seed, m as u64)),
        })
        .collect();
    Ok(results)
}

/// One randomized pass: seeded Gaussian projection onto the measurement
/// basis, tanh squash, L2 renormalization, then categorical shot sampling
/// over the squared magnitudes.
fn score_member(joint: &[f64], shots: usize, member_seed: u64) -> Vec<u16> {
    let mut rng = StdRng::seed_from_u64(member_seed);
    let scale = 1.0 / (joint.len().max(1) as f64).sqrt();

    let mut projected = [0.0_f64; OUTCOME_SPACE];
    for slot in projected.iter_mut() {
        let mut acc = 0.0;
        for &x in joint {
            let w: f64 = rng.sample(StandardNormal);
            acc += w * x;
        }
        *slot = (acc * scale).tanh();
    }

    let norm = projected.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 1e-12 {
        for v in projected.iter_mut() {
            *v /= norm;
        }
    }

    sample_shots(&projected, shots, &mut rng)
}

/// Draw `shots` samples from the |vᵢ|² distribution by cumulative inverse
/// sampling. A degenerate all-zero projection falls back to a uniform
/// draw over the basis.
fn sample_shots(projected: &[f64; OUTCOME_SPACE], shots: usize, rng: &mut StdRng) -> Vec<u16> {
    let probs: Vec<f64> = projected.iter().map(|v| v * v).collect();
    let total: f64 = probs.iter().sum();

    let mut outcomes = Vec::with_capacity(shots);
    if total <= 0.0 {
        for _ in 0..shots {
            outcomes.push(rng.random_range(0..OUTCOME_SPACE) as u16);
        }
        return outcomes;
    }

    for _ in 0..shots {
        let r: f64 = rng.random::<f64>() * total;
        let mut cumulative = 0.0;
        let mut chosen = OUTCOME_SPACE - 1;
        for (i, &p) in probs.iter().enumerate() {
            cumulative += p;
            if r <= cumulative {
                chosen = i;
                break;
            }
        }
        outcomes.push(chosen as u16);
    }
    outcomes
}
