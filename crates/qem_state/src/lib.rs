//! # QEM State (`qem_state`)
//!
//! Second stage of the QEM pipeline: expands a fixed-length feature vector
//! into a high-dimensional state with an amplitude channel and a phase
//! channel, then couples a query state against candidate states.
//!
//! The preparation sequence is fixed: a deterministically seeded Gaussian
//! "superposition seed", one orthonormal Walsh–Hadamard basis change, then
//! one phase rotation per feature component. Feature order is load-bearing:
//! later features compound on earlier ones, so reordering the input changes
//! the prepared state.
//!
//! Everything here is pure computation given its seed; states are created
//! per invocation and never cached across calls.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use qem_encode::FeatureVector;

pub mod coupling;

pub use coupling::{couple, couple_raw, CouplingResult};

/// Errors produced by state preparation and particle construction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    /// Configuration is inconsistent (e.g., dimension not a power of two).
    #[error("invalid state config: {0}")]
    InvalidConfig(String),
    /// A zero-magnitude vector reached a normalization step.
    #[error("degenerate state: {0}")]
    DegenerateState(String),
}

/// Configuration for the state-preparation stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateConfig {
    /// State dimension D. Must be a power of two so the Walsh–Hadamard
    /// mixing transform applies; 1024 in production.
    pub dimension: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { dimension: 1024 }
    }
}

impl StateConfig {
    pub fn validate(&self) -> Result<(), StateError> {
        if self.dimension < 2 || !self.dimension.is_power_of_two() {
            return Err(StateError::InvalidConfig(format!(
                "dimension must be a power of two >= 2, got {}",
                self.dimension
            )));
        }
        Ok(())
    }
}

/// The prepared high-dimensional representation of one entity.
///
/// Owned by the invocation that created it; handed by reference to the
/// coupling stage and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityState {
    /// Real (amplitude) channel, length D.
    pub amplitude: Vec<f64>,
    /// Imaginary (phase) channel, length D.
    pub phase: Vec<f64>,
    /// Self-consistency summary in [0, 1]: purity of the normalized
    /// magnitude distribution.
    pub coherence: f64,
}

/// Fixed set of named scalar observables on a candidate particle.
///
/// A fixed struct rather than an open-ended map: only these three are ever
/// populated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Observables {
    /// Mean squared magnitude of the unnormalized state.
    pub energy: f64,
    /// Mean absolute value of the phase channel.
    pub momentum: f64,
    /// Spin-like descriptor in [-1, 1], derived from coherence.
    pub spin: f64,
}

/// Per-candidate wrapper: identifier, unit-norm state vector, observables.
///
/// Created once per candidate per invocation; not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateParticle {
    pub id: String,
    /// Concatenated (amplitude ⊕ phase) channels, L2-normalized to 1.
    pub state: Vec<f64>,
    pub observables: Observables,
}

/// Prepare an [`EntityState`] from a feature vector.
///
/// Deterministic for a fixed `(vector, config, seed)` triple; the seed is
/// the only source of randomness and callers derive it per invocation.
pub fn prepare(
    features: &FeatureVector,
    cfg: &StateConfig,
    seed: u64,
) -> Result<EntityState, StateError> {
    cfg.validate()?;
    let d = cfg.dimension;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut re: Vec<f64> = (0..d).map(|_| rng.sample(StandardNormal)).collect();
    let mut im: Vec<f64> = (0..d).map(|_| rng.sample(StandardNormal)).collect();

    walsh_hadamard(&mut re);
    walsh_hadamard(&mut im);

    // Couple the features into the seeded state. Feature j rotates the
    // phase of every component whose index has bit (j mod log2(D)) set, so
    // features sharing a bit compound rather than act independently.
    let qubits = d.trailing_zeros() as usize;
    for (j, &f) in features.values().iter().enumerate() {
        let theta = f * PI;
        let (sin_t, cos_t) = theta.sin_cos();
        let mask = 1usize << (j % qubits);
        for i in 0..d {
            if i & mask != 0 {
                let (r, m) = (re[i], im[i]);
                re[i] = r * cos_t - m * sin_t;
                im[i] = r * sin_t + m * cos_t;
            }
        }
    }

    let coherence = coherence_of(&re, &im);
    Ok(EntityState {
        amplitude: re,
        phase: im,
        coherence,
    })
}

/// Wrap a prepared state as a [`CandidateParticle`].
///
/// Fails with [`StateError::DegenerateState`] if the combined channels have
/// zero magnitude and cannot be normalized.
pub fn particle(id: &str, state: &EntityState) -> Result<CandidateParticle, StateError> {
    let d = state.amplitude.len().max(1);
    let mut combined: Vec<f64> = Vec::with_capacity(state.amplitude.len() * 2);
    combined.extend_from_slice(&state.amplitude);
    combined.extend_from_slice(&state.phase);

    let norm = combined.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm < 1e-12 {
        return Err(StateError::DegenerateState(format!(
            "candidate {id} has zero-magnitude state"
        )));
    }
    for v in combined.iter_mut() {
        *v /= norm;
    }

    let energy = state
        .amplitude
        .iter()
        .zip(&state.phase)
        .map(|(r, m)| r * r + m * m)
        .sum::<f64>()
        / d as f64;
    let momentum = state.phase.iter().map(|v| v.abs()).sum::<f64>() / d as f64;
    let spin = 2.0 * state.coherence - 1.0;

    Ok(CandidateParticle {
        id: id.to_string(),
        state: combined,
        observables: Observables {
            energy,
            momentum,
            spin,
        },
    })
}

/// In-place orthonormal fast Walsh–Hadamard transform.
///
/// Length must be a power of two (guaranteed by `StateConfig::validate`).
fn walsh_hadamard(data: &mut [f64]) {
    let n = data.len();
    let mut h = 1;
    while h < n {
        let mut i = 0;
        while i < n {
            for j in i..i + h {
                let (x, y) = (data[j], data[j + h]);
                data[j] = x + y;
                data[j + h] = x - y;
            }
            i += h * 2;
        }
        h *= 2;
    }
    let scale = 1.0 / (n as f64).sqrt();
    for v in data.iter_mut() {
        *v *= scale;
    }
}

/// Purity of the normalized magnitude distribution: Σ pᵢ² with
/// pᵢ = |sᵢ|² / Σ|sⱼ|². Bounded in (0, 1]; 0 for an all-zero state.
fn coherence_of(re: &[f64], im: &[f64]) -> f64 {
    let total: f64 = re.iter().zip(im).map(|(r, m)| r * r + m * m).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let purity: f64 = re
        .iter()
        .zip(im)
        .map(|(r, m)| {
            let p = (r * r + m * m) / total;
            p * p
        })
        .sum();
    purity.clamp(0.0, 1.0)
}
