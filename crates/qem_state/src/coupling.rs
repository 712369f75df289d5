//! Pairwise coupling between a query state and one candidate.
//!
//! The joint representation is a stand-in for a controlled two-qubit gate:
//! the normalized query channels concatenated with the candidate's unit
//! state vector. Coupling strength is the Shannon entropy (base 2) of the
//! normalized squared joint components, the simplified reading of the
//! eigen-spectrum of the joint density matrix.

use serde::{Deserialize, Serialize};

use crate::{CandidateParticle, EntityState};

/// Eigen-magnitudes below this threshold contribute zero entropy.
const EIGEN_FLOOR: f64 = 1e-10;

/// Joint representation plus scalar coupling strength for one
/// (query, candidate) pair. Ephemeral: consumed immediately by the
/// ensemble scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouplingResult {
    pub joint: Vec<f64>,
    /// Entropy-like coupling strength, always >= 0.
    pub strength: f64,
}

/// Couple a prepared query state with one candidate particle.
///
/// Recomputed independently per pair; no batching shortcuts.
pub fn couple(query: &EntityState, candidate: &CandidateParticle) -> CouplingResult {
    let mut q: Vec<f64> = Vec::with_capacity(query.amplitude.len() * 2);
    q.extend_from_slice(&query.amplitude);
    q.extend_from_slice(&query.phase);
    normalize_in_place(&mut q);

    let mut joint = q;
    joint.extend_from_slice(&candidate.state);

    let strength = spectrum_entropy(&joint);
    CouplingResult { joint, strength }
}

/// Raw-vector variant for pre-embedded queries (vector search): couples two
/// bare vectors without any state preparation.
pub fn couple_raw(query: &[f64], candidate: &[f64]) -> CouplingResult {
    let mut q = query.to_vec();
    normalize_in_place(&mut q);
    let mut c = candidate.to_vec();
    normalize_in_place(&mut c);

    let mut joint = q;
    joint.extend_from_slice(&c);

    let strength = spectrum_entropy(&joint);
    CouplingResult { joint, strength }
}

fn normalize_in_place(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// `-Σ pᵢ log2(pᵢ)` over normalized squared components with pᵢ above
/// [`EIGEN_FLOOR`]. A zero-magnitude joint vector yields 0.
fn spectrum_entropy(joint: &[f64]) -> f64 {
    let total: f64 = joint.iter().map(|v| v * v).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for v in joint {
        let p = (v * v) / total;
        if p > EIGEN_FLOOR {
            entropy -= p * p.log2();
        }
    }
    entropy.max(0.0)
}
