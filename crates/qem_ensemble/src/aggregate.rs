//! Reduction of pooled shot records into per-candidate statistics.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::OUTCOME_SPACE;

/// Probability that error mitigation toggles a single bit of an outcome.
const MITIGATION_FLIP_RATE: f64 = 0.01;

/// Per-candidate aggregate over all pooled ensemble shots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateStatistics {
    /// Modal outcome frequency over the shot count, in [0, 1].
    pub probability: f64,
    /// Phase angle in radians derived from the modal outcome.
    pub phase: f64,
    /// Spread of the outcome distribution, >= 0; exactly 0 when every
    /// shot landed on one outcome.
    pub dispersion: f64,
    /// Fixed-width (8-bit) binary label of the modal outcome. Diagnostic
    /// only.
    pub collapse_state: String,
}

/// Aggregate a pooled list of outcome indices.
///
/// With `mitigate` set, each outcome first has a small independent chance
/// of a single random bit toggle. This reproduces the source system's
/// "error mitigation" and is noise injection in expectation; callers that
/// want clean statistics pass `false`. The toggle stream is seeded, so
/// aggregation stays reproducible either way.
pub fn aggregate(outcomes: &[u16], mitigate: bool, seed: u64) -> CandidateStatistics {
    if outcomes.is_empty() {
        return CandidateStatistics {
            probability: 0.0,
            phase: 0.0,
            dispersion: 0.0,
            collapse_state: format!("{:08b}", 0),
        };
    }

    let mut counts = [0usize; OUTCOME_SPACE];
    if mitigate {
        let mut rng = StdRng::seed_from_u64(seed);
        for &o in outcomes {
            let o = if rng.random::<f64>() < MITIGATION_FLIP_RATE {
                o ^ (1 << rng.random_range(0..8u16))
            } else {
                o
            };
            counts[o as usize % OUTCOME_SPACE] += 1;
        }
    } else {
        for &o in outcomes {
            counts[o as usize % OUTCOME_SPACE] += 1;
        }
    }

    let total = outcomes.len();
    // Mode ties resolve to the smallest outcome index for determinism.
    let (mode, mode_count) = counts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(i, &c)| (i, c))
        .unwrap_or((0, 0));
    let distinct = counts.iter().filter(|&&c| c > 0).count();

    CandidateStatistics {
        probability: mode_count as f64 / total as f64,
        phase: (mode % 360) as f64 * PI / 180.0,
        dispersion: ((distinct.saturating_sub(1)) as f64).sqrt() / (total as f64).sqrt(),
        collapse_state: format!("{mode:08b}"),
    }
}
