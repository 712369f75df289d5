//! # QEM Encode (`qem_encode`)
//!
//! First stage of the QEM pipeline: turns a heterogeneous entity record
//! (category, scale, free-text need tags) into a fixed-length numeric
//! feature vector that the state-preparation stage can consume.
//!
//! Encoding is deterministic and infallible. Unknown categorical values
//! fall back to a neutral encoding instead of erroring, so a partially
//! malformed profile still produces a usable vector.

use serde::{Deserialize, Serialize};

/// Fixed output length of [`encode`]. Every downstream stage assumes it.
pub const FEATURE_LEN: usize = 64;

/// Width of the categorical sub-vector at the front of the feature layout.
pub const CATEGORY_WIDTH: usize = 8;

/// Number of tag indicator slots following the scale component.
pub const TAG_SLOTS: usize = 16;

/// An input record for either side of a match: the query entity (e.g., a
/// company profile) or a candidate (e.g., a subsidy program).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityProfile {
    /// Stable identifier; used for seeding, baseline cache keys, and
    /// deterministic tie-breaking.
    pub id: String,
    /// Categorical field (e.g., industry). Unknown values are tolerated.
    pub category: String,
    /// Scale/size scalar (e.g., employee count or grant ceiling).
    pub scale: f64,
    /// Free-text need tags. Unmatched tags are ignored.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EntityProfile {
    /// Convenience constructor for tests and demos.
    pub fn new(id: &str, category: &str, scale: f64, tags: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            category: category.to_string(),
            scale,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// A fixed-length feature vector with every component in [0, 1].
///
/// The length invariant (exactly [`FEATURE_LEN`]) is enforced by
/// construction; the inner vector is not exposed mutably.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    /// Components in layout order.
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Always [`FEATURE_LEN`].
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a vector from raw components, zero-padding or truncating to
    /// [`FEATURE_LEN`] and clamping every component into [0, 1].
    pub fn from_raw(mut values: Vec<f64>) -> Self {
        values.resize(FEATURE_LEN, 0.0);
        for v in values.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
            *v = v.clamp(0.0, 1.0);
        }
        Self(values)
    }

    /// The neutral encoding: uniform 0.5 category block, everything else zero.
    pub fn neutral() -> Self {
        let mut values = vec![0.0; FEATURE_LEN];
        for v in values.iter_mut().take(CATEGORY_WIDTH) {
            *v = 0.5;
        }
        Self(values)
    }
}

/// Configuration for the encoder: the fixed category and tag lookup tables.
///
/// Cheap to clone and serde-friendly so it can be embedded in higher-level
/// configs or loaded from a config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Known categories, in table order. At most [`CATEGORY_WIDTH`] are
    /// usable; entries beyond that never match.
    pub categories: Vec<String>,
    /// Known tags, in table order. At most [`TAG_SLOTS`] are usable.
    pub tags: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            categories: [
                "manufacturing",
                "software",
                "agriculture",
                "retail",
                "healthcare",
                "construction",
                "logistics",
                "energy",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            tags: [
                "hiring",
                "training",
                "export",
                "research",
                "digital",
                "green",
                "equipment",
                "expansion",
                "startup",
                "innovation",
                "safety",
                "marketing",
                "automation",
                "certification",
                "relocation",
                "sustainability",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Encode an entity profile into a [`FeatureVector`].
///
/// Layout: `[0, 8)` category sub-vector, `[8]` log-compressed scale,
/// `[9, 25)` smoothed tag indicator block, zero padding to
/// [`FEATURE_LEN`].
pub fn encode(entity: &EntityProfile, cfg: &EncoderConfig) -> FeatureVector {
    let mut values = Vec::with_capacity(FEATURE_LEN);

    values.extend_from_slice(&encode_category(&entity.category, cfg));
    values.push(encode_scale(entity.scale));
    values.extend_from_slice(&encode_tags(&entity.tags, cfg));

    FeatureVector::from_raw(values)
}

/// One-hot over the first [`CATEGORY_WIDTH`] table entries; unknown
/// categories map to a uniform 0.5 sub-vector of the same width.
fn encode_category(category: &str, cfg: &EncoderConfig) -> [f64; CATEGORY_WIDTH] {
    let needle = category.trim().to_ascii_lowercase();
    let slot = cfg
        .categories
        .iter()
        .take(CATEGORY_WIDTH)
        .position(|c| c.eq_ignore_ascii_case(&needle));

    match slot {
        Some(i) => {
            let mut sub = [0.0; CATEGORY_WIDTH];
            sub[i] = 1.0;
            sub
        }
        None => [0.5; CATEGORY_WIDTH],
    }
}

/// `log10(scale + 1) / 10`, degraded to 0 for negative or non-finite input.
fn encode_scale(scale: f64) -> f64 {
    if !scale.is_finite() || scale < 0.0 {
        return 0.0;
    }
    (scale + 1.0).log10() / 10.0
}

/// 16-slot indicator with 0.5 spread to immediate neighbors in table
/// order, followed by L2 normalization of the block.
fn encode_tags(tags: &[String], cfg: &EncoderConfig) -> [f64; TAG_SLOTS] {
    let mut slots = [0.0_f64; TAG_SLOTS];

    for tag in tags {
        let needle = tag.trim().to_ascii_lowercase();
        let Some(i) = cfg
            .tags
            .iter()
            .take(TAG_SLOTS)
            .position(|t| t.eq_ignore_ascii_case(&needle))
        else {
            continue;
        };

        slots[i] = 1.0_f64.max(slots[i]);
        if i > 0 {
            slots[i - 1] = slots[i - 1].max(0.5);
        }
        if i + 1 < TAG_SLOTS {
            slots[i + 1] = slots[i + 1].max(0.5);
        }
    }

    let norm = slots.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in slots.iter_mut() {
            *v /= norm;
        }
    }
    slots
}
