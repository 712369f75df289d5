//! Invocation-level error taxonomy.
//!
//! Per-candidate compute failures never appear here: they are isolated,
//! logged, and the candidate dropped from the batch. Likewise cache
//! failures are degraded locally in the ranking stage. What remains are
//! the terminal conditions a caller can actually act on.

use thiserror::Error;

use crate::source::SourceError;

/// Terminal errors returned by [`MatchEngine`](crate::MatchEngine)
/// invocations.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The query entity is absent or unusable (e.g., blank identifier).
    /// Malformed individual fields degrade inside the encoder instead.
    #[error("invalid input: {0}")]
    Input(String),
    /// Per-request options or engine configuration failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// The candidate source failed; the invocation terminates.
    #[error("candidate source error: {0}")]
    Upstream(#[from] SourceError),
    /// A numerical failure on the query side of the pipeline, or a batch
    /// in which every candidate failed scoring (individual candidate
    /// failures are isolated and skipped instead).
    #[error("compute error: {0}")]
    Compute(String),
    /// The invocation deadline expired; no partial results are returned.
    #[error("invocation cancelled before completion")]
    Cancelled,
}

impl MatchError {
    /// Stable machine-readable error kind for API surfaces and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::Input(_) => "input",
            MatchError::InvalidOptions(_) => "invalid_options",
            MatchError::Upstream(_) => "upstream",
            MatchError::Compute(_) => "compute",
            MatchError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(MatchError::Input("x".into()).kind(), "input");
        assert_eq!(MatchError::InvalidOptions("x".into()).kind(), "invalid_options");
        assert_eq!(
            MatchError::Upstream(SourceError::Unavailable("down".into())).kind(),
            "upstream"
        );
        assert_eq!(MatchError::Compute("x".into()).kind(), "compute");
        assert_eq!(MatchError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn source_errors_convert_to_upstream() {
        let err: MatchError = SourceError::Unavailable("boom".into()).into();
        assert!(matches!(err, MatchError::Upstream(_)));
        assert!(err.to_string().contains("boom"));
    }
}
