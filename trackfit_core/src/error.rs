//! Error types for pattern geometry and run configuration.
//!
//! Geometry errors are recovered inside a consensus run (the candidate is
//! dropped). Configuration errors are the only ones surfaced to callers and
//! they are raised before any sampling starts.

use crate::pattern::PatternKind;

// ============================================================================
// PATTERN ERRORS
// ============================================================================

/// Errors raised while defining or fitting a pattern.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("{kind} needs exactly {expected} points to be defined, got {got}")]
    WrongPointCount {
        kind: PatternKind,
        expected: usize,
        got: usize,
    },

    #[error("Fit needs at least {needed} points, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("Degenerate geometry: {0}")]
    Degenerate(&'static str),
}

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

/// Errors raised while loading or validating a [`crate::ConsensusConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Iteration count must be at least 1")]
    ZeroIterations,

    #[error("Vertex finding requires the Line pattern, configured pattern is {0}")]
    VertexRequiresLine(PatternKind),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
