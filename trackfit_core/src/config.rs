//! Run configuration for the consensus engine.
//!
//! Configurations deserialize from JSON with every field optional. Missing
//! fields take the defaults below. Validation happens once, before the
//! engine is built, and is the only place a run can fail.

use crate::error::ConfigError;
use crate::estimator::EstimatorKind;
use crate::pattern::PatternKind;
use crate::sampling::SampleMethod;
use crate::vertex::{VertexConfig, VertexMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for [`crate::SampleConsensus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Pattern family to search for (default: Line)
    pub pattern: PatternKind,

    /// Candidate scoring method (default: RANSAC)
    pub estimator: EstimatorKind,

    /// Strategy for drawing candidate seeds (default: Uniform)
    pub sample_method: SampleMethod,

    /// Number of sample/score cycles per event (default: 500)
    pub iterations: usize,

    /// A cluster must have strictly more inliers than this (default: 30)
    pub min_inliers: usize,

    /// Inlier distance threshold in detector length units (default: 15.0)
    pub distance_threshold: f64,

    /// Hits above this charge take part in a charge-weighted final fit.
    /// Negative values disable weighting (default: -1.0)
    pub charge_threshold: f64,

    /// Proximity scale of the Gaussian samplers (default: 30.0)
    pub gaussian_sigma: f64,

    /// Seed of the engine RNG (default: 42)
    pub seed: u64,

    /// Vertex reconstruction settings (default: mode Off)
    pub vertex: VertexConfig,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            pattern: PatternKind::Line,
            estimator: EstimatorKind::Ransac,
            sample_method: SampleMethod::Uniform,
            iterations: 500,
            min_inliers: 30,
            distance_threshold: 15.0,
            charge_threshold: -1.0,
            gaussian_sigma: 30.0,
            seed: 42,
            vertex: VertexConfig::default(),
        }
    }
}

impl ConsensusConfig {
    /// Parses a JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every numeric setting and the pattern/vertex pairing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        require_positive("distance_threshold", self.distance_threshold)?;
        require_positive("gaussian_sigma", self.gaussian_sigma)?;
        if !self.charge_threshold.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "charge_threshold",
                value: self.charge_threshold,
            });
        }

        if self.vertex.mode != VertexMode::Off && self.pattern != PatternKind::Line {
            return Err(ConfigError::VertexRequiresLine(self.pattern));
        }
        self.vertex.validate()
    }

    /// Charge cut for the final fit, `None` when weighting is disabled.
    pub fn fit_charge_threshold(&self) -> Option<f64> {
        (self.charge_threshold >= 0.0).then_some(self.charge_threshold)
    }

    // ========================================================================
    // BUILDER
    // ========================================================================

    pub fn with_pattern(mut self, pattern: PatternKind) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorKind) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_sample_method(mut self, sample_method: SampleMethod) -> Self {
        self.sample_method = sample_method;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_min_inliers(mut self, min_inliers: usize) -> Self {
        self.min_inliers = min_inliers;
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f64) -> Self {
        self.distance_threshold = threshold;
        self
    }

    pub fn with_charge_threshold(mut self, threshold: f64) -> Self {
        self.charge_threshold = threshold;
        self
    }

    pub fn with_gaussian_sigma(mut self, sigma: f64) -> Self {
        self.gaussian_sigma = sigma;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_vertex(mut self, vertex: VertexConfig) -> Self {
        self.vertex = vertex;
        self
    }

    pub fn with_vertex_mode(mut self, mode: VertexMode) -> Self {
        self.vertex.mode = mode;
        self
    }
}

/// Rejects non-finite and non-positive values.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConsensusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.iterations, 500);
        assert_eq!(config.min_inliers, 30);
        assert_eq!(config.fit_charge_threshold(), None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ConsensusConfig::from_json_str(
            r#"{ "estimator": "Mlesac", "min_inliers": 20, "vertex": { "mode": "PerTrack" } }"#,
        )
        .unwrap();

        assert_eq!(config.estimator, EstimatorKind::Mlesac);
        assert_eq!(config.min_inliers, 20);
        assert_eq!(config.distance_threshold, 15.0);
        assert_eq!(config.vertex.mode, VertexMode::PerTrack);
        assert_eq!(config.vertex.max_radius, 25.0);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ConsensusConfig::default()
            .with_sample_method(SampleMethod::WeightedGaussian)
            .with_charge_threshold(5.0);
        let parsed = ConsensusConfig::from_json_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.fit_charge_threshold(), Some(5.0));
    }

    #[test]
    fn test_invalid_values_fail_loudly() {
        let zero_iterations = ConsensusConfig::default().with_iterations(0);
        assert!(matches!(zero_iterations.validate(), Err(ConfigError::ZeroIterations)));

        let negative_threshold = ConsensusConfig::default().with_distance_threshold(-1.0);
        assert!(matches!(
            negative_threshold.validate(),
            Err(ConfigError::InvalidParameter { name: "distance_threshold", .. })
        ));

        let circle_vertex = ConsensusConfig::default()
            .with_pattern(PatternKind::Circle2D)
            .with_vertex_mode(VertexMode::PairwiseBest);
        assert!(matches!(
            circle_vertex.validate(),
            Err(ConfigError::VertexRequiresLine(PatternKind::Circle2D))
        ));
    }

    #[test]
    fn test_sampler_and_vertex_builders() {
        let vertex = VertexConfig {
            mode: VertexMode::PerTrack,
            max_radius: 40.0,
            ..Default::default()
        };
        let config = ConsensusConfig::default()
            .with_gaussian_sigma(12.5)
            .with_vertex(vertex.clone());

        assert_eq!(config.gaussian_sigma, 12.5);
        assert_eq!(config.vertex, vertex);
        assert!(config.validate().is_ok());

        let zero_sigma = config.with_gaussian_sigma(0.0);
        assert!(matches!(
            zero_sigma.validate(),
            Err(ConfigError::InvalidParameter { name: "gaussian_sigma", .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let result = ConsensusConfig::from_json_str(r#"{ "estimator": "Hough" }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
