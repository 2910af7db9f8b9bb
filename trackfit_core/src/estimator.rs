//! The "SCORING" Layer - Robust Estimators
//!
//! An estimator measures how well a candidate pattern explains a hit set.
//! It reports the number of inliers and a badness value (lower is better)
//! that the consensus engine ranks candidates by.

use crate::hit::Hit;
use crate::pattern::{Pattern, TrackPattern};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Fixed number of expectation-maximisation rounds run by MLESAC.
pub const MLESAC_EM_ITERATIONS: usize = 5;

/// Ratio between the inlier distance threshold and the MLESAC Gaussian sigma
/// (95% two-sided coverage).
pub const MLESAC_SIGMA_RATIO: f64 = 1.96;

// ============================================================================
// ESTIMATOR KIND
// ============================================================================

/// Robust estimator selected for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimatorKind {
    Ransac,
    Lmeds,
    Mlesac,
}

impl EstimatorKind {
    pub fn build(&self) -> Box<dyn Estimator> {
        match self {
            EstimatorKind::Ransac => Box::new(Ransac),
            EstimatorKind::Lmeds => Box::new(Lmeds),
            EstimatorKind::Mlesac => Box::new(Mlesac),
        }
    }

    pub fn all() -> Vec<EstimatorKind> {
        vec![EstimatorKind::Ransac, EstimatorKind::Lmeds, EstimatorKind::Mlesac]
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorKind::Ransac => write!(f, "RANSAC"),
            EstimatorKind::Lmeds => write!(f, "LMedS"),
            EstimatorKind::Mlesac => write!(f, "MLESAC"),
        }
    }
}

impl FromStr for EstimatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ransac" => Ok(EstimatorKind::Ransac),
            "lmeds" => Ok(EstimatorKind::Lmeds),
            "mlesac" => Ok(EstimatorKind::Mlesac),
            _ => Err(format!("Unknown estimator: {}", s)),
        }
    }
}

// ============================================================================
// ESTIMATOR TRAIT
// ============================================================================

/// Outcome of scoring one pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub inliers: usize,

    /// Lower is better. `f64::INFINITY` when nothing supports the pattern.
    pub badness: f64,
}

impl Evaluation {
    fn rejected() -> Self {
        Self {
            inliers: 0,
            badness: f64::INFINITY,
        }
    }
}

pub trait Estimator: Send + Sync {
    fn kind(&self) -> EstimatorKind;

    /// Scores `pattern` against `hits`. A hit is an inlier when its squared
    /// distance to the pattern is below `threshold^2`.
    fn evaluate(&self, pattern: &Pattern, hits: &[Hit], threshold: f64) -> Evaluation;

    /// Scores `pattern` and stores the badness as its chi-squared.
    fn score(&self, pattern: &mut Pattern, hits: &[Hit], threshold: f64) -> Evaluation {
        let evaluation = self.evaluate(pattern, hits, threshold);
        pattern.set_chi2(evaluation.badness);
        evaluation
    }
}

/// Squared residuals of the hits inside the threshold.
fn inlier_residuals(pattern: &Pattern, hits: &[Hit], threshold: f64) -> Vec<f64> {
    let threshold_sq = threshold * threshold;
    hits.iter()
        .map(|hit| pattern.distance_to(hit.position()).powi(2))
        .filter(|error| *error < threshold_sq)
        .collect()
}

/// Median of `values`; the two central elements are averaged for even
/// lengths. Returns `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// Mean squared residual of the inliers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ransac;

impl Estimator for Ransac {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Ransac
    }

    fn evaluate(&self, pattern: &Pattern, hits: &[Hit], threshold: f64) -> Evaluation {
        let residuals = inlier_residuals(pattern, hits, threshold);
        if residuals.is_empty() {
            return Evaluation::rejected();
        }
        let inliers = residuals.len();
        Evaluation {
            inliers,
            badness: residuals.iter().sum::<f64>() / inliers as f64,
        }
    }
}

/// Median squared residual of the inliers, divided by the inlier count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lmeds;

impl Estimator for Lmeds {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Lmeds
    }

    fn evaluate(&self, pattern: &Pattern, hits: &[Hit], threshold: f64) -> Evaluation {
        let residuals = inlier_residuals(pattern, hits, threshold);
        match median(&residuals) {
            Some(median) => Evaluation {
                inliers: residuals.len(),
                badness: median / residuals.len() as f64,
            },
            None => Evaluation::rejected(),
        }
    }
}

/// Gaussian inliers mixed with uniform outliers, mixing weight by EM.
///
/// A negative or non-finite log-likelihood sum scores as 0 (a perfect
/// candidate).
#[derive(Debug, Clone, Copy, Default)]
pub struct Mlesac;

impl Estimator for Mlesac {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Mlesac
    }

    fn evaluate(&self, pattern: &Pattern, hits: &[Hit], threshold: f64) -> Evaluation {
        let distances: Vec<f64> = hits
            .iter()
            .map(|hit| pattern.distance_to(hit.position()))
            .collect();
        if distances.is_empty() {
            return Evaluation::rejected();
        }

        let sigma = threshold / MLESAC_SIGMA_RATIO;
        let sigma_sq = sigma * sigma;
        // Outlier density spans the range of unsquared distances
        let (min_distance, max_distance) = distances
            .iter()
            .filter(|d| d.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        let nu = (max_distance - min_distance).max(f64::MIN_POSITIVE);
        let errors: Vec<f64> = distances.iter().map(|d| d * d).collect();
        let p_in_norm = 1.0 / (2.0 * PI * sigma_sq).sqrt();

        let mut gamma = 0.5;
        for _ in 0..MLESAC_EM_ITERATIONS {
            let p_out = (1.0 - gamma) / nu;
            let responsibility: f64 = errors
                .iter()
                .map(|e| {
                    let p_in = gamma * p_in_norm * (-e / (2.0 * sigma_sq)).exp();
                    p_in / (p_in + p_out)
                })
                .filter(|r| r.is_finite())
                .sum();
            gamma = responsibility / errors.len() as f64;
        }

        let p_out = (1.0 - gamma) / nu;
        let mut inliers = 0;
        let mut neg_log_likelihood = 0.0;
        for e in errors.iter().filter(|e| **e < sigma_sq) {
            let p_in = gamma * p_in_norm * (-e / (2.0 * sigma_sq)).exp();
            neg_log_likelihood -= (p_in + p_out).ln();
            inliers += 1;
        }

        if inliers == 0 {
            return Evaluation::rejected();
        }
        let badness = if neg_log_likelihood < 0.0 || !neg_log_likelihood.is_finite() {
            0.0
        } else {
            neg_log_likelihood / inliers as f64
        };
        Evaluation { inliers, badness }
    }
}

// ============================================================================
// TESTS
// ============================================================================
