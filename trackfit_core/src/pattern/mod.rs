//! The "PATTERN" Layer - Parametric Track Models
//!
//! A pattern is a geometric model that can be:
//! 1. Defined from the minimal point set drawn by a sampler (a candidate)
//! 2. Queried for point distances during scoring and extraction
//! 3. Refined by a least-squares fit over the extracted inliers
//!
//! Concrete models live in [`line`] and [`circle`]. The [`Pattern`] enum
//! dispatches over them so candidates can be stored and cloned by value.

pub mod circle;
pub mod line;

use crate::error::PatternError;
use crate::hit::Hit;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use circle::CirclePattern;
pub use line::LinePattern;

// ============================================================================
// PATTERN KIND
// ============================================================================

/// Pattern families understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    /// Straight 3D line, parameters `[px, py, pz, dx, dy, dz]`
    Line,

    /// Circle in the xy (pad) plane, parameters `[cx, cy, r]`
    Circle2D,
}

impl PatternKind {
    /// Minimum number of points that pins down one instance of the family.
    pub fn num_points_to_define(&self) -> usize {
        match self {
            PatternKind::Line => 2,
            PatternKind::Circle2D => 3,
        }
    }

    /// Length of the parameter vector.
    pub fn num_parameters(&self) -> usize {
        match self {
            PatternKind::Line => 6,
            PatternKind::Circle2D => 3,
        }
    }

    pub fn all() -> Vec<PatternKind> {
        vec![PatternKind::Line, PatternKind::Circle2D]
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Line => write!(f, "Line"),
            PatternKind::Circle2D => write!(f, "Circle2D"),
        }
    }
}

impl FromStr for PatternKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(PatternKind::Line),
            "circle2d" | "circle" => Ok(PatternKind::Circle2D),
            _ => Err(format!("Unknown pattern kind: {}", s)),
        }
    }
}

// ============================================================================
// PATTERN CAPABILITIES
// ============================================================================

/// Capability set shared by every pattern family.
pub trait TrackPattern {
    fn kind(&self) -> PatternKind;

    fn num_points_to_define(&self) -> usize {
        self.kind().num_points_to_define()
    }

    /// Sets the parameters from exactly `num_points_to_define` points.
    fn define_from_points(&mut self, points: &[Vector3<f64>]) -> Result<(), PatternError>;

    /// Non-negative distance from `point` to the pattern.
    /// Undefined patterns report `f64::INFINITY`.
    fn distance_to(&self, point: &Vector3<f64>) -> f64;

    fn closest_point(&self, point: &Vector3<f64>) -> Vector3<f64>;

    /// Evaluates the pattern at its natural parameter.
    fn point_at(&self, t: f64) -> Vector3<f64>;

    /// Least-squares refinement. An empty `charges` slice means unweighted.
    /// Returns the resulting chi-squared.
    fn fit_from_points(
        &mut self,
        points: &[Vector3<f64>],
        charges: &[f64],
    ) -> Result<f64, PatternError>;

    fn parameters(&self) -> &[f64];

    fn chi2(&self) -> f64;

    fn set_chi2(&mut self, chi2: f64);

    /// Degrees of freedom of the last fit.
    fn n_free(&self) -> usize;

    /// Fits the pattern to hits.
    ///
    /// With a charge threshold only hits whose charge exceeds it take part,
    /// weighted by their charge. If too few hits survive the cut the fit
    /// falls back to an unweighted fit of all hits.
    fn fit_hits(
        &mut self,
        hits: &[Hit],
        charge_threshold: Option<f64>,
    ) -> Result<f64, PatternError> {
        if let Some(threshold) = charge_threshold {
            let (points, charges): (Vec<Vector3<f64>>, Vec<f64>) = hits
                .iter()
                .filter(|hit| hit.charge() > threshold)
                .map(|hit| (*hit.position(), hit.charge()))
                .unzip();

            if points.len() >= self.num_points_to_define() {
                return self.fit_from_points(&points, &charges);
            }
        }

        let points: Vec<Vector3<f64>> = hits.iter().map(|hit| *hit.position()).collect();
        self.fit_from_points(&points, &[])
    }
}

/// Checks the weight vector against the point set and returns per-point
/// weights (all ones when unweighted).
pub(crate) fn resolve_weights(
    points: &[Vector3<f64>],
    charges: &[f64],
) -> Result<Vec<f64>, PatternError> {
    if charges.is_empty() {
        return Ok(vec![1.0; points.len()]);
    }
    if charges.len() != points.len() {
        return Err(PatternError::Degenerate("charge count does not match point count"));
    }
    Ok(charges.to_vec())
}

// ============================================================================
// PATTERN (enum dispatch)
// ============================================================================

/// A pattern of any supported family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Pattern {
    Line(LinePattern),
    Circle2D(CirclePattern),
}

impl Pattern {
    /// Creates an empty, undefined pattern of the given family.
    pub fn new(kind: PatternKind) -> Self {
        match kind {
            PatternKind::Line => Pattern::Line(LinePattern::new()),
            PatternKind::Circle2D => Pattern::Circle2D(CirclePattern::new()),
        }
    }

    pub fn as_line(&self) -> Option<&LinePattern> {
        match self {
            Pattern::Line(line) => Some(line),
            _ => None,
        }
    }

    pub fn as_circle(&self) -> Option<&CirclePattern> {
        match self {
            Pattern::Circle2D(circle) => Some(circle),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn TrackPattern {
        match self {
            Pattern::Line(line) => line,
            Pattern::Circle2D(circle) => circle,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn TrackPattern {
        match self {
            Pattern::Line(line) => line,
            Pattern::Circle2D(circle) => circle,
        }
    }
}

impl TrackPattern for Pattern {
    fn kind(&self) -> PatternKind {
        self.inner().kind()
    }

    fn define_from_points(&mut self, points: &[Vector3<f64>]) -> Result<(), PatternError> {
        self.inner_mut().define_from_points(points)
    }

    fn distance_to(&self, point: &Vector3<f64>) -> f64 {
        self.inner().distance_to(point)
    }

    fn closest_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.inner().closest_point(point)
    }

    fn point_at(&self, t: f64) -> Vector3<f64> {
        self.inner().point_at(t)
    }

    fn fit_from_points(
        &mut self,
        points: &[Vector3<f64>],
        charges: &[f64],
    ) -> Result<f64, PatternError> {
        self.inner_mut().fit_from_points(points, charges)
    }

    fn parameters(&self) -> &[f64] {
        self.inner().parameters()
    }

    fn chi2(&self) -> f64 {
        self.inner().chi2()
    }

    fn set_chi2(&mut self, chi2: f64) {
        self.inner_mut().set_chi2(chi2)
    }

    fn n_free(&self) -> usize {
        self.inner().n_free()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_to_define_per_kind() {
        assert_eq!(Pattern::new(PatternKind::Line).num_points_to_define(), 2);
        assert_eq!(Pattern::new(PatternKind::Circle2D).num_points_to_define(), 3);
    }

    #[test]
    fn test_new_pattern_has_undefined_chi2() {
        for kind in PatternKind::all() {
            let pattern = Pattern::new(kind);
            assert!(pattern.chi2().is_nan());
            assert_eq!(pattern.kind(), kind);
        }
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("line".parse::<PatternKind>().unwrap(), PatternKind::Line);
        assert_eq!("Circle2D".parse::<PatternKind>().unwrap(), PatternKind::Circle2D);
        assert!("helix".parse::<PatternKind>().is_err());
    }

    #[test]
    fn test_fit_hits_charge_cut_falls_back_to_unweighted() {
        let hits = vec![
            Hit::new(0, Vector3::new(0.0, 0.0, 0.0), 1.0),
            Hit::new(1, Vector3::new(1.0, 1.0, 1.0), 1.0),
            Hit::new(2, Vector3::new(2.0, 2.0, 2.0), 50.0),
        ];
        let mut pattern = Pattern::new(PatternKind::Line);

        // Only one hit passes the cut, so all three are fitted unweighted
        let chi2 = pattern.fit_hits(&hits, Some(10.0)).unwrap();
        assert!(chi2 < 1e-9);
        assert_eq!(pattern.n_free(), 0);
        assert!(pattern.distance_to(&Vector3::new(3.0, 3.0, 3.0)) < 1e-9);
    }
}
