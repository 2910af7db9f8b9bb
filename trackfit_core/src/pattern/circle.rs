//! Circle in the pad (xy) plane.
//!
//! Drift coordinate z is ignored by every query. Points produced by
//! [`CirclePattern::point_at`] and [`CirclePattern::closest_point`] lie at z = 0.

use super::{resolve_weights, PatternKind, TrackPattern};
use crate::error::PatternError;
use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Circle with parameters `[cx, cy, r]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CirclePattern {
    params: [f64; 3],
    chi2: f64,
    n_free: usize,
}

impl Default for CirclePattern {
    fn default() -> Self {
        Self::new()
    }
}

impl CirclePattern {
    pub fn new() -> Self {
        Self {
            params: [0.0; 3],
            chi2: f64::NAN,
            n_free: 0,
        }
    }

    pub fn center(&self) -> Vector3<f64> {
        Vector3::new(self.params[0], self.params[1], 0.0)
    }

    pub fn radius(&self) -> f64 {
        self.params[2]
    }

    fn center_xy(&self) -> Vector2<f64> {
        Vector2::new(self.params[0], self.params[1])
    }
}

impl TrackPattern for CirclePattern {
    fn kind(&self) -> PatternKind {
        PatternKind::Circle2D
    }

    fn define_from_points(&mut self, points: &[Vector3<f64>]) -> Result<(), PatternError> {
        if points.len() != self.num_points_to_define() {
            return Err(PatternError::WrongPointCount {
                kind: PatternKind::Circle2D,
                expected: self.num_points_to_define(),
                got: points.len(),
            });
        }

        let (a, b, c) = (points[0], points[1], points[2]);
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() <= f64::EPSILON * (1.0 + a.xy().norm_squared()) {
            return Err(PatternError::Degenerate("circle defined by collinear points"));
        }

        let (sa, sb, sc) = (
            a.xy().norm_squared(),
            b.xy().norm_squared(),
            c.xy().norm_squared(),
        );
        let cx = (sa * (b.y - c.y) + sb * (c.y - a.y) + sc * (a.y - b.y)) / d;
        let cy = (sa * (c.x - b.x) + sb * (a.x - c.x) + sc * (b.x - a.x)) / d;
        let r = (a.xy() - Vector2::new(cx, cy)).norm();

        self.params = [cx, cy, r];
        self.n_free = 0;
        Ok(())
    }

    fn distance_to(&self, point: &Vector3<f64>) -> f64 {
        if !(self.radius() > 0.0) {
            return f64::INFINITY;
        }
        ((point.xy() - self.center_xy()).norm() - self.radius()).abs()
    }

    fn closest_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let offset = point.xy() - self.center_xy();
        let theta = if offset.norm_squared() > 0.0 {
            offset.y.atan2(offset.x)
        } else {
            0.0
        };
        self.point_at(theta)
    }

    /// Point at polar angle `t` (radians) around the centre.
    fn point_at(&self, t: f64) -> Vector3<f64> {
        let (s, c) = t.sin_cos();
        Vector3::new(
            self.params[0] + self.radius() * c,
            self.params[1] + self.radius() * s,
            0.0,
        )
    }

    /// Weighted algebraic (Kasa) fit of `x^2 + y^2 + Dx + Ey + F = 0`.
    fn fit_from_points(
        &mut self,
        points: &[Vector3<f64>],
        charges: &[f64],
    ) -> Result<f64, PatternError> {
        let needed = self.num_points_to_define();
        if points.len() < needed {
            return Err(PatternError::TooFewPoints {
                needed,
                got: points.len(),
            });
        }

        let weights = resolve_weights(points, charges)?;
        let total_weight: f64 = weights.iter().sum();
        if !(total_weight > 0.0) || !total_weight.is_finite() {
            return Err(PatternError::Degenerate("total fit weight is not positive"));
        }

        // Work relative to the weighted centroid for conditioning
        let mean = points
            .iter()
            .zip(&weights)
            .fold(Vector2::<f64>::zeros(), |acc, (p, w)| acc + p.xy() * *w)
            / total_weight;

        let mut normal = Matrix3::<f64>::zeros();
        let mut rhs = Vector3::<f64>::zeros();
        for (p, w) in points.iter().zip(&weights) {
            let q = p.xy() - mean;
            let row = Vector3::new(q.x, q.y, 1.0);
            normal += row * row.transpose() * *w;
            rhs -= row * (q.norm_squared() * w);
        }

        let solution = normal
            .lu()
            .solve(&rhs)
            .ok_or(PatternError::Degenerate("circle normal equations are singular"))?;

        let (d, e, f) = (solution.x, solution.y, solution.z);
        let radius_sq = (d * d + e * e) / 4.0 - f;
        if !(radius_sq > 0.0) || !radius_sq.is_finite() {
            return Err(PatternError::Degenerate("fitted circle has no real radius"));
        }

        let center = mean + Vector2::new(-d / 2.0, -e / 2.0);
        self.params = [center.x, center.y, radius_sq.sqrt()];

        let weighted_residual: f64 = points
            .iter()
            .zip(&weights)
            .map(|(p, w)| w * self.distance_to(p).powi(2))
            .sum();
        self.chi2 = weighted_residual / total_weight;
        self.n_free = points.len().saturating_sub(PatternKind::Circle2D.num_parameters());
        Ok(self.chi2)
    }

    fn parameters(&self) -> &[f64] {
        &self.params
    }

    fn chi2(&self) -> f64 {
        self.chi2
    }

    fn set_chi2(&mut self, chi2: f64) {
        self.chi2 = chi2;
    }

    fn n_free(&self) -> usize {
        self.n_free
    }
}

// ============================================================================
// TESTS
// ============================================================================
