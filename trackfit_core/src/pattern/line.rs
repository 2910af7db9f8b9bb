//! Straight 3D line model and its charge-weighted orthogonal regression.
//!
//! The fit follows Jacquelin's closed-form regression: the direction is
//! recovered from the smallest root of a cubic built from the rotated
//! second moments, so no iterative eigen-solver is needed in the common
//! case. Lines lying in a plane of constant z make the closed form
//! singular; those fall back to the dominant eigenvector of the scatter
//! matrix.

use super::{resolve_weights, PatternKind, TrackPattern};
use crate::error::PatternError;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tolerance below which the depressed-cubic radius counts as a triple root.
const TRIPLE_ROOT_EPSILON: f64 = 1e-300;

/// Allowed mismatch (relative to the scatter trace) between the closed-form
/// residual and the residual of the recovered axis.
const CLOSED_FORM_TOLERANCE: f64 = 1e-6;

/// Infinite line `point + t * direction`.
///
/// Parameters are stored as `[px, py, pz, dx, dy, dz]`. The direction is not
/// normalized; every formula divides by its magnitude where needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinePattern {
    params: [f64; 6],
    chi2: f64,
    n_free: usize,
}

impl Default for LinePattern {
    fn default() -> Self {
        Self::new()
    }
}

impl LinePattern {
    /// Creates an undefined line (zero direction, NaN chi-squared).
    pub fn new() -> Self {
        Self {
            params: [0.0; 6],
            chi2: f64::NAN,
            n_free: 0,
        }
    }

    pub fn from_point_direction(point: Vector3<f64>, direction: Vector3<f64>) -> Self {
        let mut line = Self::new();
        line.set_point_direction(point, direction);
        line
    }

    pub fn point(&self) -> Vector3<f64> {
        Vector3::new(self.params[0], self.params[1], self.params[2])
    }

    pub fn direction(&self) -> Vector3<f64> {
        Vector3::new(self.params[3], self.params[4], self.params[5])
    }

    /// The point one direction-length away from the anchor.
    pub fn second_point(&self) -> Vector3<f64> {
        self.point() + self.direction()
    }

    fn set_point_direction(&mut self, point: Vector3<f64>, direction: Vector3<f64>) {
        self.params = [point.x, point.y, point.z, direction.x, direction.y, direction.z];
    }
}

impl TrackPattern for LinePattern {
    fn kind(&self) -> PatternKind {
        PatternKind::Line
    }

    fn define_from_points(&mut self, points: &[Vector3<f64>]) -> Result<(), PatternError> {
        if points.len() != self.num_points_to_define() {
            return Err(PatternError::WrongPointCount {
                kind: PatternKind::Line,
                expected: self.num_points_to_define(),
                got: points.len(),
            });
        }

        let direction = points[1] - points[0];
        if direction.norm_squared() == 0.0 {
            return Err(PatternError::Degenerate("line defined by coincident points"));
        }

        self.set_point_direction(points[0], direction);
        self.n_free = 0;
        Ok(())
    }

    fn distance_to(&self, point: &Vector3<f64>) -> f64 {
        let direction = self.direction();
        let norm = direction.norm();
        if norm <= f64::MIN_POSITIVE {
            return f64::INFINITY;
        }
        direction.cross(&(point - self.point())).norm() / norm
    }

    fn closest_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let direction = self.direction();
        let norm_sq = direction.norm_squared();
        if norm_sq <= f64::MIN_POSITIVE {
            return self.point();
        }
        let t = (point - self.point()).dot(&direction) / norm_sq;
        self.point_at(t)
    }

    fn point_at(&self, t: f64) -> Vector3<f64> {
        self.point() + self.direction() * t
    }

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
        let moments = Moments::compute(points, &weights)
            .ok_or(PatternError::Degenerate("total fit weight is not positive"))?;

        let (direction, residual) = match moments.closed_form_direction() {
            Some(fit) => fit,
            None => moments
                .eigen_direction()
                .ok_or(PatternError::Degenerate("scatter matrix has no dominant axis"))?,
        };

        self.set_point_direction(moments.mean, direction);
        self.chi2 = residual.abs() / moments.total_weight;
        self.n_free = points.len().saturating_sub(PatternKind::Line.num_parameters());
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
// WEIGHTED MOMENTS
// ============================================================================

/// Weighted first and centered second moments of a point set.
#[derive(Debug, Clone)]
struct Moments {
    total_weight: f64,
    mean: Vector3<f64>,
    sxx: f64,
    syy: f64,
    szz: f64,
    sxy: f64,
    sxz: f64,
    syz: f64,
}

impl Moments {
    fn compute(points: &[Vector3<f64>], weights: &[f64]) -> Option<Self> {
        let total_weight: f64 = weights.iter().sum();
        if !(total_weight > 0.0) || !total_weight.is_finite() {
            return None;
        }

        let mean = points
            .iter()
            .zip(weights)
            .fold(Vector3::<f64>::zeros(), |acc, (p, w)| acc + p * *w)
            / total_weight;

        let mut m = Self {
            total_weight,
            mean,
            sxx: 0.0,
            syy: 0.0,
            szz: 0.0,
            sxy: 0.0,
            sxz: 0.0,
            syz: 0.0,
        };
        for (p, w) in points.iter().zip(weights) {
            let d = p - mean;
            m.sxx += w * d.x * d.x;
            m.syy += w * d.y * d.y;
            m.szz += w * d.z * d.z;
            m.sxy += w * d.x * d.y;
            m.sxz += w * d.x * d.z;
            m.syz += w * d.y * d.z;
        }
        m.sxx /= total_weight;
        m.syy /= total_weight;
        m.szz /= total_weight;
        m.sxy /= total_weight;
        m.sxz /= total_weight;
        m.syz /= total_weight;
        Some(m)
    }

    /// Jacquelin's closed form. Returns the direction and the smallest root
    /// `dm2` (mean squared perpendicular residual), or `None` when the
    /// coefficients blow up.
    fn closed_form_direction(&self) -> Option<(Vector3<f64>, f64)> {
        let theta = 0.5 * (2.0 * self.sxy).atan2(self.sxx - self.syy);
        let (s, c) = theta.sin_cos();

        let k11 = (self.syy + self.szz) * c * c + (self.sxx + self.szz) * s * s
            - 2.0 * self.sxy * c * s;
        let k22 = (self.syy + self.szz) * s * s + (self.sxx + self.szz) * c * c
            + 2.0 * self.sxy * c * s;
        let k10 = self.sxz * c + self.syz * s;
        let k01 = -self.sxz * s + self.syz * c;
        let k00 = self.sxx + self.syy;

        let c2 = -k00 - k11 - k22;
        let c1 = k00 * k11 + k00 * k22 + k11 * k22 - k01 * k01 - k10 * k10;
        let c0 = k01 * k01 * k11 + k10 * k10 * k22 - k00 * k11 * k22;

        let dm2 = smallest_cubic_root(c2, c1, c0);

        let a = -k10 * c / (k11 - dm2) + k01 * s / (k22 - dm2);
        let b = -k10 * s / (k11 - dm2) - k01 * c / (k22 - dm2);
        if !a.is_finite() || !b.is_finite() {
            return None;
        }

        // K11 or K22 close to dm2 leaves a and b numerically meaningless
        let axis = Vector3::new(a, b, -1.0);
        let scatter = self.scatter();
        let trace = scatter.trace();
        let residual = trace - axis.dot(&(scatter * axis)) / axis.norm_squared();
        if (residual - dm2).abs() > CLOSED_FORM_TOLERANCE * trace.abs().max(f64::MIN_POSITIVE) {
            return None;
        }

        // Foot of the perpendicular from the origin to the fitted line
        let (xm, ym, zm) = (self.mean.x, self.mean.y, self.mean.z);
        let u = 1.0 + a * a + b * b;
        let foot = Vector3::new(
            ((1.0 + b * b) * xm - a * b * ym + a * zm) / u,
            ((1.0 + a * a) * ym - a * b * xm + b * zm) / u,
            ((a * a + b * b) * zm + a * xm + b * ym) / u,
        );

        let mut direction = foot - self.mean;
        if direction.norm() <= 1e-9 * (1.0 + self.mean.norm()) {
            direction = axis;
        }
        Some((direction, dm2))
    }

    fn scatter(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.sxx, self.sxy, self.sxz,
            self.sxy, self.syy, self.syz,
            self.sxz, self.syz, self.szz,
        )
    }

    /// Dominant eigenvector of the scatter matrix. The residual is the sum
    /// of the two smaller eigenvalues.
    fn eigen_direction(&self) -> Option<(Vector3<f64>, f64)> {
        let scatter = self.scatter();
        let eigen = SymmetricEigen::new(scatter);
        let dominant = eigen.eigenvalues.imax();
        if !(eigen.eigenvalues[dominant] > 0.0) {
            return None;
        }
        let direction: Vector3<f64> = eigen.eigenvectors.column(dominant).into_owned();
        if direction.norm_squared() == 0.0 || !direction.iter().all(|v| v.is_finite()) {
            return None;
        }

        let residual = (scatter.trace() - eigen.eigenvalues[dominant]).max(0.0);
        Some((direction, residual))
    }
}

/// Smallest real root of `x^3 + c2 x^2 + c1 x + c0`.
///
/// Uses Cardano when the discriminant is positive (one real root) and the
/// trigonometric form otherwise (three real roots).
fn smallest_cubic_root(c2: f64, c1: f64, c0: f64) -> f64 {
    let shift = -c2 / 3.0;
    let p = c1 - c2 * c2 / 3.0;
    let q = 2.0 * c2 * c2 * c2 / 27.0 - c1 * c2 / 3.0 + c0;
    let r = (q / 2.0).powi(2) + p * p * p / 27.0;

    if r > 0.0 {
        let sqrt_r = r.sqrt();
        return shift + (-q / 2.0 + sqrt_r).cbrt() + (-q / 2.0 - sqrt_r).cbrt();
    }

    let rho = (-p * p * p / 27.0).max(0.0).sqrt();
    if rho <= TRIPLE_ROOT_EPSILON {
        return shift;
    }

    let phi = (-q / (2.0 * rho)).clamp(-1.0, 1.0).acos();
    let scale = 2.0 * rho.cbrt();
    (0..3)
        .map(|k| shift + scale * ((phi + 2.0 * PI * k as f64) / 3.0).cos())
        .fold(f64::INFINITY, f64::min)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_define_and_distance() {
        let mut line = LinePattern::new();
        line.define_from_points(&[Vector3::zeros(), Vector3::new(2.0, 0.0, 0.0)])
            .unwrap();

        // 3-4-5 triangle perpendicular to the x axis
        assert_relative_eq!(line.distance_to(&Vector3::new(7.0, 3.0, 4.0)), 5.0, epsilon = 1e-12);
        assert_eq!(line.direction(), Vector3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_closest_point_and_point_at() {
        let line = LinePattern::from_point_direction(
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 2.0),
        );

        let closest = line.closest_point(&Vector3::new(5.0, -3.0, 8.0));
        assert_abs_diff_eq!(closest, Vector3::new(1.0, 1.0, 8.0), epsilon = 1e-12);
        assert_abs_diff_eq!(line.point_at(1.5), Vector3::new(1.0, 1.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_define_rejects_bad_input() {
        let mut line = LinePattern::new();
        let p = Vector3::new(1.0, 2.0, 3.0);

        assert!(matches!(
            line.define_from_points(&[p]),
            Err(PatternError::WrongPointCount { expected: 2, got: 1, .. })
        ));
        assert!(matches!(
            line.define_from_points(&[p, p]),
            Err(PatternError::Degenerate(_))
        ));
    }

    #[test]
    fn test_undefined_line_is_infinitely_far() {
        let line = LinePattern::new();
        assert!(line.distance_to(&Vector3::new(1.0, 0.0, 0.0)).is_infinite());
    }

    #[test]
    fn test_fit_two_points_is_exact() {
        let p1 = Vector3::new(1.0, 2.0, 3.0);
        let p2 = Vector3::new(4.0, 6.0, 15.0);
        let mut line = LinePattern::new();

        let chi2 = line.fit_from_points(&[p1, p2], &[]).unwrap();

        assert_abs_diff_eq!(chi2, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(line.distance_to(&p1), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(line.distance_to(&p2), 0.0, epsilon = 1e-6);
        // Anchor is the centroid
        assert_abs_diff_eq!(line.point(), (p1 + p2) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_perfect_line_with_random_charges() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let origin = Vector3::new(10.0, -5.0, 100.0);
        let truth = Vector3::new(0.3, 0.5, 1.0);

        let points: Vec<Vector3<f64>> =
            (0..25).map(|i| origin + truth * (i as f64 * 4.0)).collect();
        let charges: Vec<f64> = (0..25).map(|_| rng.gen_range(1.0..100.0)).collect();

        let mut line = LinePattern::new();
        let chi2 = line.fit_from_points(&points, &charges).unwrap();

        let fitted = line.direction().normalize();
        assert_abs_diff_eq!(fitted.cross(&truth.normalize()).norm(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(chi2, 0.0, epsilon = 1e-6);
        assert_eq!(line.n_free(), 25 - 6);
        for p in &points {
            assert!(line.distance_to(p) < 1e-4);
        }
    }

    #[test]
    fn test_fit_line_at_constant_z_uses_eigen_fallback() {
        // Direction perpendicular to z makes the closed form singular
        let points: Vec<Vector3<f64>> =
            (0..10).map(|i| Vector3::new(i as f64, 2.0 * i as f64, 5.0)).collect();
        let mut line = LinePattern::new();

        let chi2 = line.fit_from_points(&points, &[]).unwrap();

        let fitted = line.direction().normalize();
        let truth = Vector3::new(1.0, 2.0, 0.0).normalize();
        assert_abs_diff_eq!(fitted.cross(&truth).norm(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(chi2, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_noisy_line_reports_mean_residual() {
        // Two parallel rows 1 unit either side of the z axis
        let mut points = Vec::new();
        for i in 0..10 {
            points.push(Vector3::new(1.0, 0.0, i as f64 * 10.0));
            points.push(Vector3::new(-1.0, 0.0, i as f64 * 10.0));
        }
        let mut line = LinePattern::new();

        let chi2 = line.fit_from_points(&points, &[]).unwrap();

        // Mean squared residual is 1, normalized by 20 points
        assert_relative_eq!(chi2, 1.0 / 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(line.direction().normalize().z.abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_rejects_degenerate_input() {
        let mut line = LinePattern::new();
        let p = Vector3::new(1.0, 1.0, 1.0);

        assert!(matches!(
            line.fit_from_points(&[p], &[]),
            Err(PatternError::TooFewPoints { needed: 2, got: 1 })
        ));
        assert!(line.fit_from_points(&[p, p * 2.0], &[0.0, 0.0]).is_err());
        assert!(line.fit_from_points(&[p, p * 2.0], &[1.0]).is_err());
    }

    #[test]
    fn test_smallest_cubic_root_branches() {
        // (x - 1)(x - 2)(x - 3): three real roots
        assert_relative_eq!(smallest_cubic_root(-6.0, 11.0, -6.0), 1.0, epsilon = 1e-9);
        // (x + 2)(x^2 + 1): one real root via Cardano with a negative radicand
        assert_relative_eq!(smallest_cubic_root(2.0, 1.0, 2.0), -2.0, epsilon = 1e-9);
        // x^3: triple root
        assert_abs_diff_eq!(smallest_cubic_root(0.0, 0.0, 0.0), 0.0);
    }
}
