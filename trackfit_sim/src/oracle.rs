//! Ground truth oracle for synthetic events.
//!
//! The Oracle keeps the "God's eye view" of a simulated TPC readout:
//! - True track shapes and the hits each one produced
//! - Hit generation with clamped Gaussian jitter
//! - Uniform low-charge noise hits

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use trackfit_core::{Event, PatternKind};

/// Geometry a ground truth track was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TruthShape {
    /// Hits at `start + step * i`
    Line { start: Vector3<f64>, step: Vector3<f64> },

    /// Hits evenly spaced in azimuth, z uniform over the drift range
    Circle { center: [f64; 2], radius: f64 },
}

impl TruthShape {
    pub fn kind(&self) -> PatternKind {
        match self {
            TruthShape::Line { .. } => PatternKind::Line,
            TruthShape::Circle { .. } => PatternKind::Circle2D,
        }
    }
}

/// A generated track and the hits it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthTrack {
    /// Unique track ID within the event
    pub id: u64,

    pub shape: TruthShape,

    /// Ids of the hits this track produced, ascending
    pub hit_ids: Vec<usize>,
}

impl GroundTruthTrack {
    pub fn len(&self) -> usize {
        self.hit_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hit_ids.is_empty()
    }

    /// Number of `ids` produced by this track.
    pub fn shared_hits(&self, ids: &[usize]) -> usize {
        ids.iter()
            .filter(|id| self.hit_ids.binary_search(id).is_ok())
            .count()
    }
}

/// The Oracle - builds one labelled event from a seed.
pub struct Oracle {
    /// Master seed for this event
    seed: u64,

    /// RNG for jitter, charges, and noise
    rng: ChaCha8Rng,

    /// Event under construction
    event: Event,

    /// Tracks spawned so far
    truth: Vec<GroundTruthTrack>,

    /// Ids of hits that belong to no track
    noise_ids: Vec<usize>,

    /// Per-axis jitter standard deviation
    position_noise_std: f64,

    /// Per-axis jitter clamp
    max_jitter: f64,

    /// Drift range for circle hits
    drift_range: Range<f64>,
}

impl Oracle {
    /// Creates an Oracle for event `event_id` with 0.25 jitter clamped at 0.55.
    pub fn new(seed: u64, event_id: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            event: Event::new(event_id),
            truth: Vec::new(),
            noise_ids: Vec::new(),
            position_noise_std: 0.25,
            max_jitter: 0.55,
            drift_range: 0.0..1000.0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Sets the jitter standard deviation and per-axis clamp.
    pub fn set_position_noise(&mut self, std_dev: f64, max_jitter: f64) {
        self.position_noise_std = std_dev.abs();
        self.max_jitter = max_jitter.abs();
    }

    /// Spawns a line track of `count` hits and returns its ID.
    pub fn spawn_line(
        &mut self,
        start: Vector3<f64>,
        step: Vector3<f64>,
        count: usize,
        charge: Range<f64>,
    ) -> u64 {
        let hit_ids = (0..count)
            .map(|i| {
                let position = start + step * i as f64 + self.jitter();
                let charge = self.draw(&charge);
                self.event.add_hit(position, charge).id()
            })
            .collect();
        self.push_truth(TruthShape::Line { start, step }, hit_ids)
    }

    /// Spawns a circle in the pad plane and returns its ID.
    pub fn spawn_circle(
        &mut self,
        center: [f64; 2],
        radius: f64,
        count: usize,
        charge: Range<f64>,
    ) -> u64 {
        let drift = self.drift_range.clone();
        let hit_ids = (0..count)
            .map(|i| {
                let phi = i as f64 * std::f64::consts::TAU / count as f64;
                let offset = self.jitter();
                let position = Vector3::new(
                    center[0] + radius * phi.cos() + offset.x,
                    center[1] + radius * phi.sin() + offset.y,
                    self.draw(&drift),
                );
                let charge = self.draw(&charge);
                self.event.add_hit(position, charge).id()
            })
            .collect();
        self.push_truth(TruthShape::Circle { center, radius }, hit_ids)
    }

    /// Adds `count` hits uniform in the box spanned by `min` and `max`.
    pub fn spawn_noise(
        &mut self,
        count: usize,
        min: Vector3<f64>,
        max: Vector3<f64>,
        charge: Range<f64>,
    ) {
        for _ in 0..count {
            let position = Vector3::new(
                self.draw(&(min.x..max.x)),
                self.draw(&(min.y..max.y)),
                self.draw(&(min.z..max.z)),
            );
            let charge = self.draw(&charge);
            let id = self.event.add_hit(position, charge).id();
            self.noise_ids.push(id);
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn truth(&self) -> &[GroundTruthTrack] {
        &self.truth
    }

    pub fn noise_ids(&self) -> &[usize] {
        &self.noise_ids
    }

    pub fn into_parts(self) -> (Event, Vec<GroundTruthTrack>) {
        (self.event, self.truth)
    }

    fn push_truth(&mut self, shape: TruthShape, hit_ids: Vec<usize>) -> u64 {
        let id = self.truth.len() as u64;
        self.truth.push(GroundTruthTrack { id, shape, hit_ids });
        id
    }

    fn jitter(&mut self) -> Vector3<f64> {
        let (std_dev, max) = (self.position_noise_std, self.max_jitter);
        Vector3::from_fn(|_, _| {
            let z: f64 = self.rng.sample(StandardNormal);
            (z * std_dev).clamp(-max, max)
        })
    }

    /// Uniform draw that tolerates an empty range.
    fn draw(&mut self, range: &Range<f64>) -> f64 {
        if range.start < range.end {
            self.rng.gen_range(range.clone())
        } else {
            range.start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackfit_core::TrackPattern;
    use trackfit_core::LinePattern;

    #[test]
    fn test_oracle_spawn_line() {
        let mut oracle = Oracle::new(42, 7);

        let id = oracle.spawn_line(
            Vector3::new(0.0, 0.0, 100.0),
            Vector3::new(1.0, 0.0, 2.0),
            30,
            80.0..200.0,
        );

        let track = &oracle.truth()[id as usize];
        assert_eq!(track.len(), 30);
        assert_eq!(track.hit_ids, (0..30).collect::<Vec<_>>());
        assert_eq!(track.shape.kind(), PatternKind::Line);
        assert_eq!(oracle.event().id, 7);
    }

    #[test]
    fn test_oracle_jitter_is_clamped() {
        let mut oracle = Oracle::new(42, 0);
        oracle.set_position_noise(5.0, 0.5);
        let (start, step) = (Vector3::new(0.0, 0.0, 100.0), Vector3::new(1.0, 1.0, 1.0));
        oracle.spawn_line(start, step, 100, 100.0..100.0);

        let line = LinePattern::from_point_direction(start, step);
        for hit in oracle.event().hits() {
            // Each axis moves at most 0.5, so the hit stays within sqrt(3) * 0.5
            assert!(line.distance_to(hit.position()) <= 0.75_f64.sqrt() + 1e-9);
            assert_eq!(hit.charge(), 100.0);
        }
    }

    #[test]
    fn test_oracle_noise_within_bounds() {
        let mut oracle = Oracle::new(3, 0);
        let (min, max) = (Vector3::new(-10.0, -20.0, 0.0), Vector3::new(10.0, 20.0, 50.0));

        oracle.spawn_noise(200, min, max, 1.0..20.0);

        assert_eq!(oracle.noise_ids().len(), 200);
        assert!(oracle.truth().is_empty());
        for hit in oracle.event().hits() {
            let p = hit.position();
            assert!(p.x >= min.x && p.x < max.x);
            assert!(p.y >= min.y && p.y < max.y);
            assert!(p.z >= min.z && p.z < max.z);
            assert!((1.0..20.0).contains(&hit.charge()));
        }
    }

    #[test]
    fn test_oracle_circle_hits_on_radius() {
        let mut oracle = Oracle::new(11, 0);
        oracle.spawn_circle([10.0, -20.0], 50.0, 40, 100.0..150.0);

        for hit in oracle.event().hits() {
            let p = hit.position();
            let r = ((p.x - 10.0).powi(2) + (p.y + 20.0).powi(2)).sqrt();
            assert!((r - 50.0).abs() < 0.8);
        }
    }

    #[test]
    fn test_oracle_deterministic_hits() {
        let build = || {
            let mut oracle = Oracle::new(42, 0);
            oracle.spawn_line(Vector3::zeros(), Vector3::new(0.0, 1.0, 1.0), 10, 50.0..60.0);
            oracle.spawn_noise(5, Vector3::zeros(), Vector3::repeat(100.0), 1.0..2.0);
            oracle.into_parts().0
        };

        // Same seed = same hits
        assert_eq!(build().hits(), build().hits());
    }

    #[test]
    fn test_shared_hits() {
        let track = GroundTruthTrack {
            id: 0,
            shape: TruthShape::Circle { center: [0.0, 0.0], radius: 1.0 },
            hit_ids: vec![2, 4, 6, 8],
        };
        assert_eq!(track.shared_hits(&[1, 2, 3, 4, 9]), 2);
        assert_eq!(track.shared_hits(&[]), 0);
    }
}
