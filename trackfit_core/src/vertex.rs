//! The "VERTEX" Engine - Common Origin of Line Tracks
//!
//! Two reconstruction modes:
//! 1. Pairwise: closest approach of every pair of line tracks, gated by the
//!    line separation and a fiducial cylinder around the beam axis
//! 2. Per-track: closest approach of each track to the beam axis
//!
//! Nearly parallel pairs that miss the fiducial volume fall back to their
//! closest approach to the beam axis.

use crate::config::require_positive;
use crate::error::ConfigError;
use crate::pattern::{LinePattern, TrackPattern};
use crate::track::{PatternEvent, Track};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexMode {
    Off,
    PairwiseBest,
    PerTrack,
}

impl fmt::Display for VertexMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexMode::Off => write!(f, "off"),
            VertexMode::PairwiseBest => write!(f, "pairwise"),
            VertexMode::PerTrack => write!(f, "per_track"),
        }
    }
}

impl FromStr for VertexMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "off" | "none" => Ok(VertexMode::Off),
            "pairwise" | "pairwise_best" => Ok(VertexMode::PairwiseBest),
            "per_track" | "single" => Ok(VertexMode::PerTrack),
            _ => Err(format!("Unknown vertex mode: {}", s)),
        }
    }
}

/// Vertex finder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexConfig {
    /// Reconstruction mode (default: Off)
    pub mode: VertexMode,

    /// Maximum line-to-line separation for a pair vertex (default: 40.0)
    pub line_distance_threshold: f64,

    /// Fiducial drift range, inclusive (default: 0.0 to 1000.0)
    pub z_min: f64,
    pub z_max: f64,

    /// Fiducial radius around the z axis (default: 25.0)
    pub max_radius: f64,

    /// Point on the beam axis (default: [0, 0, 500])
    pub beam_point: [f64; 3],

    /// Beam axis direction (default: +z)
    pub beam_direction: [f64; 3],

    /// Pairs within this many degrees of parallel may use the beam
    /// fallback (default: 10.0)
    pub parallel_angle_deg: f64,

    /// Maximum number of tracks reported with a vertex (default: 5)
    pub max_tracks: usize,
}

impl Default for VertexConfig {
    fn default() -> Self {
        Self {
            mode: VertexMode::Off,
            line_distance_threshold: 40.0,
            z_min: 0.0,
            z_max: 1000.0,
            max_radius: 25.0,
            beam_point: [0.0, 0.0, 500.0],
            beam_direction: [0.0, 0.0, 1.0],
            parallel_angle_deg: 10.0,
            max_tracks: 5,
        }
    }
}

impl VertexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("line_distance_threshold", self.line_distance_threshold)?;
        require_positive("max_radius", self.max_radius)?;
        require_positive("z_max - z_min", self.z_max - self.z_min)?;
        require_positive("beam_direction", Vector3::from(self.beam_direction).norm())?;
        if !(0.0..=90.0).contains(&self.parallel_angle_deg) {
            return Err(ConfigError::InvalidParameter {
                name: "parallel_angle_deg",
                value: self.parallel_angle_deg,
            });
        }
        Ok(())
    }

    fn beam_axis(&self) -> LinePattern {
        LinePattern::from_point_direction(
            Vector3::from(self.beam_point),
            Vector3::from(self.beam_direction),
        )
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// A reconstructed interaction point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vector3<f64>,

    /// Tracks that produced this vertex
    pub track_ids: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VertexReport {
    pub vertices: Vec<Vertex>,

    /// Tracks that received a vertex, in assignment order, capped at
    /// `max_tracks`
    pub tracks: Vec<Track>,
}

impl VertexReport {
    /// Removes ids of tracks cut by the cap, then vertices left without tracks.
    fn drop_uncapped_tracks(&mut self) {
        let kept: Vec<usize> = self.tracks.iter().map(|t| t.id).collect();
        self.vertices.retain_mut(|vertex| {
            vertex.track_ids.retain(|id| kept.contains(id));
            !vertex.track_ids.is_empty()
        });
    }
}

// ============================================================================
// LINE GEOMETRY
// ============================================================================

/// Midpoint of the closest approach between two lines, `None` when they are
/// parallel or a direction is zero.
pub fn closest_point_between_lines(
    p1: &Vector3<f64>,
    d1: &Vector3<f64>,
    p2: &Vector3<f64>,
    d2: &Vector3<f64>,
) -> Option<Vector3<f64>> {
    let cross = d1.cross(d2);
    if cross.norm_squared() <= 1e-12 * d1.norm_squared() * d2.norm_squared() {
        return None;
    }

    let n1 = d1.cross(&d2.cross(d1));
    let n2 = d2.cross(&cross);

    let c1 = p1 + d1 * ((p2 - p1).dot(&n2) / d1.dot(&n2));
    let c2 = p2 + d2 * ((p1 - p2).dot(&n1) / d2.dot(&n1));
    Some((c1 + c2) / 2.0)
}

/// Shortest distance between two lines.
pub fn line_separation(
    p1: &Vector3<f64>,
    d1: &Vector3<f64>,
    p2: &Vector3<f64>,
    d2: &Vector3<f64>,
) -> f64 {
    let normal = d1.cross(d2);
    let normal_norm = normal.norm();
    if normal_norm <= 1e-6 * d1.norm() * d2.norm() {
        return LinePattern::from_point_direction(*p1, *d1).distance_to(p2);
    }
    normal.dot(&(p1 - p2)).abs() / normal_norm
}

/// Angle between two directions in degrees, in [0, 180].
pub fn angle_deg(d1: &Vector3<f64>, d2: &Vector3<f64>) -> f64 {
    let cosine = d1.dot(d2) / (d1.norm() * d2.norm());
    cosine.clamp(-1.0, 1.0).acos().to_degrees()
}

// ============================================================================
// VERTEX FINDER
// ============================================================================

pub struct VertexFinder {
    config: VertexConfig,
    beam: LinePattern,
}

impl VertexFinder {
    pub fn new(config: VertexConfig) -> Self {
        let beam = config.beam_axis();
        Self { config, beam }
    }

    pub fn config(&self) -> &VertexConfig {
        &self.config
    }

    /// Reconstructs vertices from the line tracks in `tracks`.
    pub fn find(&self, tracks: &[Track]) -> VertexReport {
        let lines: Vec<(&Track, &LinePattern)> = tracks
            .iter()
            .filter_map(|track| track.line().map(|line| (track, line)))
            .collect();

        let mut report = match self.config.mode {
            VertexMode::Off => VertexReport::default(),
            VertexMode::PairwiseBest => self.find_pairwise(&lines),
            VertexMode::PerTrack => self.find_per_track(&lines),
        };
        report.tracks.truncate(self.config.max_tracks);
        report.drop_uncapped_tracks();

        debug!(
            "Vertex finder ({}): {} vertices from {} line tracks",
            self.config.mode,
            report.vertices.len(),
            lines.len()
        );
        report
    }

    /// Runs [`Self::find`] and stores the vertex of each capped track on the
    /// event. Tracks past the cap keep no vertex.
    pub fn apply(&self, event: &mut PatternEvent) {
        let report = self.find(&event.tracks);
        for capped in &report.tracks {
            if let Some(track) = event.tracks.iter_mut().find(|t| t.id == capped.id) {
                track.vertex = capped.vertex;
            }
        }
        event.vertices = report.vertices;
    }

    /// z bounds are inclusive, the radius bound is strict.
    fn in_fiducial_volume(&self, point: &Vector3<f64>) -> bool {
        point.z >= self.config.z_min
            && point.z <= self.config.z_max
            && point.xy().norm() < self.config.max_radius
    }

    /// Midpoint between a track and the beam axis at closest approach.
    fn beam_approach(&self, line: &LinePattern) -> Option<Vector3<f64>> {
        closest_point_between_lines(
            &line.point(),
            &line.direction(),
            &self.beam.point(),
            &self.beam.direction(),
        )
    }

    fn find_pairwise(&self, lines: &[(&Track, &LinePattern)]) -> VertexReport {
        let mut report = VertexReport::default();
        let mut filled = vec![false; lines.len()];
        let threshold = self.config.line_distance_threshold;
        let parallel = self.config.parallel_angle_deg;

        for i in 0..lines.len() {
            for j in (i + 1)..lines.len() {
                // A track joins at most one vertex
                if filled[i] || filled[j] {
                    continue;
                }
                let (track_a, line_a) = lines[i];
                let (track_b, line_b) = lines[j];
                let (p1, d1) = (line_a.point(), line_a.direction());
                let (p2, d2) = (line_b.point(), line_b.direction());

                if line_separation(&p1, &d1, &p2, &d2) >= threshold {
                    continue;
                }

                let crossing = closest_point_between_lines(&p1, &d1, &p2, &d2)
                    .filter(|v| self.in_fiducial_volume(v));
                let position = match crossing {
                    Some(v) => Some(v),
                    None => {
                        let angle = angle_deg(&d1, &d2);
                        if angle < parallel || angle > 180.0 - parallel {
                            self.beam_fallback(line_a, line_b, threshold)
                        } else {
                            None
                        }
                    }
                };

                let Some(position) = position else { continue };
                report.vertices.push(Vertex {
                    position,
                    track_ids: vec![track_a.id, track_b.id],
                });
                for k in [i, j] {
                    filled[k] = true;
                    let mut track = lines[k].0.clone();
                    track.vertex = Some(position);
                    report.tracks.push(track);
                }
            }
        }
        report
    }

    /// Averages both tracks' beam approaches when they agree within twice
    /// the line threshold.
    fn beam_fallback(
        &self,
        a: &LinePattern,
        b: &LinePattern,
        threshold: f64,
    ) -> Option<Vector3<f64>> {
        let va = self.beam_approach(a)?;
        let vb = self.beam_approach(b)?;
        ((va - vb).norm() <= 2.0 * threshold).then(|| (va + vb) / 2.0)
    }

    fn find_per_track(&self, lines: &[(&Track, &LinePattern)]) -> VertexReport {
        let mut report = VertexReport::default();
        let (beam_point, beam_direction) = (self.beam.point(), self.beam.direction());

        for (track, line) in lines {
            let Some(position) = self.beam_approach(line) else { continue };
            let separation =
                line_separation(&line.point(), &line.direction(), &beam_point, &beam_direction);
            if separation >= self.config.line_distance_threshold
                || position.xy().norm() >= self.config.max_radius
            {
                continue;
            }

            report.vertices.push(Vertex {
                position,
                track_ids: vec![track.id],
            });
            let mut track = Track::clone(track);
            track.vertex = Some(position);
            report.tracks.push(track);
        }
        report
    }
}

// ============================================================================
// TESTS
// ============================================================================
