//! Scenario runner - builds synthetic events and grades the reconstruction.

use crate::error::SimError;
use crate::oracle::{GroundTruthTrack, Oracle, TruthShape};
use crate::scenarios::ScenarioId;

use nalgebra::Vector3;
use serde::Serialize;
use tracing::{debug, info, warn};
use trackfit_core::vertex::angle_deg;
use trackfit_core::{
    ConsensusConfig, EstimatorKind, Event, Pattern, PatternEvent, PatternKind, SampleConsensus,
    SampleMethod, VertexMode,
};

/// Smallest fraction of a true track's hits the matched track must hold.
const MIN_EFFICIENCY: f64 = 0.9;

/// Smallest fraction of a matched track's hits that must come from its true track.
const MIN_PURITY: f64 = 0.9;

/// Largest accepted angle between a fitted and a true line, in degrees.
const MAX_DIRECTION_ERROR_DEG: f64 = 2.0;

/// Largest accepted center or radius deviation of a fitted circle.
const MAX_CIRCLE_ERROR: f64 = 1.0;

/// Largest accepted distance between the true and nearest reconstructed vertex.
const MAX_VERTEX_ERROR: f64 = 3.0;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Generated event
    pub event: Event,

    /// Tracks the oracle generated
    pub truth: Vec<GroundTruthTrack>,

    /// Engine output
    pub output: PatternEvent,
}

/// Reconstruction quality against ground truth.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Hits in the event
    pub hits: usize,

    /// Hits produced by no track
    pub noise_hits: usize,

    pub tracks_expected: usize,
    pub tracks_found: usize,

    /// Hits claimed by any reconstructed track
    pub assigned_hits: usize,

    /// Worst shared-hit fraction over the true tracks (1.0 when there are none)
    pub min_efficiency: f64,

    /// Worst purity of the best-matching tracks (1.0 when there are none)
    pub min_purity: f64,

    pub vertices_found: usize,

    /// Distance from the true vertex to the nearest reconstructed one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex_error: Option<f64>,

    /// Worst angle between a matched line fit and its true direction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_direction_error_deg: Option<f64>,

    /// Worst center or radius deviation of a matched circle fit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_circle_error: Option<f64>,
}

impl ScenarioMetrics {
    /// Matches every true track to the reconstructed track sharing the most
    /// hits with it and records the worst match.
    pub fn measure(
        event: &Event,
        truth: &[GroundTruthTrack],
        output: &PatternEvent,
        expected_vertex: Option<Vector3<f64>>,
    ) -> Self {
        let track_hits: usize = truth.iter().map(GroundTruthTrack::len).sum();
        let mut metrics = Self {
            hits: event.len(),
            noise_hits: event.len().saturating_sub(track_hits),
            tracks_expected: truth.len(),
            tracks_found: output.tracks.len(),
            assigned_hits: output.assigned_hits(),
            min_efficiency: 1.0,
            min_purity: 1.0,
            vertices_found: output.vertices.len(),
            ..Default::default()
        };

        for true_track in truth {
            let best = output
                .tracks
                .iter()
                .map(|track| (track, true_track.shared_hits(&track.hit_ids())))
                .filter(|(_, shared)| *shared > 0)
                .max_by_key(|(_, shared)| *shared);

            let Some((found, shared)) = best else {
                metrics.min_efficiency = 0.0;
                metrics.min_purity = 0.0;
                continue;
            };

            let efficiency = shared as f64 / true_track.len() as f64;
            let purity = shared as f64 / found.len() as f64;
            metrics.min_efficiency = metrics.min_efficiency.min(efficiency);
            metrics.min_purity = metrics.min_purity.min(purity);

            match (&true_track.shape, &found.pattern) {
                (TruthShape::Line { step, .. }, Pattern::Line(line)) => {
                    let angle = angle_deg(step, &line.direction());
                    let error = angle.min(180.0 - angle);
                    metrics.max_direction_error_deg =
                        Some(metrics.max_direction_error_deg.map_or(error, |e| e.max(error)));
                }
                (TruthShape::Circle { center, radius }, Pattern::Circle2D(circle)) => {
                    let fitted = circle.center();
                    let error = (fitted.x - center[0])
                        .hypot(fitted.y - center[1])
                        .max((circle.radius() - radius).abs());
                    metrics.max_circle_error =
                        Some(metrics.max_circle_error.map_or(error, |e| e.max(error)));
                }
                _ => {}
            }
        }

        metrics.vertex_error = expected_vertex.and_then(|truth| {
            output
                .vertices
                .iter()
                .map(|vertex| (vertex.position - truth).norm())
                .min_by(f64::total_cmp)
        });
        metrics
    }
}

/// What a scenario asks of the engine.
struct ScenarioSetup {
    pattern: PatternKind,

    /// True interaction point, if the scenario has one
    vertex: Option<Vector3<f64>>,
}

impl ScenarioSetup {
    fn lines() -> Self {
        Self {
            pattern: PatternKind::Line,
            vertex: None,
        }
    }
}

/// Runs synthetic scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Engine settings shared by every scenario
    config: ConsensusConfig,
}

impl ScenarioRunner {
    /// Creates a runner with RANSAC, uniform sampling, 500 iterations,
    /// a minimum of 20 inliers, and a distance threshold of 2.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: Self::default_config(),
        }
    }

    pub fn default_config() -> ConsensusConfig {
        ConsensusConfig::default()
            .with_estimator(EstimatorKind::Ransac)
            .with_sample_method(SampleMethod::Uniform)
            .with_iterations(500)
            .with_min_inliers(20)
            .with_distance_threshold(2.0)
    }

    /// Replaces the engine settings. The seed, pattern, and vertex mode are
    /// still chosen per scenario.
    pub fn with_config(mut self, config: ConsensusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.config.iterations = iterations;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorKind) -> Self {
        self.config.estimator = estimator;
        self
    }

    pub fn with_sample_method(mut self, sample_method: SampleMethod) -> Self {
        self.config.sample_method = sample_method;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        // Keep event generation independent of the engine's sampling stream
        let physics_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut oracle = Oracle::new(physics_seed, self.seed);
        let setup = populate(scenario, &mut oracle);
        let (event, truth) = oracle.into_parts();

        let vertex_mode = if setup.vertex.is_some() {
            VertexMode::PairwiseBest
        } else {
            VertexMode::Off
        };
        let config = self
            .config
            .clone()
            .with_seed(self.seed)
            .with_pattern(setup.pattern)
            .with_vertex_mode(vertex_mode);

        let output = match SampleConsensus::new(config) {
            Ok(mut engine) => engine.solve_event(&event),
            Err(err) => {
                let err = SimError::from(err);
                warn!("Scenario {} could not start: {}", scenario.name(), err);
                return ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    failure_reason: Some(err.to_string()),
                    metrics: ScenarioMetrics::default(),
                    event,
                    truth,
                    output: PatternEvent::default(),
                };
            }
        };

        let metrics = ScenarioMetrics::measure(&event, &truth, &output, setup.vertex);
        debug!(
            "  {} hits | tracks {}/{} | efficiency {:.2} | purity {:.2} | vertices {}",
            metrics.hits,
            metrics.tracks_found,
            metrics.tracks_expected,
            metrics.min_efficiency,
            metrics.min_purity,
            metrics.vertices_found
        );

        let failure_reason = check(scenario, &metrics);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            failure_reason,
            metrics,
            event,
            truth,
            output,
        }
    }
}

// ============================================================================
// EVENT RECIPES
// ============================================================================

fn populate(scenario: ScenarioId, oracle: &mut Oracle) -> ScenarioSetup {
    match scenario {
        ScenarioId::TwoTracks => populate_two_tracks(oracle),
        ScenarioId::FourTracks => populate_four_tracks(oracle),
        ScenarioId::VertexPair => populate_vertex_pair(oracle),
        ScenarioId::NoiseOnly => {
            spawn_noise(oracle, 60, 250.0);
            ScenarioSetup::lines()
        }
        ScenarioId::EmptyEvent => ScenarioSetup::lines(),
        ScenarioId::Circle => populate_circle(oracle),
    }
}

/// Low-charge hits over the full drift range, `half_width` around the z axis.
fn spawn_noise(oracle: &mut Oracle, count: usize, half_width: f64) {
    oracle.spawn_noise(
        count,
        Vector3::new(-half_width, -half_width, 0.0),
        Vector3::new(half_width, half_width, 1000.0),
        1.0..20.0,
    );
}

/// Two separated lines crossing the drift volume.
fn populate_two_tracks(oracle: &mut Oracle) -> ScenarioSetup {
    oracle.spawn_line(
        Vector3::new(-120.0, -80.0, 150.0),
        Vector3::new(0.8, 0.6, 2.5),
        50,
        80.0..200.0,
    );
    oracle.spawn_line(
        Vector3::new(90.0, 110.0, 400.0),
        Vector3::new(-0.4, 1.0, 3.0),
        50,
        80.0..200.0,
    );
    spawn_noise(oracle, 20, 250.0);
    ScenarioSetup::lines()
}

/// Four parallel lines spaced along x.
fn populate_four_tracks(oracle: &mut Oracle) -> ScenarioSetup {
    for x in [-90.0, -30.0, 30.0, 90.0] {
        oracle.spawn_line(
            Vector3::new(x, -80.0, 100.0),
            Vector3::new(0.2, 1.0, 4.0),
            40,
            80.0..200.0,
        );
    }
    spawn_noise(oracle, 40, 150.0);
    ScenarioSetup::lines()
}

/// Two lines leaving a common point near the beam axis.
fn populate_vertex_pair(oracle: &mut Oracle) -> ScenarioSetup {
    let vertex = Vector3::new(4.0, -3.0, 480.0);
    for step in [Vector3::new(1.0, 0.6, 2.4), Vector3::new(-0.9, 0.8, -2.2)] {
        oracle.spawn_line(vertex + step, step, 50, 80.0..200.0);
    }
    spawn_noise(oracle, 20, 250.0);
    ScenarioSetup {
        pattern: PatternKind::Line,
        vertex: Some(vertex),
    }
}

/// One circle in the pad plane, spread along z.
fn populate_circle(oracle: &mut Oracle) -> ScenarioSetup {
    oracle.set_position_noise(0.2, 0.55);
    oracle.spawn_circle([10.0, -20.0], 50.0, 60, 100.0..150.0);
    spawn_noise(oracle, 20, 150.0);
    ScenarioSetup {
        pattern: PatternKind::Circle2D,
        vertex: None,
    }
}

// ============================================================================
// PASS CRITERIA
// ============================================================================

/// Returns the first failed criterion, or `None` if the scenario passed.
fn check(scenario: ScenarioId, metrics: &ScenarioMetrics) -> Option<String> {
    match scenario {
        ScenarioId::TwoTracks | ScenarioId::FourTracks => {
            check_track_count(metrics).or_else(|| check_matching(metrics))
        }
        ScenarioId::VertexPair => check_track_count(metrics)
            .or_else(|| check_matching(metrics))
            .or_else(|| match metrics.vertex_error {
                Some(error) if error < MAX_VERTEX_ERROR => None,
                Some(error) => Some(format!(
                    "Vertex error {:.2} exceeds threshold {:.1}",
                    error, MAX_VERTEX_ERROR
                )),
                None => Some("No vertex reconstructed".to_string()),
            }),
        ScenarioId::NoiseOnly => check_track_count(metrics),
        ScenarioId::EmptyEvent => check_track_count(metrics).or_else(|| {
            (metrics.vertices_found > 0)
                .then(|| format!("{} vertices from an empty event", metrics.vertices_found))
        }),
        ScenarioId::Circle => check_track_count(metrics)
            .or_else(|| check_matching(metrics))
            .or_else(|| match metrics.max_circle_error {
                Some(error) if error < MAX_CIRCLE_ERROR => None,
                Some(error) => Some(format!(
                    "Circle error {:.2} exceeds threshold {:.1}",
                    error, MAX_CIRCLE_ERROR
                )),
                None => Some("No circle fit matched".to_string()),
            }),
    }
}

fn check_track_count(metrics: &ScenarioMetrics) -> Option<String> {
    (metrics.tracks_found != metrics.tracks_expected).then(|| {
        format!(
            "Found {} tracks, expected {}",
            metrics.tracks_found, metrics.tracks_expected
        )
    })
}

fn check_matching(metrics: &ScenarioMetrics) -> Option<String> {
    if metrics.min_efficiency < MIN_EFFICIENCY {
        return Some(format!(
            "Efficiency {:.2} below {:.2}",
            metrics.min_efficiency, MIN_EFFICIENCY
        ));
    }
    if metrics.min_purity < MIN_PURITY {
        return Some(format!(
            "Purity {:.2} below {:.2}",
            metrics.min_purity, MIN_PURITY
        ));
    }
    match metrics.max_direction_error_deg {
        Some(error) if error >= MAX_DIRECTION_ERROR_DEG => Some(format!(
            "Direction error {:.2}° exceeds {:.1}°",
            error, MAX_DIRECTION_ERROR_DEG
        )),
        _ => None,
    }
}
