//! The "CONSENSUS" Engine - Randomized Track Extraction
//!
//! Finds disjoint tracks in a hit cloud with a sample-consensus loop:
//! 1. Sampling: draw minimal seeds and define candidate patterns
//! 2. Scoring: rate every candidate against the full cloud
//! 3. Ranking: order the retained candidates by ascending badness
//! 4. Extracting: carve each candidate's inliers out of the remaining pool,
//!    refit them, and emit one track per surviving cluster
//!
//! Each iteration runs on its own RNG seeded from the engine RNG, so a run
//! is reproducible for a fixed seed whether or not the `parallel` feature
//! spreads iterations over threads.

use crate::config::ConsensusConfig;
use crate::error::ConfigError;
use crate::estimator::{Estimator, Evaluation};
use crate::hit::{Event, Hit};
use crate::pattern::{Pattern, PatternKind, TrackPattern};
use crate::sampling::HitSampler;
use crate::track::{Cluster, PatternEvent, Track};
use crate::vertex::{VertexFinder, VertexMode};
use nalgebra::Vector3;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Progress of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusStage {
    Idle,
    Sampling,
    Scoring,
    Ranking,
    Extracting,
    Done,
}

/// A scored candidate kept for ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pattern: Pattern,
    pub evaluation: Evaluation,
}

// ============================================================================
// SAMPLE CONSENSUS
// ============================================================================

pub struct SampleConsensus {
    config: ConsensusConfig,
    estimator: Box<dyn Estimator>,
    rng: ChaCha8Rng,
    stage: ConsensusStage,
}

impl SampleConsensus {
    /// Validates `config` and seeds the engine RNG from `config.seed`.
    pub fn new(config: ConsensusConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            estimator: config.estimator.build(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            stage: ConsensusStage::Idle,
        })
    }

    /// Engine with all defaults.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(ConsensusConfig::default())
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn stage(&self) -> ConsensusStage {
        self.stage
    }

    /// Fits an event. Events flagged bad by upstream produce no tracks.
    pub fn solve_event(&mut self, event: &Event) -> PatternEvent {
        if !event.is_good {
            debug!("Event {} flagged bad, skipping", event.id);
            self.stage = ConsensusStage::Done;
            return PatternEvent::default();
        }
        debug!("Event {}: {} hits", event.id, event.len());
        self.solve(event.hits())
    }

    /// Extracts disjoint tracks from `hits` and, if configured, their vertices.
    pub fn solve(&mut self, hits: &[Hit]) -> PatternEvent {
        self.stage = ConsensusStage::Idle;

        let needed = self
            .config
            .min_inliers
            .max(self.config.pattern.num_points_to_define());
        if hits.len() < needed {
            debug!("{} hits is below the {} needed, no tracks", hits.len(), needed);
            self.stage = ConsensusStage::Done;
            return PatternEvent::default();
        }

        let candidates = self.generate_candidates(hits);

        self.stage = ConsensusStage::Ranking;
        let ranked = rank_candidates(candidates);

        self.stage = ConsensusStage::Extracting;
        let tracks = self.extract_tracks(hits, &ranked);

        let mut event = PatternEvent {
            tracks,
            vertices: Vec::new(),
        };
        if self.config.vertex.mode != VertexMode::Off {
            VertexFinder::new(self.config.vertex.clone()).apply(&mut event);
        }

        self.stage = ConsensusStage::Done;
        event
    }

    // ========================================================================
    // SAMPLING & SCORING
    // ========================================================================

    /// Runs the configured number of iterations and keeps every candidate
    /// with more than `min_inliers` inliers, in iteration order.
    pub fn generate_candidates(&mut self, hits: &[Hit]) -> Vec<Candidate> {
        let seeds: Vec<u64> = (0..self.config.iterations)
            .map(|_| self.rng.next_u64())
            .collect();

        let sampler = self
            .config
            .sample_method
            .build(hits, self.config.gaussian_sigma);
        let kind = self.config.pattern;

        self.stage = ConsensusStage::Sampling;
        let defined: Vec<Pattern> = filter_map_iterations(seeds, |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            define_candidate(sampler.as_ref(), hits, kind, &mut rng)
        });

        self.stage = ConsensusStage::Scoring;
        let estimator = self.estimator.as_ref();
        let threshold = self.config.distance_threshold;
        let min_inliers = self.config.min_inliers;
        let candidates: Vec<Candidate> = filter_map_iterations(defined, |mut pattern| {
            let evaluation = estimator.score(&mut pattern, hits, threshold);
            (evaluation.inliers > min_inliers).then_some(Candidate {
                pattern,
                evaluation,
            })
        });

        debug!(
            "{} of {} iterations retained ({} on {} hits, {} sampling)",
            candidates.len(),
            self.config.iterations,
            self.config.estimator,
            hits.len(),
            self.config.sample_method
        );
        candidates
    }

    // ========================================================================
    // EXTRACTION
    // ========================================================================

    /// Greedily assigns hits to candidates, best first. Assigned hits leave
    /// the pool whether or not their cluster becomes a track.
    fn extract_tracks(&self, hits: &[Hit], ranked: &[Candidate]) -> Vec<Track> {
        let threshold_sq = self.config.distance_threshold.powi(2);
        let min_inliers = self.config.min_inliers;
        let charge_threshold = self.config.fit_charge_threshold();

        let mut remaining = vec![true; hits.len()];
        let mut remaining_count = hits.len();
        let mut tracks = Vec::new();

        for candidate in ranked {
            if remaining_count < min_inliers {
                debug!("{} hits left, stopping extraction", remaining_count);
                break;
            }

            let indices: Vec<usize> = (0..hits.len())
                .filter(|&i| {
                    remaining[i]
                        && candidate.pattern.distance_to(hits[i].position()).powi(2) < threshold_sq
                })
                .collect();
            for &i in &indices {
                remaining[i] = false;
            }
            remaining_count -= indices.len();

            if indices.len() <= min_inliers {
                continue;
            }

            let mut cluster =
                Cluster::new(indices, &candidate.pattern, candidate.evaluation.badness);
            let cluster_hits: Vec<Hit> = cluster.indices.iter().map(|&i| hits[i]).collect();
            cluster.refine(&cluster_hits, charge_threshold);
            debug!(
                "Track {}: {} hits, strength {:.4}, chi2 {:.4}",
                tracks.len(),
                cluster_hits.len(),
                cluster.strength,
                cluster.chi2
            );
            tracks.push(cluster.into_track(tracks.len(), cluster_hits));
        }
        tracks
    }
}

/// Samples a seed set and defines a candidate, `None` if degenerate.
fn define_candidate(
    sampler: &dyn HitSampler,
    hits: &[Hit],
    kind: PatternKind,
    rng: &mut ChaCha8Rng,
) -> Option<Pattern> {
    let indices = sampler.sample(rng, kind.num_points_to_define())?;
    let points: Vec<Vector3<f64>> = indices.iter().map(|&i| *hits[i].position()).collect();

    let mut pattern = Pattern::new(kind);
    pattern.define_from_points(&points).ok()?;
    Some(pattern)
}

/// Stable ascending sort by badness; non-finite scores are dropped.
pub fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.retain(|c| c.evaluation.badness.is_finite());
    candidates.sort_by(|a, b| a.evaluation.badness.total_cmp(&b.evaluation.badness));
    candidates
}

#[cfg(feature = "parallel")]
fn filter_map_iterations<T, U, F>(items: Vec<T>, f: F) -> Vec<U>
where
    T: Send,
    U: Send,
    F: Fn(T) -> Option<U> + Sync + Send,
{
    items.into_par_iter().filter_map(f).collect()
}

#[cfg(not(feature = "parallel"))]
fn filter_map_iterations<T, U, F>(items: Vec<T>, f: F) -> Vec<U>
where
    F: Fn(T) -> Option<U>,
{
    items.into_iter().filter_map(f).collect()
}

// ============================================================================
// TESTS
// ============================================================================
