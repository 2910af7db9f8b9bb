//! Tracks, transient clusters, and the per-event output container.

use crate::hit::Hit;
use crate::pattern::{LinePattern, Pattern, PatternKind, TrackPattern};
use crate::vertex::Vertex;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A disjoint set of hits explained by one fitted pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Emission order within the event, starting at 0
    pub id: usize,

    /// Inlier hits with their original ids
    pub hits: Vec<Hit>,

    /// Pattern refined on the inliers
    pub pattern: Pattern,

    /// Candidate that selected the inliers, before refinement
    pub candidate: Pattern,

    /// Reconstructed interaction point, set by the vertex finder
    pub vertex: Option<Vector3<f64>>,
}

impl Track {
    /// Builds a track whose candidate and fitted pattern coincide.
    pub fn new(id: usize, hits: Vec<Hit>, pattern: Pattern) -> Self {
        Self {
            id,
            hits,
            candidate: pattern.clone(),
            pattern,
            vertex: None,
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.pattern.kind()
    }

    pub fn parameters(&self) -> &[f64] {
        self.pattern.parameters()
    }

    pub fn chi2(&self) -> f64 {
        self.pattern.chi2()
    }

    pub fn n_free(&self) -> usize {
        self.pattern.n_free()
    }

    /// The fitted line, if this is a line track.
    pub fn line(&self) -> Option<&LinePattern> {
        self.pattern.as_line()
    }

    pub fn hit_ids(&self) -> Vec<usize> {
        self.hits.iter().map(Hit::id).collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn total_charge(&self) -> f64 {
        self.hits.iter().map(Hit::charge).sum()
    }
}

/// Inliers claimed by one candidate during extraction.
#[derive(Debug, Clone)]
pub(crate) struct Cluster {
    /// Indices into the event hit slice
    pub indices: Vec<usize>,

    /// Estimator badness of the candidate
    pub strength: f64,

    /// Chi-squared of the refined fit
    pub chi2: f64,

    pub candidate: Pattern,
    pub pattern: Pattern,
}

impl Cluster {
    pub fn new(indices: Vec<usize>, candidate: &Pattern, strength: f64) -> Self {
        Self {
            indices,
            strength,
            chi2: f64::NAN,
            candidate: candidate.clone(),
            pattern: candidate.clone(),
        }
    }

    /// Refits the pattern on the cluster hits. A degenerate refit keeps the
    /// candidate parameters and its estimator badness.
    pub fn refine(&mut self, hits: &[Hit], charge_threshold: Option<f64>) {
        match self.pattern.fit_hits(hits, charge_threshold) {
            Ok(chi2) => self.chi2 = chi2,
            Err(err) => {
                warn!("Refit of {}-hit cluster failed, keeping candidate: {}", hits.len(), err);
                self.chi2 = self.strength;
                self.pattern.set_chi2(self.strength);
            }
        }
    }

    pub fn into_track(self, id: usize, hits: Vec<Hit>) -> Track {
        Track {
            id,
            hits,
            pattern: self.pattern,
            candidate: self.candidate,
            vertex: None,
        }
    }
}

/// Everything reconstructed from one event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternEvent {
    pub tracks: Vec<Track>,
    pub vertices: Vec<Vertex>,
}

impl PatternEvent {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Hits claimed by any track.
    pub fn assigned_hits(&self) -> usize {
        self.tracks.iter().map(Track::len).sum()
    }

    pub fn track(&self, id: usize) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }
}
