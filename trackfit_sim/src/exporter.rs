//! JSON exporter for offline inspection.
//!
//! Exports every scenario run as hits, ground truth, fitted tracks, and
//! vertices.

use crate::error::SimError;
use crate::oracle::GroundTruthTrack;
use crate::runner::{ScenarioMetrics, ScenarioResult};
use nalgebra::Vector3;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use trackfit_core::{ConsensusConfig, Hit, Track, Vertex};

/// A single hit.
#[derive(Debug, Clone, Serialize)]
pub struct HitPosition {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub charge: f64,
}

impl From<&Hit> for HitPosition {
    fn from(hit: &Hit) -> Self {
        let position = hit.position();
        Self {
            id: hit.id(),
            x: position.x,
            y: position.y,
            z: position.z,
            charge: hit.charge(),
        }
    }
}

/// A reconstructed track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackRecord {
    pub track_id: usize,
    pub kind: String,
    pub hit_ids: Vec<usize>,
    pub parameters: Vec<f64>,

    /// Non-finite values export as null
    pub chi2: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex: Option<[f64; 3]>,
}

impl From<&Track> for TrackRecord {
    fn from(track: &Track) -> Self {
        Self {
            track_id: track.id,
            kind: track.kind().to_string(),
            hit_ids: track.hit_ids(),
            parameters: track.parameters().to_vec(),
            chi2: track.chi2(),
            vertex: track.vertex.map(to_array),
        }
    }
}

/// A reconstructed vertex.
#[derive(Debug, Clone, Serialize)]
pub struct VertexRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub track_ids: Vec<usize>,
}

impl From<&Vertex> for VertexRecord {
    fn from(vertex: &Vertex) -> Self {
        Self {
            x: vertex.position.x,
            y: vertex.position.y,
            z: vertex.position.z,
            track_ids: vertex.track_ids.clone(),
        }
    }
}

/// One scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioExport {
    pub scenario: String,
    pub seed: u64,
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,
    pub hits: Vec<HitPosition>,
    pub truth: Vec<GroundTruthTrack>,
    pub tracks: Vec<TrackRecord>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vertices: Vec<VertexRecord>,
}

impl From<&ScenarioResult> for ScenarioExport {
    fn from(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            metrics: result.metrics.clone(),
            hits: result.event.hits().iter().map(HitPosition::from).collect(),
            truth: result.truth.clone(),
            tracks: result.output.tracks.iter().map(TrackRecord::from).collect(),
            vertices: result.output.vertices.iter().map(VertexRecord::from).collect(),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Base seed
    pub seed: u64,

    /// Engine settings shared by the runs
    pub config: ConsensusConfig,

    /// All runs, in execution order
    pub runs: Vec<ScenarioExport>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(seed: u64, config: &ConsensusConfig) -> Self {
        Self {
            seed,
            config: config.clone(),
            runs: Vec::new(),
        }
    }

    /// Adds a run.
    pub fn add_result(&mut self, result: &ScenarioResult) {
        self.runs.push(ScenarioExport::from(result));
    }

    /// True if every recorded run passed.
    pub fn passed(&self) -> bool {
        self.runs.iter().all(|run| run.passed)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

fn to_array(v: Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_vertex_pair() {
        let runner = ScenarioRunner::new(42);
        let result = runner.run(ScenarioId::VertexPair);

        let mut export = SimExport::new(42, runner.config());
        export.add_result(&result);

        let json: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        let run = &json["runs"][0];
        assert_eq!(run["scenario"], "vertex_pair");
        assert_eq!(run["hits"].as_array().unwrap().len(), result.event.len());
        assert_eq!(run["truth"].as_array().unwrap().len(), 2);
        assert_eq!(run["tracks"][0]["kind"], "Line");
        assert_eq!(run["tracks"][0]["parameters"].as_array().unwrap().len(), 6);
        assert_eq!(json["config"]["min_inliers"], 20);
    }

    #[test]
    fn test_export_empty_run_omits_vertices() {
        let runner = ScenarioRunner::new(1);
        let mut export = SimExport::new(1, runner.config());
        export.add_result(&runner.run(ScenarioId::EmptyEvent));

        let json: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        assert!(json["runs"][0].get("vertices").is_none());
        assert!(json["runs"][0].get("failure_reason").is_none());
        assert!(export.passed());
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let export = SimExport::new(0, &ConsensusConfig::default());
        let err = export
            .write_to_file("/nonexistent-trackfit-dir/out.json")
            .unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }
}
