//! TrackFit Core - Sample-Consensus Track Finding for TPC Hit Clouds
//!
//! Partitions a noisy, charge-weighted 3D hit cloud into disjoint tracks:
//! 1. **Sampling**: minimal seed sets under four sampling strategies
//! 2. **Scoring**: RANSAC, LMedS, or MLESAC badness for each candidate
//! 3. **Extraction**: greedy best-first carving of non-overlapping clusters
//!    with a charge-weighted closed-form line refit
//! 4. **Vertexing**: common interaction points from pairs of line tracks
//!
//! # Usage
//!
//! ```
//! use trackfit_core::{ConsensusConfig, Event, SampleConsensus};
//! use nalgebra::Vector3;
//!
//! let mut event = Event::new(0);
//! for i in 0..40 {
//!     event.add_hit(Vector3::new(i as f64, 0.5 * i as f64, 2.0 * i as f64), 100.0);
//! }
//!
//! let config = ConsensusConfig::default().with_min_inliers(20);
//! let mut engine = SampleConsensus::new(config).unwrap();
//! let result = engine.solve_event(&event);
//! assert_eq!(result.tracks.len(), 1);
//! ```

pub mod config;
pub mod consensus;
pub mod error;
pub mod estimator;
pub mod hit;
pub mod pattern;
pub mod sampling;
pub mod track;
pub mod vertex;

// Re-export key types for convenience
pub use config::ConsensusConfig;
pub use consensus::{ConsensusStage, SampleConsensus};
pub use error::{ConfigError, PatternError};
pub use estimator::{Estimator, EstimatorKind, Evaluation};
pub use hit::{Event, Hit};
pub use pattern::{CirclePattern, LinePattern, Pattern, PatternKind, TrackPattern};
pub use sampling::{HitSampler, SampleMethod};
pub use track::{PatternEvent, Track};
pub use vertex::{Vertex, VertexConfig, VertexFinder, VertexMode, VertexReport};
