//! TrackFit Synthetic Event Harness
//!
//! Builds labelled TPC events from a single seed, runs the sample-consensus
//! engine over them, and grades the result against ground truth.
//!
//! # Core Principle: Seeded Everything
//!
//! - **Events**: the Oracle derives hit jitter, charges, and noise from a
//!   physics seed mixed out of the master seed
//! - **Engine**: the consensus RNG is seeded with the master seed itself
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                       │
//! │  ┌────────────┐   Event    ┌─────────────────┐            │
//! │  │   Oracle   │──────────►│ SampleConsensus │            │
//! │  │ (truth +   │            └────────┬────────┘            │
//! │  │  noise)    │                     │ PatternEvent        │
//! │  └─────┬──────┘                     ▼                     │
//! │        │ GroundTruthTrack   ┌─────────────────┐            │
//! │        └──────────────────►│ ScenarioMetrics │──► pass?   │
//! │                             └─────────────────┘            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use trackfit_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::EmptyEvent);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{HitPosition, ScenarioExport, SimExport, TrackRecord, VertexRecord};
pub use oracle::{GroundTruthTrack, Oracle, TruthShape};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
