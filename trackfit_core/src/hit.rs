//! Hits and the per-event hit container.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single charge deposit reconstructed by the TPC.
///
/// Hits are immutable once built. Tracks keep their own copies, so the
/// original `id` is preserved through the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    id: usize,
    position: Vector3<f64>,
    charge: f64,
}

impl Hit {
    pub fn new(id: usize, position: Vector3<f64>, charge: f64) -> Self {
        Self { id, position, charge }
    }

    /// Identity of the hit inside its source event.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }
}

/// One detector event as handed over by the unpacking stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event number
    pub id: u64,

    /// Upstream quality flag (default: true). Bad events are never fitted.
    pub is_good: bool,

    hits: Vec<Hit>,
}

impl Event {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            is_good: true,
            hits: Vec::new(),
        }
    }

    /// Builds an event from already numbered hits.
    pub fn from_hits(id: u64, hits: Vec<Hit>) -> Self {
        Self {
            id,
            is_good: true,
            hits,
        }
    }

    /// Appends a hit, numbering it after the hits already stored.
    pub fn add_hit(&mut self, position: Vector3<f64>, charge: f64) -> &Hit {
        let id = self.hits.len();
        self.hits.push(Hit::new(id, position, charge));
        &self.hits[id]
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Sum of all hit charges.
    pub fn total_charge(&self) -> f64 {
        self.hits.iter().map(Hit::charge).sum()
    }
}

// ============================================================================
// TESTS
// ============================================================================
