//! Synthetic event scenarios for the track finder.

use crate::error::SimError;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Two separated lines in uniform noise
    TwoTracks,

    /// Four parallel lines sharing the event
    FourTracks,

    /// Two lines from a common interaction point
    VertexPair,

    /// Uniform noise with no track
    NoiseOnly,

    /// No hits at all
    EmptyEvent,

    /// A circle in the pad plane
    Circle,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::TwoTracks,
            ScenarioId::FourTracks,
            ScenarioId::VertexPair,
            ScenarioId::NoiseOnly,
            ScenarioId::EmptyEvent,
            ScenarioId::Circle,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::TwoTracks => "two_tracks",
            ScenarioId::FourTracks => "four_tracks",
            ScenarioId::VertexPair => "vertex_pair",
            ScenarioId::NoiseOnly => "noise_only",
            ScenarioId::EmptyEvent => "empty_event",
            ScenarioId::Circle => "circle",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::TwoTracks => "2 lines x 50 hits + 20 noise hits, expect 2 clean tracks",
            ScenarioId::FourTracks => "4 parallel lines x 40 hits + 40 noise hits, expect 4 tracks",
            ScenarioId::VertexPair => "2 lines from one point, expect a vertex within 3 units",
            ScenarioId::NoiseOnly => "60 uniform noise hits, expect no track",
            ScenarioId::EmptyEvent => "no hits, expect an empty result",
            ScenarioId::Circle => "60-hit circle + 20 noise hits, expect 1 circle track",
        }
    }

    /// Returns true if the scenario runs the vertex finder.
    pub fn uses_vertexing(&self) -> bool {
        matches!(self, ScenarioId::VertexPair)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "two_tracks" | "twotracks" => Ok(ScenarioId::TwoTracks),
            "four_tracks" | "fourtracks" => Ok(ScenarioId::FourTracks),
            "vertex_pair" | "vertexpair" => Ok(ScenarioId::VertexPair),
            "noise_only" | "noiseonly" => Ok(ScenarioId::NoiseOnly),
            "empty_event" | "empty" => Ok(ScenarioId::EmptyEvent),
            "circle" => Ok(ScenarioId::Circle),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("Vertex-Pair".parse::<ScenarioId>().unwrap(), ScenarioId::VertexPair);
        assert_eq!("empty".parse::<ScenarioId>().unwrap(), ScenarioId::EmptyEvent);
    }

    #[test]
    fn test_unknown_scenario() {
        let err = "split_brain".parse::<ScenarioId>().unwrap_err();
        assert!(matches!(err, SimError::UnknownScenario(ref name) if name == "split_brain"));
    }
}
