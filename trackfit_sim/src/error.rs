//! Error types for the simulation harness.

use trackfit_core::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Engine configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("Export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
