//! Error types for relay playback.

use thiserror::Error;

/// Errors surfaced at the edges of the library (files, configuration, names).
///
/// The player and the display stores are infallible; malformed log lines are
/// skipped rather than reported here.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Reading a log or config file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A config or export document was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scenario name not present in the catalog
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
