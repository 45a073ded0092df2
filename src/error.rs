//! Engine error types

use thiserror::Error;

/// Errors surfaced by the engine's lifecycle operations.
///
/// Effect setters never return these: calls made before the graph exists
/// are dropped, and redundant initialization is ignored.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The audio subsystem could not be created (no device, no permission yet)
    #[error("Audio subsystem unavailable: {0}")]
    SubsystemUnavailable(String),

    /// The subsystem refused to leave the suspended state
    #[error("Failed to resume audio context: {0}")]
    ResumeFailed(String),

    /// Output stream failure reported by the device backend
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// Media bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration could not be parsed or is out of range
    #[error("Invalid engine config: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvalidConfig(e.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
