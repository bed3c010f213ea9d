//! Error types for Flint

use thiserror::Error;

/// The main error type for Flint operations
#[derive(Debug, Error)]
pub enum FlintError {
    #[error("state not found: {0}")]
    StateNotFound(String),

    #[error("no connection from '{from}' to '{to}'")]
    StateNotConnected { from: String, to: String },

    #[error("connection already has a transition bound")]
    TransitionAlreadyBound,

    #[error("connection not found: {0}")]
    ConnectionNotFound(u32),

    #[error("clip unresolved: {0}")]
    ClipUnresolved(String),

    #[error("invalid skeleton joint/bone index: {0}")]
    InvalidSkeletonIndex(u32),

    #[error("palette size mismatch: expected {expected}, got {got}")]
    PaletteSizeMismatch { expected: usize, got: usize },

    #[error("numeric error: {0}")]
    NumericError(String),

    #[error("worker lost its controller: {0}")]
    ScheduleError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),

    #[error("animation error: {0}")]
    AnimationError(String),
}

/// Result type alias for Flint operations
pub type Result<T> = std::result::Result<T, FlintError>;

impl From<toml::de::Error> for FlintError {
    fn from(err: toml::de::Error) -> Self {
        FlintError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for FlintError {
    fn from(err: toml::ser::Error) -> Self {
        FlintError::TomlSerError(err.to_string())
    }
}
