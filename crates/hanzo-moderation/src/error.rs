//! Error types for Hanzo Moderation

use thiserror::Error;

/// Result type alias for moderation operations
pub type Result<T> = std::result::Result<T, ModerationError>;

/// Moderation error types
///
/// Policy violations are not errors: they are reported through
/// [`PreflightOutcome::Reject`](crate::types::PreflightOutcome) and
/// [`ReplyOutcome::Suppress`](crate::types::ReplyOutcome).
#[derive(Debug, Error)]
pub enum ModerationError {
    /// A configured policy pattern failed to compile
    #[error("Invalid policy pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The classifier could not evaluate a piece of text
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// The backend could not be reached (refused, timed out, reset)
    #[error("Backend unreachable: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ModerationError {
    fn from(err: toml::de::Error) -> Self {
        ModerationError::Config(err.to_string())
    }
}

/// Which side of the backend call a decision was made on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    /// Prompt on its way to the backend
    Input,
    /// Completion on its way back to the client
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}
