//! Error types for warden.

use std::io;
use thiserror::Error;

/// Result type alias for warden operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in warden operations.
///
/// Configuration-class variants (`Config`, `Template`, `DuplicateGate`,
/// `InvalidPattern`) are authoring bugs and are never recovered from.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage I/O error.
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A message template referenced a placeholder with no value.
    #[error("Template error: unresolved placeholder `{{{placeholder}}}` in template {template:?}")]
    Template {
        /// The template text being rendered.
        template: String,
        /// The placeholder name that could not be resolved.
        placeholder: String,
    },

    /// Two gates were registered under the same name.
    #[error("Duplicate gate name: {0}")]
    DuplicateGate(String),

    /// A condition pattern failed to compile.
    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// The regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Gate name not registered.
    #[error("Unknown gate: {0}")]
    UnknownGate(String),

    /// Missing required field in hook input.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Lifecycle event name not recognized.
    #[error("Unknown hook event: {0}")]
    UnknownEvent(String),
}

impl Error {
    /// Whether this error is an authoring bug that must not be failed open.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Template { .. }
                | Self::DuplicateGate(_)
                | Self::InvalidPattern { .. }
        )
    }
}
