/// Core error types for Encore
use thiserror::Error;

use crate::types::TrackId;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type shared by collaborator implementations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Playable URL could not be resolved for a stored reference
    #[error("Failed to resolve playable URL for {track_id}: {reason}")]
    Resolution {
        /// Track whose reference failed to resolve
        track_id: TrackId,
        /// Resolver's explanation
        reason: String,
    },

    /// Track not found
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Collaborator sink rejected a write (history, position store)
    #[error("Sink error: {0}")]
    Sink(String),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Create a resolution error
    pub fn resolution(track_id: TrackId, reason: impl Into<String>) -> Self {
        Self::Resolution {
            track_id,
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Whether the failure is likely transient (worth retrying later)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Resolution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_mentions_track() {
        let err = CoreError::resolution(TrackId::new("abc"), "token expired");
        let text = err.to_string();
        assert!(text.contains("abc"));
        assert!(text.contains("token expired"));
        assert!(err.is_transient());
    }

    #[test]
    fn invalid_input_is_not_transient() {
        assert!(!CoreError::invalid_input("bad").is_transient());
    }
}
