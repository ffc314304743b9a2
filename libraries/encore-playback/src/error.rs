//! Error types for playback management

use crate::types::ChannelId;
use encore_core::TrackId;
use thiserror::Error;

/// Playback errors
///
/// None of these are fatal to a session: the worst outcome of any failure
/// path is skipping to the next track and telling the user.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Playable URL could not be obtained (preload retries on a later tick)
    #[error("Could not resolve playable URL for {track_id}: {reason}")]
    ResolutionFailure {
        /// Track that failed to resolve
        track_id: TrackId,
        /// Resolver's explanation
        reason: String,
    },

    /// Decode or network error reported by a channel
    #[error("Media error on channel {channel}: {message}")]
    MediaError {
        /// Deck that reported it
        channel: ChannelId,
        /// Backend message
        message: String,
    },

    /// Playback position stopped advancing
    #[error("Playback stalled on channel {channel}")]
    Stall {
        /// Deck that stopped advancing
        channel: ChannelId,
    },

    /// Retry budget exhausted for a track
    #[error("Giving up on {track_id} after {attempts} attempts")]
    ExhaustedRetries {
        /// Track being skipped
        track_id: TrackId,
        /// Retries spent
        attempts: u32,
    },

    /// No track is currently loaded
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Queue is empty
    #[error("Queue is empty")]
    QueueEmpty,

    /// Invalid seek position
    #[error("Invalid seek position: {0:?}")]
    InvalidSeekPosition(std::time::Duration),

    /// Invalid operation or configuration
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The session task is gone
    #[error("Playback session has shut down")]
    SessionClosed,
}

impl PlaybackError {
    /// Whether the failure goes through the stall/failure monitor
    pub fn is_recoverable_media_failure(&self) -> bool {
        matches!(self, Self::MediaError { .. } | Self::Stall { .. })
    }
}

impl From<encore_core::CoreError> for PlaybackError {
    fn from(err: encore_core::CoreError) -> Self {
        match err {
            encore_core::CoreError::Resolution { track_id, reason } => {
                Self::ResolutionFailure { track_id, reason }
            }
            other => Self::InvalidOperation(other.to_string()),
        }
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
