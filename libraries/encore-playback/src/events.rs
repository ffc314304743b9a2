//! Playback Events
//!
//! Event-based communication for UI synchronization. The session queues
//! events as it changes state; hosts drain them after every input:
//! - State changes (play/pause/stop/loading)
//! - Track changes (manual skip, natural advance, crossfade swap)
//! - Crossfade lifecycle and progress
//! - Position updates from the active channel
//! - Recovery (retries, connectivity)

use crate::types::{ChannelId, PlaybackState};
use serde::{Deserialize, Serialize};

/// How the current track changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Started from the queue (first play, queue load)
    Start,
    /// User skipped forward
    Skip,
    /// User went back
    Previous,
    /// Track ended and the next one loaded on the active channel
    Advance,
    /// Crossfade swap
    Crossfade,
    /// Track ended and the staged preload took over without a fade
    HardSwap,
    /// Skipped after exhausting retries
    Failure,
    /// Skipped after reconnecting
    Reconnect,
}

impl TransitionKind {
    /// Whether the active tag moves to the other deck
    pub fn flips_channel(self) -> bool {
        matches!(self, Self::Crossfade | Self::HardSwap)
    }
}

/// Events emitted by the playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Playback state changed
    StateChanged {
        /// The new playback state
        state: PlaybackState,
    },

    /// Current track changed
    TrackChanged {
        /// ID of the new (current) track
        track_id: String,
        /// ID of the previous track (if any)
        previous_track_id: Option<String>,
        /// How it changed
        kind: TransitionKind,
    },

    /// Crossfade started between two tracks
    CrossfadeStarted {
        /// ID of the outgoing track
        from_track_id: String,
        /// ID of the incoming track
        to_track_id: String,
        /// Duration of the crossfade in milliseconds
        duration_ms: u64,
    },

    /// Crossfade progress update (for UI animations)
    CrossfadeProgress {
        /// Progress from 0.0 (just started) to 1.0 (complete)
        progress: f32,
    },

    /// Crossfade completed and decks swapped
    CrossfadeCompleted {
        /// Deck that is now audible
        active: ChannelId,
    },

    /// Crossfade abandoned before the swap
    CrossfadeCancelled,

    /// Position update from the active channel
    PositionUpdate {
        /// Current playback position
        position_ms: u64,
        /// Total track duration, once known
        duration_ms: Option<u64>,
    },

    /// Next track has been loaded into the standby deck
    NextTrackPrepared {
        /// ID of the prepared track
        track_id: String,
    },

    /// Volume changed
    VolumeChanged {
        /// New volume level (0.0-1.0)
        level: f32,
        /// Whether audio is muted
        is_muted: bool,
    },

    /// A reload of the current track is scheduled
    RetryScheduled {
        /// Deck being retried
        channel: ChannelId,
        /// Attempt number (1-based)
        attempt: u32,
        /// Backoff before the reload
        delay_ms: u64,
    },

    /// Connectivity changed
    ConnectivityChanged {
        /// Whether online
        online: bool,
    },

    /// Queue ran out with repeat off
    QueueEnded,

    /// Error occurred during playback
    Error {
        /// Error message
        message: String,
    },
}

impl PlaybackEvent {
    /// Short label for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::TrackChanged { .. } => "track_changed",
            Self::CrossfadeStarted { .. } => "crossfade_started",
            Self::CrossfadeProgress { .. } => "crossfade_progress",
            Self::CrossfadeCompleted { .. } => "crossfade_completed",
            Self::CrossfadeCancelled => "crossfade_cancelled",
            Self::PositionUpdate { .. } => "position_update",
            Self::NextTrackPrepared { .. } => "next_track_prepared",
            Self::VolumeChanged { .. } => "volume_changed",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::ConnectivityChanged { .. } => "connectivity_changed",
            Self::QueueEnded => "queue_ended",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_swaps_flip_the_deck() {
        assert!(TransitionKind::Crossfade.flips_channel());
        assert!(TransitionKind::HardSwap.flips_channel());
        assert!(!TransitionKind::Skip.flips_channel());
        assert!(!TransitionKind::Advance.flips_channel());
        assert!(!TransitionKind::Failure.flips_channel());
    }

    #[test]
    fn events_serialize_for_ui_bridges() {
        let event = PlaybackEvent::TrackChanged {
            track_id: "b".to_string(),
            previous_track_id: Some("a".to_string()),
            kind: TransitionKind::HardSwap,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"hard_swap\""));
        assert_eq!(event.name(), "track_changed");
    }
}
