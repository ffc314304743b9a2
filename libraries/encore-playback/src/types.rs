//! Core types for playback management

use crate::crossfade::CrossfadeSettings;
use crate::error::{PlaybackError, Result};
use crate::monitor::RecoverySettings;
use crate::preload::PreloadSettings;
use crate::timer::PlaybackToken;
use encore_core::{RepeatMode, Track};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One of the two decks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    /// Deck A
    A,
    /// Deck B
    B,
}

impl ChannelId {
    /// The opposite deck
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Handle for an outstanding URL resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub(crate) u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Why a URL is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePurpose {
    /// Track is becoming current and loads on the active channel
    Play,
    /// Next track is being staged on the inactive channel
    Preload,
}

/// URL resolution the host must perform
///
/// Hand the track to a [`TrackResolver`](encore_core::TrackResolver) and
/// report the outcome back through `PlaybackSession::complete_resolution`.
/// Late answers are fine: the session drops completions that are no longer
/// relevant.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Correlates the completion
    pub id: RequestId,
    /// Track to resolve
    pub track: Track,
    /// Where the result goes
    pub purpose: ResolvePurpose,
    /// Track identity when the request was issued
    pub token: PlaybackToken,
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No track loaded (or queue finished)
    Stopped,

    /// Waiting for a playable URL / media to load
    Loading,

    /// Currently playing
    Playing,

    /// Paused mid-track
    Paused,
}

/// Configuration for the playback session
///
/// Every threshold the engine uses lives here; none are baked into the
/// state machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Maximum history size for "previous" (default: 50)
    pub history_size: usize,

    /// Initial user volume, 0.0-1.0 (default: 0.8)
    pub initial_volume: f32,

    /// Initial shuffle flag (default: off)
    pub shuffle: bool,

    /// Initial repeat mode (default: off)
    pub repeat: RepeatMode,

    /// Crossfade timing
    pub crossfade: CrossfadeSettings,

    /// Preload window
    pub preload: PreloadSettings,

    /// Stall detection, retry and reconnect timing
    pub recovery: RecoverySettings,

    /// Minimum spacing between persisted positions (default: 5000ms)
    pub position_persist_interval_ms: u64,

    /// "Previous" restarts the track when further in than this (default: 3000ms)
    pub restart_threshold_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            history_size: 50,
            initial_volume: 0.8,
            shuffle: false,
            repeat: RepeatMode::Off,
            crossfade: CrossfadeSettings::default(),
            preload: PreloadSettings::default(),
            recovery: RecoverySettings::default(),
            position_persist_interval_ms: 5000,
            restart_threshold_ms: 3000,
        }
    }
}

impl PlaybackConfig {
    /// Position persistence cadence
    pub fn position_persist_interval(&self) -> Duration {
        Duration::from_millis(self.position_persist_interval_ms)
    }

    /// Threshold after which "previous" restarts the current track
    pub fn restart_threshold(&self) -> Duration {
        Duration::from_millis(self.restart_threshold_ms)
    }

    /// Validate configuration
    ///
    /// # Errors
    /// Returns `InvalidOperation` describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(PlaybackError::InvalidOperation(format!(
                "initial_volume must be within 0.0-1.0, got {}",
                self.initial_volume
            )));
        }
        if self.history_size == 0 {
            return Err(PlaybackError::InvalidOperation(
                "history_size must be at least 1".to_string(),
            ));
        }
        self.crossfade.validate()?;
        self.preload.validate()?;
        self.recovery.validate()
    }
}
