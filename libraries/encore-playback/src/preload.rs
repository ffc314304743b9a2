//! Next-track preloading
//!
//! Ahead of the crossfade window the session asks the queue for the next
//! track, resolves its URL and primes the inactive channel with it at
//! volume 0, paused. [`Preloader`] owns the single-entry buffer and the
//! trigger; the session does the I/O.

use crate::crossfade::CrossfadeSettings;
use crate::error::{PlaybackError, Result};
use crate::types::{ChannelId, RequestId};
use encore_core::{RepeatMode, Track};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Preload window, relative to the crossfade duration
///
/// Preloading triggers while
/// `crossfade + min_lead < remaining <= crossfade + max_lead`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadSettings {
    /// Lower edge of the window past the crossfade duration (default: 0ms)
    pub min_lead_ms: u64,

    /// Upper edge of the window past the crossfade duration (default: 10000ms)
    pub max_lead_ms: u64,
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            min_lead_ms: 0,
            max_lead_ms: 10_000,
        }
    }
}

impl PreloadSettings {
    /// Lower lead
    pub fn min_lead(&self) -> Duration {
        Duration::from_millis(self.min_lead_ms)
    }

    /// Upper lead
    pub fn max_lead(&self) -> Duration {
        Duration::from_millis(self.max_lead_ms)
    }

    /// Whether `remaining` falls inside the window for a `crossfade` of the given length
    pub fn in_window(&self, remaining: Duration, crossfade: Duration) -> bool {
        remaining > crossfade + self.min_lead() && remaining <= crossfade + self.max_lead()
    }

    /// Validate settings
    ///
    /// # Errors
    /// Returns `InvalidOperation` if the window is empty
    pub fn validate(&self) -> Result<()> {
        if self.max_lead_ms <= self.min_lead_ms {
            return Err(PlaybackError::InvalidOperation(format!(
                "preload max_lead_ms ({}) must exceed min_lead_ms ({})",
                self.max_lead_ms, self.min_lead_ms
            )));
        }
        Ok(())
    }
}

/// The single preload slot
#[derive(Debug, Clone, Default)]
pub enum PreloadBuffer {
    /// Nothing in flight or staged
    #[default]
    Empty,

    /// URL resolution in flight
    Resolving {
        /// Outstanding request
        request: RequestId,
        /// Track being resolved
        track: Track,
    },

    /// Loaded into the inactive channel, paused at volume 0
    Staged {
        /// Next track
        track: Track,
        /// Resolved URL
        url: String,
        /// Channel holding it
        channel: ChannelId,
    },
}

impl PreloadBuffer {
    /// Whether the slot is free
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Whether a track is staged and ready to fade in
    pub fn is_staged(&self) -> bool {
        matches!(self, Self::Staged { .. })
    }

    /// Track in the slot, whatever its stage
    pub fn track(&self) -> Option<&Track> {
        match self {
            Self::Empty => None,
            Self::Resolving { track, .. } | Self::Staged { track, .. } => Some(track),
        }
    }
}

/// A staged preload taken out of the buffer
#[derive(Debug, Clone)]
pub struct StagedPreload {
    /// Next track
    pub track: Track,
    /// Resolved URL
    pub url: String,
    /// Channel holding it
    pub channel: ChannelId,
}

/// Preload trigger and buffer
#[derive(Debug, Clone, Default)]
pub struct Preloader {
    settings: PreloadSettings,
    buffer: PreloadBuffer,
}

impl Preloader {
    /// Create an empty preloader
    pub fn new(settings: PreloadSettings) -> Self {
        Self {
            settings,
            buffer: PreloadBuffer::Empty,
        }
    }

    /// Window settings
    pub fn settings(&self) -> &PreloadSettings {
        &self.settings
    }

    /// Current slot contents
    pub fn buffer(&self) -> &PreloadBuffer {
        &self.buffer
    }

    /// Whether a preload should start now
    ///
    /// True when the slot is free, crossfade is on, repeat-one is off and
    /// `remaining` is inside the window.
    pub fn should_preload(
        &self,
        remaining: Duration,
        crossfade: &CrossfadeSettings,
        repeat: RepeatMode,
    ) -> bool {
        self.buffer.is_empty()
            && crossfade.enabled
            && repeat != RepeatMode::One
            && self.settings.in_window(remaining, crossfade.duration())
    }

    /// Record an outstanding resolution for `track`
    pub fn begin(&mut self, request: RequestId, track: Track) {
        self.buffer = PreloadBuffer::Resolving { request, track };
    }

    /// Claim the in-flight track if `request` is the one outstanding
    ///
    /// Leaves the slot empty; the caller stages or drops the result.
    pub fn take_resolving(&mut self, request: RequestId) -> Option<Track> {
        match &self.buffer {
            PreloadBuffer::Resolving { request: pending, .. } if *pending == request => {
                match std::mem::take(&mut self.buffer) {
                    PreloadBuffer::Resolving { track, .. } => Some(track),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Mark `track` as loaded into `channel`
    pub fn stage(&mut self, track: Track, url: String, channel: ChannelId) {
        self.buffer = PreloadBuffer::Staged {
            track,
            url,
            channel,
        };
    }

    /// Staged track and the channel holding it
    pub fn staged(&self) -> Option<(&Track, ChannelId)> {
        match &self.buffer {
            PreloadBuffer::Staged { track, channel, .. } => Some((track, *channel)),
            _ => None,
        }
    }

    /// Take the staged entry, leaving the slot empty
    pub fn take_staged(&mut self) -> Option<StagedPreload> {
        if !self.buffer.is_staged() {
            return None;
        }
        match std::mem::take(&mut self.buffer) {
            PreloadBuffer::Staged {
                track,
                url,
                channel,
            } => Some(StagedPreload {
                track,
                url,
                channel,
            }),
            _ => None,
        }
    }

    /// Empty the slot, returning what it held
    pub fn clear(&mut self) -> PreloadBuffer {
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_core::TrackId;

    fn track(id: &str) -> Track {
        Track::new(TrackId::new(id), "Song", "Artist", "raw")
    }

    #[test]
    fn default_window_spans_five_to_fifteen_seconds() {
        let preloader = Preloader::default();
        let crossfade = CrossfadeSettings::default();
        let secs = Duration::from_secs;

        assert!(!preloader.should_preload(secs(16), &crossfade, RepeatMode::Off));
        assert!(preloader.should_preload(secs(15), &crossfade, RepeatMode::Off));
        assert!(preloader.should_preload(secs(9), &crossfade, RepeatMode::Off));
        assert!(!preloader.should_preload(secs(5), &crossfade, RepeatMode::Off));
    }

    #[test]
    fn no_preload_without_crossfade_or_with_repeat_one() {
        let preloader = Preloader::default();
        let mut crossfade = CrossfadeSettings::default();
        let remaining = Duration::from_secs(10);

        assert!(!preloader.should_preload(remaining, &crossfade, RepeatMode::One));
        crossfade.enabled = false;
        assert!(!preloader.should_preload(remaining, &crossfade, RepeatMode::Off));
    }

    #[test]
    fn only_one_entry_at_a_time() {
        let mut preloader = Preloader::default();
        let crossfade = CrossfadeSettings::default();
        preloader.begin(RequestId(1), track("b"));

        assert!(!preloader.should_preload(Duration::from_secs(10), &crossfade, RepeatMode::Off));
        assert_eq!(preloader.buffer().track().map(|t| t.id.as_str()), Some("b"));
    }

    #[test]
    fn mismatched_request_is_not_claimed() {
        let mut preloader = Preloader::default();
        preloader.begin(RequestId(1), track("b"));

        assert!(preloader.take_resolving(RequestId(2)).is_none());
        assert!(!preloader.buffer().is_empty());

        let claimed = preloader.take_resolving(RequestId(1)).unwrap();
        assert_eq!(claimed.id.as_str(), "b");
        assert!(preloader.buffer().is_empty());
    }

    #[test]
    fn stage_and_take() {
        let mut preloader = Preloader::default();
        preloader.stage(track("b"), "https://cdn/b".into(), ChannelId::B);

        let (staged, channel) = preloader.staged().unwrap();
        assert_eq!(staged.id.as_str(), "b");
        assert_eq!(channel, ChannelId::B);

        let taken = preloader.take_staged().unwrap();
        assert_eq!(taken.url, "https://cdn/b");
        assert!(preloader.take_staged().is_none());
    }

    #[test]
    fn empty_window_is_rejected() {
        let settings = PreloadSettings {
            min_lead_ms: 5000,
            max_lead_ms: 5000,
        };
        assert!(settings.validate().is_err());
    }
}
