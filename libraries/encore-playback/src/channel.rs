//! Playback channels (decks)
//!
//! Two [`Channel`]s exist for the lifetime of a session. Each owns one
//! platform media resource through a [`MediaBackend`]; the resource is
//! swapped per track, never the channel itself. [`Decks`] holds both and the
//! tag naming which one is audible.

use crate::error::Result;
use crate::types::ChannelId;
use crate::volume::clamp_unit;
use encore_core::TrackId;
use std::time::Duration;
use tracing::debug;

/// Platform media element (HTML audio element, native player, simulator)
///
/// Observer callbacks (progress, ended, error, stalled) are not part of this
/// trait: the host delivers them to the session as [`MediaEvent`]s.
pub trait MediaBackend: Send {
    /// Start loading `url`, replacing any current resource
    fn load(&mut self, url: &str);

    /// Start or resume playback
    ///
    /// # Errors
    /// Returns `MediaError` when the platform refuses to play (autoplay
    /// policy, decode failure)
    fn play(&mut self) -> Result<()>;

    /// Pause playback
    fn pause(&mut self);

    /// Seek within the current resource
    fn seek(&mut self, position: Duration);

    /// Set output volume (0.0-1.0)
    fn set_volume(&mut self, volume: f32);

    /// Drop the current resource
    fn unload(&mut self);

    /// Current position reported by the element
    fn position(&self) -> Duration;

    /// Duration reported by the element, once known
    fn duration(&self) -> Option<Duration>;

    /// Whether the element is actually producing audio right now
    fn is_playing(&self) -> bool;
}

/// Observer event reported by a channel's media element
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Periodic position update
    Progress {
        /// Playback position
        position: Duration,
        /// Resource duration, once the element knows it
        duration: Option<Duration>,
    },
    /// Reached the end of the resource
    Ended,
    /// Decode or network error
    Error(String),
    /// Element reports it stopped receiving data
    Stalled,
    /// Element is waiting for data (buffering)
    Waiting,
}

/// What a channel has loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedMedia {
    /// Track the resource belongs to
    pub track_id: TrackId,
    /// URL the resource was loaded from
    pub url: String,
}

/// One deck
///
/// Invariants: the loaded resource always corresponds to the reported track
/// id, and volume is always within [0, 1].
pub struct Channel {
    id: ChannelId,
    backend: Box<dyn MediaBackend>,
    loaded: Option<LoadedMedia>,
    volume: f32,
    last_position: Duration,
    last_duration: Option<Duration>,
    errored: bool,
    stalled: bool,
}

impl Channel {
    /// Fixed playback rate; variable-speed playback is not supported
    pub const PLAYBACK_RATE: f32 = 1.0;

    /// Wrap a backend. The channel starts empty and silent.
    pub fn new(id: ChannelId, mut backend: Box<dyn MediaBackend>) -> Self {
        backend.set_volume(0.0);
        Self {
            id,
            backend,
            loaded: None,
            volume: 0.0,
            last_position: Duration::ZERO,
            last_duration: None,
            errored: false,
            stalled: false,
        }
    }

    /// Which deck this is
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Load `url` for `track_id` unless it is already the live resource
    ///
    /// Returns `true` when a load was issued. Reissuing a load for the
    /// current resource would restart it audibly, so a matching, healthy
    /// resource is left untouched.
    pub fn ensure_loaded(&mut self, track_id: &TrackId, url: &str) -> bool {
        if let Some(loaded) = &self.loaded {
            if loaded.url == url && &loaded.track_id == track_id && !self.errored {
                debug!(channel = %self.id, %track_id, "resource already loaded, skipping reload");
                return false;
            }
        }

        debug!(channel = %self.id, %track_id, "loading resource");
        self.backend.load(url);
        self.loaded = Some(LoadedMedia {
            track_id: track_id.clone(),
            url: url.to_string(),
        });
        self.last_position = Duration::ZERO;
        self.last_duration = None;
        self.errored = false;
        self.stalled = false;
        true
    }

    /// Reload the current resource (retry path). Returns `false` if empty.
    pub fn reload(&mut self) -> bool {
        let Some(loaded) = &self.loaded else {
            return false;
        };
        debug!(channel = %self.id, track_id = %loaded.track_id, "forcing reload");
        self.backend.load(&loaded.url);
        self.errored = false;
        self.stalled = false;
        true
    }

    /// Start playback
    ///
    /// # Errors
    /// Propagates the backend's refusal to play
    pub fn play(&mut self) -> Result<()> {
        self.backend.play()
    }

    /// Pause playback
    pub fn pause(&mut self) {
        self.backend.pause();
    }

    /// Seek and remember the position
    pub fn seek(&mut self, position: Duration) {
        self.backend.seek(position);
        self.last_position = position;
    }

    /// Set volume, clamped to [0, 1]
    pub fn set_volume(&mut self, volume: f32) {
        let volume = clamp_unit(volume);
        self.volume = volume;
        self.backend.set_volume(volume);
    }

    /// Pause, unload and silence
    pub fn clear(&mut self) {
        if self.loaded.is_some() {
            debug!(channel = %self.id, "clearing resource");
        }
        self.backend.pause();
        self.backend.unload();
        self.set_volume(0.0);
        self.loaded = None;
        self.last_position = Duration::ZERO;
        self.last_duration = None;
        self.errored = false;
        self.stalled = false;
    }

    /// Record a progress observation
    ///
    /// Returns `true` if the position moved since the last observation.
    pub fn observe_progress(&mut self, position: Duration, duration: Option<Duration>) -> bool {
        let advanced = position != self.last_position;
        self.last_position = position;
        if duration.is_some() {
            self.last_duration = duration;
        }
        if advanced {
            self.stalled = false;
        }
        advanced
    }

    /// Flag the resource as errored
    pub fn mark_errored(&mut self) {
        self.errored = true;
    }

    /// Flag the resource as stalled
    pub fn mark_stalled(&mut self) {
        self.stalled = true;
    }

    /// Loaded resource, if any
    pub fn loaded(&self) -> Option<&LoadedMedia> {
        self.loaded.as_ref()
    }

    /// Track id of the loaded resource
    pub fn loaded_track(&self) -> Option<&TrackId> {
        self.loaded.as_ref().map(|l| &l.track_id)
    }

    /// Whether the channel holds `track_id`
    pub fn holds(&self, track_id: &TrackId) -> bool {
        self.loaded_track() == Some(track_id)
    }

    /// Current volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Last observed position
    pub fn position(&self) -> Duration {
        self.last_position
    }

    /// Last observed duration
    pub fn duration(&self) -> Option<Duration> {
        self.last_duration
    }

    /// Time left, when the duration is known
    pub fn remaining(&self) -> Option<Duration> {
        self.last_duration
            .map(|d| d.saturating_sub(self.last_position))
    }

    /// Direct element state, not session bookkeeping
    pub fn is_playing(&self) -> bool {
        self.backend.is_playing()
    }

    /// Error flag
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Stalled flag
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("loaded", &self.loaded)
            .field("volume", &self.volume)
            .field("position", &self.last_position)
            .field("errored", &self.errored)
            .field("stalled", &self.stalled)
            .finish_non_exhaustive()
    }
}

/// Both decks plus the active selector
#[derive(Debug)]
pub struct Decks {
    channels: [Channel; 2],
    active: ChannelId,
}

impl Decks {
    /// Create the deck pair; A starts active
    pub fn new(a: Box<dyn MediaBackend>, b: Box<dyn MediaBackend>) -> Self {
        Self {
            channels: [Channel::new(ChannelId::A, a), Channel::new(ChannelId::B, b)],
            active: ChannelId::A,
        }
    }

    /// Which deck is audible
    pub fn active_id(&self) -> ChannelId {
        self.active
    }

    /// Audible deck
    pub fn active(&self) -> &Channel {
        self.get(self.active)
    }

    /// Audible deck, mutably
    pub fn active_mut(&mut self) -> &mut Channel {
        self.get_mut(self.active)
    }

    /// Standby deck
    pub fn inactive(&self) -> &Channel {
        self.get(self.active.other())
    }

    /// Deck by id
    pub fn get(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    /// Deck by id, mutably
    pub fn get_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.channels[id.index()]
    }

    /// Flip the active tag. Only the session's transition function calls this.
    pub(crate) fn flip(&mut self) -> ChannelId {
        self.active = self.active.other();
        self.active
    }
}
