//! Simulated media element
//!
//! [`SimulatedDeck`] is what the session drives; [`DeckState`] is shared with
//! the ticker, which moves the clock and reports what the deck observed.

use crate::catalog::{self, Catalog};
use encore_core::TrackId;
use encore_playback::{ChannelId, MediaBackend, PlaybackError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Observable state of one deck
#[derive(Debug, Clone, Default)]
pub struct DeckState {
    pub url: Option<String>,
    pub track_id: Option<TrackId>,
    pub playing: bool,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub volume: f32,
    /// Loaded resource will error once playback starts
    pub faulty: bool,
}

pub type SharedDeck = Arc<Mutex<DeckState>>;

/// Lock a deck, shrugging off poisoning (the state stays usable)
pub fn lock(deck: &SharedDeck) -> MutexGuard<'_, DeckState> {
    deck.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SimulatedDeck {
    channel: ChannelId,
    state: SharedDeck,
    catalog: Arc<Catalog>,
}

impl SimulatedDeck {
    pub fn new(channel: ChannelId, state: SharedDeck, catalog: Arc<Catalog>) -> Self {
        Self {
            channel,
            state,
            catalog,
        }
    }
}

impl MediaBackend for SimulatedDeck {
    fn load(&mut self, url: &str) {
        let track_id = catalog::track_id_from_url(url);
        let duration = track_id.as_ref().and_then(|id| self.catalog.duration_of(id));
        let faulty = track_id.as_ref().is_some_and(|id| self.catalog.is_faulty(id));
        debug!(channel = %self.channel, url, faulty, "deck loading");

        let mut state = lock(&self.state);
        state.url = Some(url.to_string());
        state.track_id = track_id;
        state.duration = duration;
        state.position = Duration::ZERO;
        state.playing = false;
        state.faulty = faulty;
    }

    fn play(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.url.is_none() {
            return Err(PlaybackError::MediaError {
                channel: self.channel,
                message: "no source loaded".to_string(),
            });
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        lock(&self.state).playing = false;
    }

    fn seek(&mut self, position: Duration) {
        let mut state = lock(&self.state);
        state.position = match state.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
    }

    fn set_volume(&mut self, volume: f32) {
        trace!(channel = %self.channel, volume, "deck volume");
        lock(&self.state).volume = volume.clamp(0.0, 1.0);
    }

    fn unload(&mut self) {
        let mut state = lock(&self.state);
        let volume = state.volume;
        *state = DeckState {
            volume,
            ..DeckState::default()
        };
    }

    fn position(&self) -> Duration {
        lock(&self.state).position
    }

    fn duration(&self) -> Option<Duration> {
        lock(&self.state).duration
    }

    fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }
}
