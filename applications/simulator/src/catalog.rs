//! Generated playlist
//!
//! Tracks are synthetic: `track-000`, `track-001`, ... all of the configured
//! length. Simulated URLs carry the track id so a deck can look up what it
//! was asked to play.

use crate::config::SimSettings;
use encore_core::{Track, TrackId};
use std::time::Duration;

/// Scheme and host of every simulated playable URL
pub const URL_PREFIX: &str = "sim://cdn/";

#[derive(Debug, Clone)]
pub struct Catalog {
    tracks: Vec<Track>,
    faulty: Option<TrackId>,
}

impl Catalog {
    pub fn generate(settings: &SimSettings) -> Self {
        let tracks: Vec<Track> = (0..settings.tracks)
            .map(|i| {
                let id = format!("track-{i:03}");
                Track::new(
                    TrackId::new(id.clone()),
                    format!("Track {}", i + 1),
                    "Simulated Artist",
                    format!("audio/{id}.mp3"),
                )
                .with_album("Simulation")
                .with_duration_hint(Duration::from_secs(settings.track_secs))
            })
            .collect();
        let faulty = settings
            .fail_track
            .and_then(|index| tracks.get(index))
            .map(|track| track.id.clone());

        Self { tracks, faulty }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn duration_of(&self, id: &TrackId) -> Option<Duration> {
        self.tracks
            .iter()
            .find(|track| &track.id == id)
            .and_then(|track| track.duration_hint)
    }

    /// Whether decks refuse to play this track
    pub fn is_faulty(&self, id: &TrackId) -> bool {
        self.faulty.as_ref() == Some(id)
    }
}

/// Signed URL for `track`
pub fn playable_url(track: &Track, signature: u32) -> String {
    format!("{URL_PREFIX}{}?sig={signature:08x}", track.id)
}

/// Track id a simulated URL points at
pub fn track_id_from_url(url: &str) -> Option<TrackId> {
    let rest = url.strip_prefix(URL_PREFIX)?;
    let id = rest.split('?').next().filter(|id| !id.is_empty())?;
    Some(TrackId::new(id))
}
