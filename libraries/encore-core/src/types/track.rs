/// Track domain type
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TrackId;

/// Streamable track
///
/// Immutable once constructed: resolving a playable URL produces a new value
/// instead of mutating the existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track identifier
    pub id: TrackId,

    /// Track title
    pub title: String,

    /// Artist name
    pub artist: String,

    /// Album name
    pub album: Option<String>,

    /// Duration reported by the catalog (the media element is authoritative)
    pub duration_hint: Option<Duration>,

    /// Cover art reference
    pub cover: Option<String>,

    /// Stored audio reference, exchanged for a short-lived playable URL
    pub audio_ref: String,

    /// Resolved playable URL (None until resolved)
    pub playable_url: Option<String>,
}

impl Track {
    /// Create a new track with minimal metadata
    pub fn new(
        id: TrackId,
        title: impl Into<String>,
        artist: impl Into<String>,
        audio_ref: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration_hint: None,
            cover: None,
            audio_ref: audio_ref.into(),
            playable_url: None,
        }
    }

    /// Set the album name
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Set the catalog duration hint
    #[must_use]
    pub fn with_duration_hint(mut self, duration: Duration) -> Self {
        self.duration_hint = Some(duration);
        self
    }

    /// Set the cover art reference
    #[must_use]
    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(cover.into());
        self
    }

    /// Return a copy of this track carrying a resolved playable URL
    #[must_use]
    pub fn with_playable_url(&self, url: impl Into<String>) -> Self {
        Self {
            playable_url: Some(url.into()),
            ..self.clone()
        }
    }

    /// Human readable "Artist - Title" label for notices and logs
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}
