//! Playback history for "previous"
//!
//! Bounded record of tracks that actually became current, most recent last.

use encore_core::Track;
use std::collections::VecDeque;

/// Bounded playback history
#[derive(Debug, Clone)]
pub struct History {
    tracks: VecDeque<Track>,
    max_size: usize,
}

impl History {
    /// Create new history with the given capacity (at least 1)
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            tracks: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Record a track that was current
    ///
    /// Consecutive entries for the same track id collapse into one, so a
    /// restart or repeat-one replay does not pad the history. When full,
    /// the oldest entry is discarded.
    pub fn push(&mut self, track: Track) {
        if self.tracks.back().is_some_and(|last| last.id == track.id) {
            return;
        }
        if self.tracks.len() >= self.max_size {
            self.tracks.pop_front();
        }
        self.tracks.push_back(track);
    }

    /// Most recent track without removing it
    pub fn peek(&self) -> Option<&Track> {
        self.tracks.back()
    }

    /// Pop the most recent track
    pub fn pop(&mut self) -> Option<Track> {
        self.tracks.pop_back()
    }

    /// All entries, oldest first
    pub fn get_all(&self) -> Vec<&Track> {
        self.tracks.iter().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drop all entries (new playback context)
    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(50)
    }
}
