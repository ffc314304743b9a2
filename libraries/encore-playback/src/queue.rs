//! In-memory playback context
//!
//! Ordered track list with a cursor. Implements the queue resolution policy:
//! - In order: cursor + 1; repeat-all wraps, repeat-off stops at the end
//! - Shuffle: random not-yet-played index per cycle (see [`ShuffleBag`])
//! - Repeat-one behaves like repeat-all here; only explicit skips reach the
//!   queue while repeat-one is active
//!
//! Peeked picks are stable until committed, so a preloaded track is exactly
//! the one a later skip or swap lands on.

use crate::shuffle::ShuffleBag;
use encore_core::{QueueContext, QueueProvider, RepeatMode, Track, TrackId};

/// Ordered in-memory queue
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    tracks: Vec<Track>,

    /// Index of the current track
    cursor: Option<usize>,

    /// Peeked but uncommitted pick
    pending: Option<usize>,

    bag: ShuffleBag,
}

impl PlayQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue with deterministic shuffling
    pub fn with_seed(seed: u64) -> Self {
        Self {
            bag: ShuffleBag::with_seed(seed),
            ..Self::default()
        }
    }

    /// All tracks in context order
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Index of the current track
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Current track
    pub fn current(&self) -> Option<&Track> {
        self.cursor.and_then(|i| self.tracks.get(i))
    }

    fn wraps(ctx: &QueueContext) -> bool {
        matches!(ctx.repeat, RepeatMode::All | RepeatMode::One)
    }

    fn resolve_next_index(&mut self, ctx: &QueueContext) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        if ctx.shuffle {
            return self.bag.pick(len, self.cursor, Self::wraps(ctx));
        }

        match self.cursor {
            None => Some(0),
            Some(i) if i + 1 < len => Some(i + 1),
            Some(_) if Self::wraps(ctx) => Some(0),
            Some(_) => None,
        }
    }

    fn commit(&mut self, index: usize) -> Option<Track> {
        let track = self.tracks.get(index)?.clone();
        self.cursor = Some(index);
        self.pending = None;
        self.bag.mark_played(index);
        Some(track)
    }
}

impl QueueProvider for PlayQueue {
    fn load(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
        self.cursor = None;
        self.pending = None;
        self.bag.reset();
    }

    fn peek_next(&mut self, ctx: &QueueContext) -> Option<Track> {
        if self.pending.is_none() {
            self.pending = self.resolve_next_index(ctx);
        }
        self.pending.and_then(|i| self.tracks.get(i).cloned())
    }

    fn advance(&mut self, ctx: &QueueContext) -> Option<Track> {
        let index = match self.pending.take() {
            Some(index) => Some(index),
            None => self.resolve_next_index(ctx),
        }?;
        self.commit(index)
    }

    fn previous(&mut self, ctx: &QueueContext) -> Option<Track> {
        self.pending = None;
        let len = self.tracks.len();
        let index = match self.cursor {
            Some(0) if Self::wraps(ctx) && len > 0 => len - 1,
            Some(i) if i > 0 => i - 1,
            _ => return None,
        };
        let track = self.tracks.get(index)?.clone();
        self.cursor = Some(index);
        Some(track)
    }

    fn select(&mut self, id: &TrackId) -> Option<Track> {
        let index = self.tracks.iter().position(|t| &t.id == id)?;
        self.commit(index)
    }

    fn reset_pick(&mut self) {
        self.pending = None;
    }

    fn len(&self) -> usize {
        self.tracks.len()
    }
}
