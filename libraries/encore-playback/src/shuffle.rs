//! Shuffle selection
//!
//! Picks a random not-yet-played index per cycle. A cycle ends once every
//! index has been played; with wrapping enabled a new cycle starts, never
//! beginning with the track that just played (unless it is the only one).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;

/// Tracks which indices have played in the current shuffle cycle
#[derive(Debug, Clone)]
pub struct ShuffleBag {
    played: HashSet<usize>,
    rng: StdRng,
}

impl ShuffleBag {
    /// Create a bag seeded from OS entropy
    pub fn new() -> Self {
        Self {
            played: HashSet::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a deterministic bag (tests, reproducible simulations)
    pub fn with_seed(seed: u64) -> Self {
        Self {
            played: HashSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Record that `index` played in this cycle
    pub fn mark_played(&mut self, index: usize) {
        self.played.insert(index);
    }

    /// Whether `index` already played in this cycle
    pub fn has_played(&self, index: usize) -> bool {
        self.played.contains(&index)
    }

    /// Start a fresh cycle
    pub fn reset(&mut self) {
        self.played.clear();
    }

    /// Pick a random index in `0..len` that has not played this cycle
    ///
    /// `current` is never picked while alternatives exist. When the cycle is
    /// exhausted, `wrap` decides between starting a new cycle and `None`.
    pub fn pick(&mut self, len: usize, current: Option<usize>, wrap: bool) -> Option<usize> {
        if len == 0 {
            return None;
        }

        let mut candidates: Vec<usize> = (0..len)
            .filter(|i| !self.played.contains(i) && Some(*i) != current)
            .collect();

        if candidates.is_empty() {
            if !wrap {
                return None;
            }
            self.played.clear();
            if let Some(current) = current {
                self.played.insert(current);
            }
            candidates = (0..len).filter(|i| Some(*i) != current).collect();
            if candidates.is_empty() {
                // Single-track context: replaying it is the only option
                candidates.push(0);
            }
        }

        candidates.choose(&mut self.rng).copied()
    }
}

impl Default for ShuffleBag {
    fn default() -> Self {
        Self::new()
    }
}
