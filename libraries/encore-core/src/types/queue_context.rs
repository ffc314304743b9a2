/// Queue resolution context types
use serde::{Deserialize, Serialize};

use super::TrackId;

/// Repeat mode for playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop when the queue ends
    #[default]
    Off,
    /// Loop the entire queue
    All,
    /// Loop the current track only
    One,
}

impl RepeatMode {
    /// Convert to string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        }
    }

    /// Next mode in the UI toggle cycle: off -> all -> one -> off
    #[must_use]
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}

impl std::fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the session state a queue provider needs to pick the next track
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueContext {
    /// Track currently playing (if any)
    pub current: Option<TrackId>,
    /// Whether shuffle is enabled
    pub shuffle: bool,
    /// Active repeat mode
    pub repeat: RepeatMode,
}
