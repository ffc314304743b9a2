//! Encore - Continuous Playback
//!
//! Two-deck playback engine for streamed audio: uninterrupted playback with
//! linear crossfades, next-track preloading, stall/failure recovery and
//! network recovery.
//!
//! This crate provides:
//! - Two fixed channels (decks) over a platform [`MediaBackend`]
//! - Preloading of the next track onto the standby deck
//! - A crossfade state machine (`Idle -> Priming -> Fading -> Swapping`)
//! - Per-deck stall detection with bounded, backed-off retries
//! - Offline suspension and reconnect handling
//! - An in-memory queue with shuffle/repeat, history and volume
//! - A tokio driver (feature `runtime`, on by default)
//!
//! # Architecture
//!
//! [`PlaybackSession`] is sans-IO. Hosts push inputs (commands, media
//! events, connectivity, resolution results) together with the current
//! [`std::time::Instant`], call [`PlaybackSession::advance_timers`] when
//! [`PlaybackSession::next_deadline`] passes, and drain
//! [`PlaybackEvent`]s and [`ResolveRequest`]s. [`driver::spawn_session`]
//! does all of that on a tokio task.
//!
//! # Example
//!
//! ```rust
//! use encore_core::{Track, TrackId};
//! use encore_playback::{
//!     MediaBackend, PlaybackConfig, PlaybackSession, PlaybackState, PlayQueue,
//!     Result,
//! };
//! use std::time::{Duration, Instant};
//!
//! struct Silent;
//!
//! impl MediaBackend for Silent {
//!     fn load(&mut self, _url: &str) {}
//!     fn play(&mut self) -> Result<()> { Ok(()) }
//!     fn pause(&mut self) {}
//!     fn seek(&mut self, _position: Duration) {}
//!     fn set_volume(&mut self, _volume: f32) {}
//!     fn unload(&mut self) {}
//!     fn position(&self) -> Duration { Duration::ZERO }
//!     fn duration(&self) -> Option<Duration> { None }
//!     fn is_playing(&self) -> bool { false }
//! }
//!
//! let mut session = PlaybackSession::new(
//!     PlaybackConfig::default(),
//!     Box::new(Silent),
//!     Box::new(Silent),
//!     Box::new(PlayQueue::new()),
//! )?;
//!
//! let now = Instant::now();
//! let tracks = vec![Track::new(TrackId::new("t1"), "Intro", "Band", "audio/t1")];
//! session.load_queue(tracks, None, now)?;
//! assert_eq!(session.state(), PlaybackState::Loading);
//!
//! // The host resolves the URL and reports back
//! let request = session.take_resolution_requests().remove(0);
//! session.complete_resolution(request.id, Ok("https://cdn.example/t1".into()), now);
//! assert_eq!(session.state(), PlaybackState::Playing);
//! # Ok::<(), encore_playback::PlaybackError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod crossfade;
#[cfg(feature = "runtime")]
pub mod driver;
mod error;
pub mod events;
mod history;
pub mod monitor;
pub mod network;
pub mod preload;
mod queue;
pub mod session;
mod shuffle;
pub mod timer;
pub mod types;
mod volume;

// Public exports
pub use channel::{Channel, Decks, LoadedMedia, MediaBackend, MediaEvent};
pub use crossfade::{CrossfadePhase, CrossfadeScheduler, CrossfadeSettings, CrossfadeTransition, RampStep};
#[cfg(feature = "runtime")]
pub use driver::{spawn_session, DriverInput, SessionHandle};
pub use error::{PlaybackError, Result};
pub use events::{PlaybackEvent, TransitionKind};
pub use history::History;
pub use monitor::{ChannelHealth, MonitorAction, RecoverySettings, RetryState, StallMonitor};
pub use network::{Connectivity, NetworkRecovery, ReconnectAction};
pub use preload::{PreloadBuffer, PreloadSettings, Preloader, StagedPreload};
pub use queue::PlayQueue;
pub use session::{Command, MediaKey, PlaybackSession, Services};
pub use shuffle::ShuffleBag;
pub use timer::{PlaybackToken, TimerId, TimerKind, TimerQueue};
pub use types::{
    ChannelId, PlaybackConfig, PlaybackState, RequestId, ResolvePurpose, ResolveRequest,
};
pub use volume::Volume;
