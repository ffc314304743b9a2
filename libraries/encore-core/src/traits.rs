/// Collaborator traits for Encore
///
/// The playback engine consumes these; hosts implement them.
use crate::error::Result;
use crate::types::{QueueContext, Track, TrackId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resolves a stored audio reference into a short-lived, authorized URL
///
/// No freshness guarantee is assumed: the engine asks again every time it
/// (re)loads a new track instead of caching URLs across tracks.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve the playable URL for `track`
    ///
    /// # Errors
    /// Returns an error if the reference cannot be exchanged for a URL
    async fn resolve_playable_url(&self, track: &Track) -> Result<String>;
}

/// Queue resolution policy
///
/// Implementations own the ordering of the playback context (playlist,
/// album, shuffle mix) and must honour shuffle and repeat from the supplied
/// [`QueueContext`].
pub trait QueueProvider: Send {
    /// Replace the playback context (playlist, album, mix)
    ///
    /// Resets the cursor, the shuffle cycle and any pending pick.
    fn load(&mut self, tracks: Vec<Track>);

    /// Track that would play after the current one, without committing
    ///
    /// Must return the same answer on repeated calls until [`advance`],
    /// [`select`] or [`reset_pick`] is called, even when shuffling.
    ///
    /// [`advance`]: QueueProvider::advance
    /// [`select`]: QueueProvider::select
    /// [`reset_pick`]: QueueProvider::reset_pick
    fn peek_next(&mut self, ctx: &QueueContext) -> Option<Track>;

    /// Commit to and return the next track
    fn advance(&mut self, ctx: &QueueContext) -> Option<Track>;

    /// Step back to the previous track in queue order
    fn previous(&mut self, ctx: &QueueContext) -> Option<Track>;

    /// Move the cursor to a specific track
    fn select(&mut self, id: &TrackId) -> Option<Track>;

    /// Forget any pending (peeked but uncommitted) pick
    fn reset_pick(&mut self);

    /// Number of tracks in the context
    fn len(&self) -> usize;

    /// Whether the context is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fire-and-forget "track played" telemetry
pub trait PlayHistorySink: Send {
    /// Record that `track` started playing at `at`
    ///
    /// # Errors
    /// Failures are logged and ignored by the engine
    fn track_played(&mut self, track: &Track, at: DateTime<Utc>) -> Result<()>;
}

/// Persists the last playback position for resume-on-reload
pub trait PositionStore: Send {
    /// Save the position of `track_id`
    ///
    /// # Errors
    /// Failures are logged and ignored by the engine
    fn save_position(&mut self, track_id: &TrackId, position: Duration) -> Result<()>;
}

/// Kind of transient user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Connectivity dropped
    ConnectionLost,
    /// Connectivity came back
    ConnectionRestored,
    /// Track was skipped after repeated playback failures
    SkippingAfterFailures,
    /// Generic playback problem
    PlaybackError,
}

/// Toast-style notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Notice category
    pub kind: NoticeKind,
    /// Message shown to the user
    pub message: String,
}

impl Notice {
    /// Create a notice
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// User-facing notification channel
pub trait Notifier: Send {
    /// Show a transient message
    fn notify(&mut self, notice: Notice);
}

/// Optional platform integrations (wake lock, OS now-playing widget)
///
/// The engine never depends on these for correctness.
pub trait PlatformHooks: Send {
    /// Keep the screen/device awake while audio plays
    fn acquire_wake_lock(&mut self) {}

    /// Release a previously acquired wake lock
    fn release_wake_lock(&mut self) {}

    /// Publish now-playing metadata to the OS media session
    fn update_now_playing(&mut self, track: &Track, playing: bool) {
        let _ = (track, playing);
    }
}

/// History sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistorySink;

impl PlayHistorySink for NoopHistorySink {
    fn track_played(&mut self, _track: &Track, _at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}

/// Position store that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPositionStore;

impl PositionStore for NoopPositionStore {
    fn save_position(&mut self, _track_id: &TrackId, _position: Duration) -> Result<()> {
        Ok(())
    }
}

/// Notifier that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&mut self, _notice: Notice) {}
}

/// Platform hooks with every integration disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlatformHooks;

impl PlatformHooks for NoopPlatformHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    struct StaticResolver;

    #[async_trait]
    impl TrackResolver for StaticResolver {
        async fn resolve_playable_url(&self, track: &Track) -> Result<String> {
            if track.audio_ref.is_empty() {
                return Err(CoreError::resolution(track.id.clone(), "empty reference"));
            }
            Ok(format!("https://cdn.test/{}", track.audio_ref))
        }
    }

    #[tokio::test]
    async fn resolver_trait_object_is_usable() {
        let resolver: Box<dyn TrackResolver> = Box::new(StaticResolver);
        let track = Track::new(TrackId::new("x"), "T", "A", "raw/x");
        let url = resolver.resolve_playable_url(&track).await.unwrap();
        assert_eq!(url, "https://cdn.test/raw/x");

        let broken = Track::new(TrackId::new("y"), "T", "A", "");
        assert!(resolver.resolve_playable_url(&broken).await.is_err());
    }

    #[test]
    fn noop_sinks_accept_everything() {
        let track = Track::new(TrackId::new("x"), "T", "A", "raw/x");
        assert!(NoopHistorySink.track_played(&track, Utc::now()).is_ok());
        assert!(NoopPositionStore
            .save_position(&track.id, Duration::from_secs(3))
            .is_ok());
        NoopNotifier.notify(Notice::new(NoticeKind::ConnectionLost, "offline"));
    }
}
