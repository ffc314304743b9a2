//! Event feed and run summary

use encore_playback::{PlaybackEvent, TransitionKind};
use tracing::{debug, info, warn};

/// Tally of what happened during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub tracks_started: usize,
    pub crossfades: usize,
    pub hard_swaps: usize,
    pub skips_after_failure: usize,
    pub reconnect_advances: usize,
    pub cancelled_fades: usize,
    pub retries: usize,
    pub errors: usize,
    pub queue_ended: bool,
}

impl Summary {
    pub fn record(&mut self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::TrackChanged { kind, .. } => {
                self.tracks_started += 1;
                match kind {
                    TransitionKind::Crossfade => self.crossfades += 1,
                    TransitionKind::HardSwap => self.hard_swaps += 1,
                    TransitionKind::Failure => self.skips_after_failure += 1,
                    TransitionKind::Reconnect => self.reconnect_advances += 1,
                    _ => {}
                }
            }
            PlaybackEvent::CrossfadeCancelled => self.cancelled_fades += 1,
            PlaybackEvent::RetryScheduled { .. } => self.retries += 1,
            PlaybackEvent::Error { .. } => self.errors += 1,
            PlaybackEvent::QueueEnded => self.queue_ended = true,
            _ => {}
        }
    }
}

/// Write one event to the log
///
/// Position and ramp updates are chatty and only show at debug level.
pub fn log_event(event: &PlaybackEvent) {
    match event {
        PlaybackEvent::PositionUpdate {
            position_ms,
            duration_ms,
        } => debug!(position_ms, ?duration_ms, "position"),
        PlaybackEvent::CrossfadeProgress { progress } => debug!(progress, "crossfade progress"),
        PlaybackEvent::StateChanged { state } => info!(?state, "state changed"),
        PlaybackEvent::TrackChanged {
            track_id,
            previous_track_id,
            kind,
        } => info!(track_id, ?previous_track_id, ?kind, "track changed"),
        PlaybackEvent::CrossfadeStarted {
            from_track_id,
            to_track_id,
            duration_ms,
        } => info!(from_track_id, to_track_id, duration_ms, "crossfade started"),
        PlaybackEvent::CrossfadeCompleted { active } => {
            info!(active = %active, "crossfade completed");
        }
        PlaybackEvent::NextTrackPrepared { track_id } => info!(track_id, "next track prepared"),
        PlaybackEvent::VolumeChanged { level, is_muted } => {
            info!(level, is_muted, "volume changed");
        }
        PlaybackEvent::RetryScheduled {
            channel,
            attempt,
            delay_ms,
        } => warn!(channel = %channel, attempt, delay_ms, "retry scheduled"),
        PlaybackEvent::ConnectivityChanged { online } => info!(online, "connectivity changed"),
        PlaybackEvent::Error { message } => warn!(message, "playback error"),
        other => info!(event = other.name(), "playback event"),
    }
}
