//! Host services that report through the log

use chrono::{DateTime, Utc};
use encore_core::{Notice, NoticeKind, Notifier, PlayHistorySink, PlatformHooks, Track};
use tracing::{debug, info, warn};

/// Toasts become log lines
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, notice: Notice) {
        match notice.kind {
            NoticeKind::ConnectionRestored => info!(kind = ?notice.kind, "{}", notice.message),
            _ => warn!(kind = ?notice.kind, "{}", notice.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct LogHistory;

impl PlayHistorySink for LogHistory {
    fn track_played(&mut self, track: &Track, at: DateTime<Utc>) -> encore_core::Result<()> {
        debug!(track_id = %track.id, at = %at.to_rfc3339(), "play recorded");
        Ok(())
    }
}

/// Now-playing widget and wake lock
#[derive(Debug, Default)]
pub struct LogPlatform;

impl PlatformHooks for LogPlatform {
    fn acquire_wake_lock(&mut self) {
        debug!("wake lock acquired");
    }

    fn release_wake_lock(&mut self) {
        debug!("wake lock released");
    }

    fn update_now_playing(&mut self, track: &Track, playing: bool) {
        debug!(title = %track.display_name(), playing, "now playing");
    }
}
