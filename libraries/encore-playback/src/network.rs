//! Network recovery controller
//!
//! Tracks connectivity transitions. Going offline snapshots whether the
//! active deck was actually playing; coming back either schedules a settle
//! delay and a single skip (the old stream is assumed stale) or only tells
//! the user connectivity is back.

use crate::timer::TimerId;
use std::time::{Duration, Instant};

/// Connectivity as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Online
    #[default]
    Online,
    /// Offline since `since`
    Offline {
        /// When connectivity dropped
        since: Instant,
        /// Whether the active deck was producing audio at that instant
        was_playing: bool,
    },
}

/// What to do on reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Was idle when the connection dropped: notify only
    NotifyOnly {
        /// Time spent offline
        offline_for: Duration,
    },
    /// Was playing: wait out the settle delay, then advance once
    SettleThenAdvance {
        /// Time spent offline
        offline_for: Duration,
    },
}

/// Connectivity state plus the pending reconnect settle timer
#[derive(Debug, Clone, Default)]
pub struct NetworkRecovery {
    connectivity: Connectivity,
    settle: Option<TimerId>,
}

impl NetworkRecovery {
    /// Start online
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connectivity
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Whether online
    pub fn is_online(&self) -> bool {
        matches!(self.connectivity, Connectivity::Online)
    }

    /// Transition to offline
    ///
    /// Returns `None` if already offline. Otherwise returns the pending
    /// settle timer (if any) wrapped in `Some`, for the caller to cancel.
    pub fn go_offline(&mut self, now: Instant, was_playing: bool) -> Option<Option<TimerId>> {
        if !self.is_online() {
            return None;
        }
        self.connectivity = Connectivity::Offline {
            since: now,
            was_playing,
        };
        Some(self.settle.take())
    }

    /// Transition to online. Returns `None` if already online.
    pub fn go_online(&mut self, now: Instant) -> Option<ReconnectAction> {
        let Connectivity::Offline { since, was_playing } = self.connectivity else {
            return None;
        };
        self.connectivity = Connectivity::Online;
        let offline_for = now.saturating_duration_since(since);
        Some(if was_playing {
            ReconnectAction::SettleThenAdvance { offline_for }
        } else {
            ReconnectAction::NotifyOnly { offline_for }
        })
    }

    /// Remember the settle timer
    pub fn set_settle(&mut self, timer: TimerId) {
        self.settle = Some(timer);
    }

    /// Settle timer fired. Returns `true` if it is ours and we are still online.
    pub fn settle_elapsed(&mut self, timer: TimerId) -> bool {
        if self.settle != Some(timer) {
            return false;
        }
        self.settle = None;
        self.is_online()
    }

    /// The user paused: a reconnect must not restart playback
    ///
    /// Clears the playing snapshot while offline and hands back a pending
    /// settle timer for the caller to cancel.
    pub fn user_paused(&mut self) -> Option<TimerId> {
        if let Connectivity::Offline { was_playing, .. } = &mut self.connectivity {
            *was_playing = false;
        }
        self.settle.take()
    }

    /// Drop the settle timer (track changed by another path)
    pub fn take_settle(&mut self) -> Option<TimerId> {
        self.settle.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_transitions_are_noops() {
        let mut net = NetworkRecovery::new();
        let now = Instant::now();
        assert!(net.go_online(now).is_none());
        assert!(net.go_offline(now, true).is_some());
        assert!(net.go_offline(now, false).is_none());
        assert_eq!(
            net.connectivity(),
            Connectivity::Offline {
                since: now,
                was_playing: true
            }
        );
    }

    #[test]
    fn reconnect_depends_on_playing_snapshot() {
        let mut net = NetworkRecovery::new();
        let now = Instant::now();
        let later = now + Duration::from_secs(30);

        net.go_offline(now, true);
        assert_eq!(
            net.go_online(later),
            Some(ReconnectAction::SettleThenAdvance {
                offline_for: Duration::from_secs(30)
            })
        );

        net.go_offline(later, false);
        assert!(matches!(net.go_online(later), Some(ReconnectAction::NotifyOnly { .. })));
    }

    #[test]
    fn going_offline_hands_back_settle_timer() {
        let mut net = NetworkRecovery::new();
        let now = Instant::now();
        net.go_offline(now, true);
        net.go_online(now);
        net.set_settle(TimerId(3));

        assert_eq!(net.go_offline(now, true), Some(Some(TimerId(3))));
        assert!(!net.settle_elapsed(TimerId(3)));
    }

    #[test]
    fn pause_while_offline_downgrades_reconnect() {
        let mut net = NetworkRecovery::new();
        let now = Instant::now();
        net.go_offline(now, true);

        assert_eq!(net.user_paused(), None);
        assert!(matches!(net.go_online(now), Some(ReconnectAction::NotifyOnly { .. })));

        net.set_settle(TimerId(8));
        assert_eq!(net.user_paused(), Some(TimerId(8)));
        assert!(!net.settle_elapsed(TimerId(8)));
    }

    #[test]
    fn settle_only_counts_while_online() {
        let mut net = NetworkRecovery::new();
        net.set_settle(TimerId(5));
        assert!(!net.settle_elapsed(TimerId(6)));
        assert!(net.settle_elapsed(TimerId(5)));
        assert!(!net.settle_elapsed(TimerId(5)));
    }
}
