//! Stall/failure monitor
//!
//! Per-channel state machine:
//! `Healthy -> Suspected (no progress for the stall threshold) -> Retrying
//! (reload + seek + play, attempt++) -> Healthy`, or `Exhausted` once the
//! retry budget is spent. One reducer per event; the session turns the
//! returned [`MonitorAction`] into timers, reloads and skips.

use crate::error::{PlaybackError, Result};
use crate::timer::TimerId;
use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Stall detection, retry and reconnect timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// No progress for this long while playing counts as a stall (default: 10000ms)
    pub stall_threshold_ms: u64,

    /// Liveness check cadence (default: 1000ms)
    pub stall_check_interval_ms: u64,

    /// Retries per track before skipping (default: 3)
    pub max_retries: u32,

    /// Attempt `n` waits `n * backoff_base` (default: 1000ms)
    pub backoff_base_ms: u64,

    /// Delay after reconnecting before skipping a stale stream (default: 1500ms)
    pub reconnect_settle_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            stall_threshold_ms: 10_000,
            stall_check_interval_ms: 1000,
            max_retries: 3,
            backoff_base_ms: 1000,
            reconnect_settle_ms: 1500,
        }
    }
}

impl RecoverySettings {
    /// Stall threshold
    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }

    /// Liveness check cadence
    pub fn stall_check_interval(&self) -> Duration {
        Duration::from_millis(self.stall_check_interval_ms)
    }

    /// Backoff before retry number `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(u64::from(attempt)))
    }

    /// Reconnect settle delay
    pub fn reconnect_settle(&self) -> Duration {
        Duration::from_millis(self.reconnect_settle_ms)
    }

    /// Validate settings
    ///
    /// # Errors
    /// Returns `InvalidOperation` for a zero retry budget or check interval
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(PlaybackError::InvalidOperation(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.stall_check_interval_ms == 0 {
            return Err(PlaybackError::InvalidOperation(
                "stall_check_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Health of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelHealth {
    /// Progress is flowing
    #[default]
    Healthy,
    /// No progress within the threshold
    Suspected,
    /// A retry is scheduled or was just issued
    Retrying,
    /// Retry budget spent
    Exhausted,
}

/// Retry bookkeeping for one channel
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Retries issued for the current track
    pub attempts: u32,
    /// Last time progress advanced (or the liveness clock was restarted)
    pub last_progress: Option<Instant>,
    /// Last observed position
    pub last_position: Duration,
    /// Scheduled retry
    pub pending: Option<TimerId>,
    /// Current health
    pub health: ChannelHealth,
}

/// What the session should do about a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    /// Nothing
    None,
    /// Offline: recovery is suspended until connectivity returns
    Deferred,
    /// Schedule retry number `attempt` after `delay`
    ScheduleRetry {
        /// Attempt number (1-based)
        attempt: u32,
        /// Backoff
        delay: Duration,
    },
    /// Give up on the track and advance
    Exhausted {
        /// Retries that were spent
        attempts: u32,
    },
}

/// Stall/failure monitor for both channels
#[derive(Debug, Clone, Default)]
pub struct StallMonitor {
    settings: RecoverySettings,
    states: [RetryState; 2],
    suspended: bool,
}

impl StallMonitor {
    /// Create a monitor with both channels healthy
    pub fn new(settings: RecoverySettings) -> Self {
        Self {
            settings,
            states: Default::default(),
            suspended: false,
        }
    }

    /// Timing settings
    pub fn settings(&self) -> &RecoverySettings {
        &self.settings
    }

    /// Retry state of `channel`
    pub fn state(&self, channel: ChannelId) -> &RetryState {
        &self.states[channel.index()]
    }

    fn state_mut(&mut self, channel: ChannelId) -> &mut RetryState {
        &mut self.states[channel.index()]
    }

    /// Whether recovery is suspended (offline)
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Progress observed on `channel`
    ///
    /// Returns the pending retry timer to cancel when fresh progress shows
    /// the channel recovered, and resets the attempt counter in that case.
    pub fn on_progress(
        &mut self,
        channel: ChannelId,
        position: Duration,
        now: Instant,
    ) -> Option<TimerId> {
        let state = self.state_mut(channel);
        if position == state.last_position && state.last_progress.is_some() {
            return None;
        }
        state.last_position = position;
        state.last_progress = Some(now);

        if state.health == ChannelHealth::Healthy && state.attempts == 0 {
            return None;
        }
        state.attempts = 0;
        state.health = ChannelHealth::Healthy;
        state.pending.take()
    }

    /// Error or stall reported on `channel`
    pub fn on_failure(&mut self, channel: ChannelId) -> MonitorAction {
        if self.suspended {
            return MonitorAction::Deferred;
        }
        let max = self.settings.max_retries;
        let state = &mut self.states[channel.index()];

        // One incident often produces error and stalled back to back
        if state.pending.is_some() {
            return MonitorAction::None;
        }

        if state.attempts < max {
            state.attempts += 1;
            state.health = ChannelHealth::Retrying;
            MonitorAction::ScheduleRetry {
                attempt: state.attempts,
                delay: self.settings.backoff(state.attempts),
            }
        } else {
            state.health = ChannelHealth::Exhausted;
            MonitorAction::Exhausted {
                attempts: state.attempts,
            }
        }
    }

    /// Remember the scheduled retry timer
    pub fn set_pending(&mut self, channel: ChannelId, timer: TimerId) {
        self.state_mut(channel).pending = Some(timer);
    }

    /// Periodic liveness check
    ///
    /// `expected_playing` is false while paused, loading or otherwise not
    /// supposed to make progress.
    pub fn check_liveness(
        &mut self,
        channel: ChannelId,
        expected_playing: bool,
        now: Instant,
    ) -> MonitorAction {
        if self.suspended || !expected_playing {
            self.touch(channel, now);
            return MonitorAction::None;
        }
        let threshold = self.settings.stall_threshold();
        let state = self.state_mut(channel);
        if state.pending.is_some() {
            return MonitorAction::None;
        }
        let Some(last) = state.last_progress else {
            state.last_progress = Some(now);
            return MonitorAction::None;
        };
        if now.saturating_duration_since(last) < threshold {
            return MonitorAction::None;
        }
        state.health = ChannelHealth::Suspected;
        self.on_failure(channel)
    }

    /// Retry timer fired. Returns `true` if it was the pending one.
    ///
    /// Restarts the liveness clock so the reload gets a full threshold.
    pub fn retry_fired(&mut self, channel: ChannelId, timer: TimerId, now: Instant) -> bool {
        let state = self.state_mut(channel);
        if state.pending != Some(timer) {
            return false;
        }
        state.pending = None;
        state.last_progress = Some(now);
        true
    }

    /// Restart the liveness clock without touching attempts
    pub fn touch(&mut self, channel: ChannelId, now: Instant) {
        self.state_mut(channel).last_progress = Some(now);
    }

    /// Forget everything about `channel` (track change)
    ///
    /// Returns the pending retry timer, if any, for the caller to cancel.
    pub fn reset(&mut self, channel: ChannelId) -> Option<TimerId> {
        std::mem::take(self.state_mut(channel)).pending
    }

    /// Reset both channels
    pub fn reset_all(&mut self) -> Vec<TimerId> {
        [ChannelId::A, ChannelId::B]
            .into_iter()
            .filter_map(|ch| self.reset(ch))
            .collect()
    }

    /// Going offline: drop pending retries and defer all failures
    ///
    /// Returns the retry timers to cancel. Attempt counters are kept.
    pub fn suspend(&mut self) -> Vec<TimerId> {
        self.suspended = true;
        self.states
            .iter_mut()
            .filter_map(|s| {
                if s.health == ChannelHealth::Retrying {
                    s.health = ChannelHealth::Suspected;
                }
                s.pending.take()
            })
            .collect()
    }

    /// Back online: failures are handled again with a fresh liveness window
    pub fn resume(&mut self, now: Instant) {
        self.suspended = false;
        for state in &mut self.states {
            state.last_progress = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ChannelId = ChannelId::A;

    #[test]
    fn retries_back_off_linearly_then_exhaust() {
        let mut monitor = StallMonitor::default();
        let now = Instant::now();

        for attempt in 1..=3 {
            let action = monitor.on_failure(A);
            assert_eq!(
                action,
                MonitorAction::ScheduleRetry {
                    attempt,
                    delay: Duration::from_secs(u64::from(attempt)),
                }
            );
            monitor.set_pending(A, TimerId(u64::from(attempt)));
            assert!(monitor.retry_fired(A, TimerId(u64::from(attempt)), now));
        }

        assert_eq!(monitor.on_failure(A), MonitorAction::Exhausted { attempts: 3 });
        assert_eq!(monitor.state(A).health, ChannelHealth::Exhausted);

        monitor.reset(A);
        assert_eq!(monitor.state(A).attempts, 0);
    }

    #[test]
    fn failure_while_retry_pending_is_absorbed() {
        let mut monitor = StallMonitor::default();
        assert!(matches!(monitor.on_failure(A), MonitorAction::ScheduleRetry { .. }));
        monitor.set_pending(A, TimerId(1));

        assert_eq!(monitor.on_failure(A), MonitorAction::None);
        assert_eq!(monitor.state(A).attempts, 1);
    }

    #[test]
    fn fresh_progress_resets_attempts() {
        let mut monitor = StallMonitor::default();
        let now = Instant::now();
        monitor.on_progress(A, Duration::from_secs(40), now);
        monitor.on_failure(A);
        monitor.set_pending(A, TimerId(1));
        monitor.retry_fired(A, TimerId(1), now);

        // Same position: not fresh
        assert!(monitor.on_progress(A, Duration::from_secs(40), now).is_none());
        assert_eq!(monitor.state(A).attempts, 1);

        monitor.on_progress(A, Duration::from_secs(41), now);
        assert_eq!(monitor.state(A).attempts, 0);
        assert_eq!(monitor.state(A).health, ChannelHealth::Healthy);
    }

    #[test]
    fn recovery_while_retry_pending_hands_back_timer() {
        let mut monitor = StallMonitor::default();
        let now = Instant::now();
        monitor.on_progress(A, Duration::from_secs(1), now);
        monitor.on_failure(A);
        monitor.set_pending(A, TimerId(9));

        assert_eq!(monitor.on_progress(A, Duration::from_secs(2), now), Some(TimerId(9)));
        assert!(monitor.state(A).pending.is_none());
    }

    #[test]
    fn liveness_detects_stall_after_threshold() {
        let mut monitor = StallMonitor::default();
        let start = Instant::now();
        monitor.on_progress(A, Duration::from_secs(3), start);

        let secs = Duration::from_secs;
        assert_eq!(monitor.check_liveness(A, true, start + secs(9)), MonitorAction::None);
        assert!(matches!(
            monitor.check_liveness(A, true, start + secs(10)),
            MonitorAction::ScheduleRetry { attempt: 1, .. }
        ));
    }

    #[test]
    fn liveness_ignores_paused_channel() {
        let mut monitor = StallMonitor::default();
        let start = Instant::now();
        monitor.on_progress(A, Duration::from_secs(3), start);
        let later = start + Duration::from_secs(60);
        assert_eq!(monitor.check_liveness(A, false, later), MonitorAction::None);
        assert_eq!(
            monitor.check_liveness(A, true, later + Duration::from_secs(1)),
            MonitorAction::None
        );
    }

    #[test]
    fn offline_defers_everything() {
        let mut monitor = StallMonitor::default();
        monitor.on_failure(A);
        monitor.set_pending(A, TimerId(4));

        assert_eq!(monitor.suspend(), vec![TimerId(4)]);
        assert_eq!(monitor.on_failure(A), MonitorAction::Deferred);
        assert_eq!(monitor.on_failure(ChannelId::B), MonitorAction::Deferred);
        assert_eq!(monitor.state(ChannelId::B).attempts, 0);

        monitor.resume(Instant::now());
        assert!(!monitor.is_suspended());
        assert!(matches!(monitor.on_failure(A), MonitorAction::ScheduleRetry { attempt: 2, .. }));
    }

    #[test]
    fn zero_retries_rejected() {
        let settings = RecoverySettings {
            max_retries: 0,
            ..RecoverySettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
