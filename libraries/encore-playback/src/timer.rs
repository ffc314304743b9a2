//! Cancellable timers keyed to track identity
//!
//! Every long wait (crossfade ramp, stall checks, retry backoff, reconnect
//! settle) is an entry here. Each entry captures the [`PlaybackToken`] that
//! was current when it was scheduled; the session discards entries whose
//! token no longer matches when they come due.

use crate::types::ChannelId;
use std::time::Instant;

/// Identity of one "current track" instance
///
/// Bumped on every track change, including a replay of the same track id
/// through a new transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PlaybackToken(u64);

impl PlaybackToken {
    /// Next token in sequence
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw value (logging)
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Handle for a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Next crossfade ramp step
    CrossfadeStep,
    /// End of the post-swap settle delay
    CrossfadeSettle,
    /// Periodic liveness check of the active channel
    StallCheck,
    /// Retry backoff elapsed for a channel
    Retry(ChannelId),
    /// Settle delay after connectivity came back
    ReconnectSettle,
}

/// A scheduled entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    /// Handle
    pub id: TimerId,
    /// What to do
    pub kind: TimerKind,
    /// Track identity at scheduling time
    pub token: PlaybackToken,
    /// When it is due
    pub deadline: Instant,
}

/// Deadline-ordered timer set
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<Timer>,
    next_id: u64,
}

impl TimerQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` at `deadline` on behalf of `token`
    pub fn schedule(&mut self, kind: TimerKind, token: PlaybackToken, deadline: Instant) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push(Timer {
            id,
            kind,
            token,
            deadline,
        });
        id
    }

    /// Cancel a timer. Returns `true` if it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|t| t.id != id);
        self.entries.len() != before
    }

    /// Cancel every timer matching `predicate`, returning how many were dropped
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&Timer) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|t| !predicate(t));
        before - self.entries.len()
    }

    /// Whether a timer is still pending
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.iter().any(|t| t.id == id)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|t| t.deadline).min()
    }

    /// Remove and return the earliest timer due at or before `now`
    ///
    /// Ties resolve in scheduling order.
    pub fn pop_due(&mut self, now: Instant) -> Option<Timer> {
        let (index, _) = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| (t.deadline, t.id.0))?;
        Some(self.entries.remove(index))
    }

    /// Number of pending timers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything (session teardown)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
