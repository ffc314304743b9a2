//! Crossfade scheduling between the two decks
//!
//! Linear gain ramp: over `steps` timer ticks the outgoing channel fades
//! from its current volume to 0 while the primed incoming channel rises from
//! 0 to the user's target volume. Both ramps use the same step index, so they
//! are always complementary in time.
//!
//! State machine:
//! - `Idle`: normal playback, nothing staged
//! - `Priming`: next track staged, window not yet reached
//! - `Fading`: ramp running
//! - `Swapping`: active tag flipped, waiting out the settle delay
//!
//! The scheduler only decides and computes; the session applies volumes,
//! owns the timers and performs the swap.

use crate::error::{PlaybackError, Result};
use crate::timer::{PlaybackToken, TimerId};
use crate::types::ChannelId;
use encore_core::{RepeatMode, Track};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Longest crossfade accepted by [`CrossfadeSettings::validate`]
pub const MAX_CROSSFADE_MS: u64 = 30_000;

/// Crossfade settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossfadeSettings {
    /// Whether crossfade is enabled
    pub enabled: bool,

    /// Ramp duration in milliseconds (default: 5000)
    pub duration_ms: u64,

    /// Number of ramp steps (default: 50)
    pub steps: u32,

    /// Minimum remaining time for a fade to start (default: 500ms)
    ///
    /// Keeps a just-started track whose duration has not stabilized from
    /// triggering a fade.
    pub trigger_epsilon_ms: u64,

    /// Minimum time between two swaps (default: 10000ms)
    pub swap_cooldown_ms: u64,

    /// Pause after a swap before the scheduler goes idle (default: 300ms)
    pub settle_delay_ms: u64,
}

impl Default for CrossfadeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 5000,
            steps: 50,
            trigger_epsilon_ms: 500,
            swap_cooldown_ms: 10_000,
            settle_delay_ms: 300,
        }
    }
}

impl CrossfadeSettings {
    /// Create enabled settings with a specific duration
    pub fn with_duration(duration_ms: u64) -> Self {
        Self {
            duration_ms: duration_ms.min(MAX_CROSSFADE_MS),
            ..Self::default()
        }
    }

    /// Ramp duration
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Time between two ramp steps
    pub fn step_interval(&self) -> Duration {
        self.duration() / self.steps.max(1)
    }

    /// Trigger guard
    pub fn trigger_epsilon(&self) -> Duration {
        Duration::from_millis(self.trigger_epsilon_ms)
    }

    /// Cooldown between swaps
    pub fn swap_cooldown(&self) -> Duration {
        Duration::from_millis(self.swap_cooldown_ms)
    }

    /// Post-swap settle delay
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Validate settings
    ///
    /// # Errors
    /// Returns `InvalidOperation` for zero steps or an overlong ramp
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(PlaybackError::InvalidOperation(
                "crossfade steps must be at least 1".to_string(),
            ));
        }
        if self.duration_ms > MAX_CROSSFADE_MS {
            return Err(PlaybackError::InvalidOperation(format!(
                "crossfade duration_ms must be at most {MAX_CROSSFADE_MS}, got {}",
                self.duration_ms
            )));
        }
        Ok(())
    }
}

/// A running fade
#[derive(Debug, Clone)]
pub struct CrossfadeTransition {
    /// Channel fading out (the active one when the fade began)
    pub from: ChannelId,
    /// Channel fading in (holds the staged preload)
    pub to: ChannelId,
    /// Incoming track
    pub track: Track,
    /// Outgoing channel volume when the fade began
    pub start_volume: f32,
    /// Volume the incoming channel ends at
    pub target_volume: f32,
    /// Total steps
    pub steps: u32,
    /// Steps applied so far
    pub step: u32,
    /// Pending step timer
    pub timer: Option<TimerId>,
    /// Identity of the outgoing track instance
    pub token: PlaybackToken,
}

impl CrossfadeTransition {
    /// Gains for step `k`: `(outgoing, incoming)`
    ///
    /// The final step yields exactly `(0.0, target_volume)`.
    pub fn gains_at(&self, k: u32) -> (f32, f32) {
        let steps = self.steps.max(1);
        if k >= steps {
            return (0.0, self.target_volume);
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = k as f32 / steps as f32;
        (
            self.start_volume * (1.0 - fraction),
            self.target_volume * fraction,
        )
    }

    /// Fraction of the ramp applied (0.0-1.0)
    pub fn progress(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let progress = self.step as f32 / self.steps.max(1) as f32;
        progress.min(1.0)
    }
}

/// One applied ramp step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampStep {
    /// Step index (1-based)
    pub step: u32,
    /// Volume for the outgoing channel
    pub outgoing: f32,
    /// Volume for the incoming channel
    pub incoming: f32,
    /// Whether this was the last step (swap now)
    pub finished: bool,
}

/// Scheduler phase
#[derive(Debug, Clone, Default)]
pub enum CrossfadePhase {
    /// Nothing staged
    #[default]
    Idle,
    /// Next track staged, waiting for the window
    Priming,
    /// Ramp running
    Fading(CrossfadeTransition),
    /// Swap done, settling
    Swapping {
        /// Settle timer
        settle: TimerId,
    },
}

/// Crossfade state machine
///
/// All the flags a fade needs (in progress, staged, last swap) live in this
/// one value.
#[derive(Debug, Clone, Default)]
pub struct CrossfadeScheduler {
    settings: CrossfadeSettings,
    phase: CrossfadePhase,
    last_swap: Option<Instant>,
}

impl CrossfadeScheduler {
    /// Create an idle scheduler
    pub fn new(settings: CrossfadeSettings) -> Self {
        Self {
            settings,
            phase: CrossfadePhase::Idle,
            last_swap: None,
        }
    }

    /// Current settings
    pub fn settings(&self) -> &CrossfadeSettings {
        &self.settings
    }

    /// Enable or disable crossfading
    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
    }

    /// Whether crossfading is enabled
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Current phase
    pub fn phase(&self) -> &CrossfadePhase {
        &self.phase
    }

    /// Whether a ramp is running
    pub fn is_fading(&self) -> bool {
        matches!(self.phase, CrossfadePhase::Fading(_))
    }

    /// Whether the scheduler is between swap and idle
    pub fn is_swapping(&self) -> bool {
        matches!(self.phase, CrossfadePhase::Swapping { .. })
    }

    /// Fading or swapping
    pub fn is_busy(&self) -> bool {
        self.is_fading() || self.is_swapping()
    }

    /// Running transition, if any
    pub fn transition(&self) -> Option<&CrossfadeTransition> {
        match &self.phase {
            CrossfadePhase::Fading(t) => Some(t),
            _ => None,
        }
    }

    /// When the last swap happened
    pub fn last_swap(&self) -> Option<Instant> {
        self.last_swap
    }

    /// Track whether a preload is staged (`Idle` <-> `Priming`)
    ///
    /// No effect while fading or swapping.
    pub fn set_primed(&mut self, primed: bool) {
        match self.phase {
            CrossfadePhase::Idle if primed => self.phase = CrossfadePhase::Priming,
            CrossfadePhase::Priming if !primed => self.phase = CrossfadePhase::Idle,
            _ => {}
        }
    }

    /// Whether the cooldown since the last swap has elapsed
    pub fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_swap
            .map_or(true, |at| now.saturating_duration_since(at) >= self.settings.swap_cooldown())
    }

    /// Whether a fade should begin now
    ///
    /// Requires crossfade on, repeat-one off, a staged preload, no fade in
    /// progress, the cooldown elapsed and
    /// `epsilon < remaining <= duration`.
    pub fn should_start(
        &self,
        remaining: Duration,
        preload_staged: bool,
        repeat: RepeatMode,
        now: Instant,
    ) -> bool {
        self.settings.enabled
            && repeat != RepeatMode::One
            && preload_staged
            && !self.is_busy()
            && remaining <= self.settings.duration()
            && remaining > self.settings.trigger_epsilon()
            && self.cooldown_elapsed(now)
    }

    /// Enter `Fading`
    pub fn begin(&mut self, transition: CrossfadeTransition) {
        self.phase = CrossfadePhase::Fading(transition);
    }

    /// Remember the pending step timer
    pub fn set_step_timer(&mut self, timer: TimerId) {
        if let CrossfadePhase::Fading(t) = &mut self.phase {
            t.timer = Some(timer);
        }
    }

    /// Advance the ramp by one step
    ///
    /// Returns `None` when no fade is running.
    pub fn next_step(&mut self) -> Option<RampStep> {
        let CrossfadePhase::Fading(t) = &mut self.phase else {
            return None;
        };
        t.timer = None;
        t.step = (t.step + 1).min(t.steps.max(1));
        let (outgoing, incoming) = t.gains_at(t.step);
        Some(RampStep {
            step: t.step,
            outgoing,
            incoming,
            finished: t.step >= t.steps.max(1),
        })
    }

    /// Point both ramps at a new user volume
    ///
    /// The incoming ramp ends at `target_volume`; the outgoing ramp never
    /// starts above it, so muting silences both decks. Returns the
    /// `(outgoing, incoming)` gains for the current step.
    pub fn retarget(&mut self, target_volume: f32) -> Option<(f32, f32)> {
        let CrossfadePhase::Fading(t) = &mut self.phase else {
            return None;
        };
        t.target_volume = target_volume;
        t.start_volume = t.start_volume.min(target_volume);
        Some(t.gains_at(t.step))
    }

    /// Leave `Fading` for `Swapping`, returning the completed transition
    pub fn complete(&mut self, settle: TimerId, now: Instant) -> Option<CrossfadeTransition> {
        if !self.is_fading() {
            return None;
        }
        let CrossfadePhase::Fading(transition) =
            std::mem::replace(&mut self.phase, CrossfadePhase::Swapping { settle })
        else {
            return None;
        };
        self.last_swap = Some(now);
        Some(transition)
    }

    /// Settle timer fired. Returns `true` if it was ours.
    pub fn settle_elapsed(&mut self, timer: TimerId) -> bool {
        match self.phase {
            CrossfadePhase::Swapping { settle } if settle == timer => {
                self.phase = CrossfadePhase::Idle;
                true
            }
            _ => false,
        }
    }

    /// Discard any fade or settle state, returning the abandoned phase
    ///
    /// The caller cancels the returned timers and restores channel volumes.
    pub fn cancel(&mut self) -> CrossfadePhase {
        std::mem::take(&mut self.phase)
    }
}
