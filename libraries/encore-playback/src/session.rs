//! Playback session - core orchestration
//!
//! Owns both decks, the queue, the crossfade scheduler, the stall monitor,
//! network recovery and the timer queue. Every input (user command, media
//! event, timer, resolution result, platform signal) is a method taking the
//! current instant; nothing here sleeps, spawns or locks.
//!
//! Every change of the current track goes through
//! `commit_transition`, which cancels competing work and
//! bumps the [`PlaybackToken`] so late timers and resolutions are dropped.

use crate::{
    channel::{Decks, MediaBackend, MediaEvent},
    crossfade::{CrossfadePhase, CrossfadeScheduler, CrossfadeTransition},
    error::{PlaybackError, Result},
    events::{PlaybackEvent, TransitionKind},
    history::History,
    monitor::{MonitorAction, RetryState, StallMonitor},
    network::{Connectivity, NetworkRecovery, ReconnectAction},
    preload::{PreloadBuffer, Preloader},
    timer::{PlaybackToken, Timer, TimerId, TimerKind, TimerQueue},
    types::{ChannelId, PlaybackConfig, PlaybackState, RequestId, ResolvePurpose, ResolveRequest},
    volume::Volume,
};
use chrono::Utc;
use encore_core::{
    CoreError, NoopHistorySink, NoopNotifier, NoopPlatformHooks, NoopPositionStore, Notice,
    NoticeKind, Notifier, PlatformHooks, PlayHistorySink, PositionStore, QueueContext,
    QueueProvider, RepeatMode, Track, TrackId,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// External collaborators the session reports to
///
/// All of them are optional integrations; failures are logged and ignored.
pub struct Services {
    /// "Track played" telemetry
    pub history: Box<dyn PlayHistorySink>,
    /// Resume-on-reload positions
    pub positions: Box<dyn PositionStore>,
    /// Toasts
    pub notifier: Box<dyn Notifier>,
    /// Wake lock and now-playing widget
    pub platform: Box<dyn PlatformHooks>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            history: Box::new(NoopHistorySink),
            positions: Box::new(NoopPositionStore),
            notifier: Box::new(NoopNotifier),
            platform: Box::new(NoopPlatformHooks),
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// User command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Toggle between playing and paused
    PlayPause,
    /// Start or resume
    Play,
    /// Pause
    Pause,
    /// Skip forward
    Next,
    /// Restart or go back
    Previous,
    /// Seek within the current track
    Seek(Duration),
    /// Toggle shuffle
    ToggleShuffle,
    /// Cycle repeat mode
    ToggleRepeat,
    /// Toggle crossfade
    ToggleCrossfade,
    /// Set user volume (0.0-1.0)
    SetVolume(f32),
    /// Toggle mute
    ToggleMute,
    /// Replace the playback context and start playing
    LoadQueue {
        /// New context
        tracks: Vec<Track>,
        /// Track to start at (first pick when absent)
        start: Option<TrackId>,
    },
}

/// System media key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    /// Play/pause toggle key
    PlayPause,
    /// Play key
    Play,
    /// Pause key
    Pause,
    /// Next track key
    Next,
    /// Previous track key
    Previous,
}

/// The continuous playback session
pub struct PlaybackSession {
    config: PlaybackConfig,
    decks: Decks,
    queue: Box<dyn QueueProvider>,
    history: History,
    volume: Volume,
    shuffle: bool,
    repeat: RepeatMode,
    state: PlaybackState,

    current: Option<Track>,
    token: PlaybackToken,
    played_reported: bool,
    last_persist: Option<Instant>,

    preloader: Preloader,
    crossfade: CrossfadeScheduler,
    monitor: StallMonitor,
    network: NetworkRecovery,
    timers: TimerQueue,
    stall_timer: Option<TimerId>,

    next_request: u64,
    play_request: Option<RequestId>,
    outstanding: HashMap<RequestId, (PlaybackToken, ResolvePurpose)>,
    requests: Vec<ResolveRequest>,

    pending_events: Vec<PlaybackEvent>,
    visible: bool,
    wake_lock: bool,
    services: Services,
}

impl PlaybackSession {
    /// Create a session over two deck backends and a queue provider
    ///
    /// # Errors
    /// Returns `InvalidOperation` if the configuration does not validate
    pub fn new(
        config: PlaybackConfig,
        deck_a: Box<dyn MediaBackend>,
        deck_b: Box<dyn MediaBackend>,
        queue: Box<dyn QueueProvider>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decks: Decks::new(deck_a, deck_b),
            queue,
            history: History::new(config.history_size),
            volume: Volume::new(config.initial_volume),
            shuffle: config.shuffle,
            repeat: config.repeat,
            state: PlaybackState::Stopped,
            current: None,
            token: PlaybackToken::default(),
            played_reported: false,
            last_persist: None,
            preloader: Preloader::new(config.preload.clone()),
            crossfade: CrossfadeScheduler::new(config.crossfade.clone()),
            monitor: StallMonitor::new(config.recovery.clone()),
            network: NetworkRecovery::new(),
            timers: TimerQueue::new(),
            stall_timer: None,
            next_request: 0,
            play_request: None,
            outstanding: HashMap::new(),
            requests: Vec::new(),
            pending_events: Vec::new(),
            visible: true,
            wake_lock: false,
            services: Services::default(),
            config,
        })
    }

    /// Attach external collaborators
    #[must_use]
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    // ===== Commands =====

    /// Apply a user command
    ///
    /// # Errors
    /// Propagates the error of the underlying command
    pub fn apply(&mut self, command: Command, now: Instant) -> Result<()> {
        match command {
            Command::PlayPause => self.play_pause(now),
            Command::Play => self.play(now),
            Command::Pause => {
                self.pause(now);
                Ok(())
            }
            Command::Next => self.next(now),
            Command::Previous => self.previous(now),
            Command::Seek(position) => self.seek(position, now),
            Command::ToggleShuffle => {
                self.toggle_shuffle();
                Ok(())
            }
            Command::ToggleRepeat => {
                self.toggle_repeat();
                Ok(())
            }
            Command::ToggleCrossfade => {
                self.toggle_crossfade();
                Ok(())
            }
            Command::SetVolume(level) => {
                self.set_volume(level);
                Ok(())
            }
            Command::ToggleMute => {
                self.toggle_mute();
                Ok(())
            }
            Command::LoadQueue { tracks, start } => self.load_queue(tracks, start.as_ref(), now),
        }
    }

    /// Replace the playback context and start playing at `start`
    ///
    /// # Errors
    /// `QueueEmpty` for an empty list, `InvalidOperation` if `start` is not in it
    pub fn load_queue(&mut self, tracks: Vec<Track>, start: Option<&TrackId>, now: Instant) -> Result<()> {
        if tracks.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }
        info!(tracks = tracks.len(), "loading queue");
        self.queue.load(tracks);
        let track = match start {
            Some(id) => self.queue.select(id).ok_or_else(|| {
                PlaybackError::InvalidOperation(format!("track {id} is not in the queue"))
            })?,
            None => {
                let ctx = self.queue_context();
                self.queue.advance(&ctx).ok_or(PlaybackError::QueueEmpty)?
            }
        };
        self.commit_transition(track, TransitionKind::Start, now);
        Ok(())
    }

    /// Toggle play/pause; starts the queue when nothing is current
    ///
    /// # Errors
    /// `QueueEmpty` when there is nothing to start
    pub fn play_pause(&mut self, now: Instant) -> Result<()> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Loading => {
                self.pause(now);
                Ok(())
            }
            PlaybackState::Paused | PlaybackState::Stopped => self.play(now),
        }
    }

    /// Start or resume playback
    ///
    /// # Errors
    /// `QueueEmpty` when nothing is current and the queue has nothing to start
    pub fn play(&mut self, now: Instant) -> Result<()> {
        let Some(track_id) = self.current.as_ref().map(|t| t.id.clone()) else {
            let ctx = self.queue_context();
            let track = self.queue.advance(&ctx).ok_or(PlaybackError::QueueEmpty)?;
            self.commit_transition(track, TransitionKind::Start, now);
            return Ok(());
        };

        match self.state {
            PlaybackState::Playing | PlaybackState::Loading => Ok(()),
            PlaybackState::Paused | PlaybackState::Stopped => {
                if self.decks.active().holds(&track_id) {
                    if self.state == PlaybackState::Stopped {
                        self.decks.active_mut().seek(Duration::ZERO);
                    }
                    self.start_active(now);
                } else {
                    if self.play_request.is_none() {
                        self.request_play_resolution();
                    }
                    self.set_state(PlaybackState::Loading);
                }
                Ok(())
            }
        }
    }

    /// Pause playback
    ///
    /// Pausing mid-fade cancels the fade but keeps the staged track; the
    /// fade re-triggers on a later tick if its conditions still hold. A
    /// pending reconnect advance is dropped.
    pub fn pause(&mut self, _now: Instant) {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Loading) {
            return;
        }
        if let Some(settle) = self.network.user_paused() {
            debug!("reconnect advance cancelled by pause");
            self.timers.cancel(settle);
        }
        self.cancel_crossfade(true);
        self.decks.active_mut().pause();
        self.set_state(PlaybackState::Paused);
        if let Some(track) = &self.current {
            self.services.platform.update_now_playing(track, false);
        }
    }

    /// Skip to the next track
    ///
    /// Cancels any fade or preload in flight and loads the next track on the
    /// active deck.
    ///
    /// # Errors
    /// `QueueEmpty` when the queue has no tracks
    pub fn next(&mut self, now: Instant) -> Result<()> {
        if self.queue.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }
        self.cancel_crossfade(false);
        self.discard_preload();
        // A stable pick made for preloading is still the right answer here
        let ctx = self.queue_context();
        match self.queue.advance(&ctx) {
            Some(track) => self.commit_transition(track, TransitionKind::Skip, now),
            None => self.finish_queue(),
        }
        Ok(())
    }

    /// Restart the current track or go back
    ///
    /// Further in than the restart threshold, the track restarts. Otherwise
    /// the most recent history entry becomes current again.
    ///
    /// # Errors
    /// `NoTrackLoaded` when nothing is current
    pub fn previous(&mut self, now: Instant) -> Result<()> {
        if self.current.is_none() {
            return Err(PlaybackError::NoTrackLoaded);
        }
        if self.position() > self.config.restart_threshold() {
            debug!("previous: restarting current track");
            return self.seek(Duration::ZERO, now);
        }

        let target = match self.history.pop() {
            Some(track) => Some(self.queue.select(&track.id).unwrap_or(track)),
            None => {
                let ctx = self.queue_context();
                self.queue.previous(&ctx)
            }
        };
        match target {
            Some(track) => {
                self.cancel_crossfade(false);
                self.discard_preload();
                self.commit_transition(track, TransitionKind::Previous, now);
                Ok(())
            }
            None => self.seek(Duration::ZERO, now),
        }
    }

    /// Seek within the current track
    ///
    /// # Errors
    /// `NoTrackLoaded` without a current track, `InvalidSeekPosition` past
    /// the known duration
    pub fn seek(&mut self, position: Duration, now: Instant) -> Result<()> {
        let Some(track) = &self.current else {
            return Err(PlaybackError::NoTrackLoaded);
        };
        let duration = self.decks.active().duration().or(track.duration_hint);
        if let Some(duration) = duration {
            if position > duration {
                return Err(PlaybackError::InvalidSeekPosition(position));
            }
        }

        // The ramp was computed for the old position
        if self.crossfade.is_fading() {
            self.cancel_crossfade(true);
        }

        let active_id = self.decks.active_id();
        self.decks.active_mut().seek(position);
        self.monitor.touch(active_id, now);
        self.emit_position();
        Ok(())
    }

    /// Toggle shuffle
    ///
    /// The staged preload was picked under the old policy and is discarded.
    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        info!(shuffle = self.shuffle, "shuffle toggled");
        self.queue.reset_pick();
        self.cancel_crossfade(false);
        self.discard_preload();
        self.shuffle
    }

    /// Cycle repeat mode (off -> all -> one -> off)
    pub fn toggle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.cycle();
        info!(repeat = %self.repeat, "repeat mode changed");
        if self.repeat == RepeatMode::One {
            self.cancel_crossfade(false);
            self.discard_preload();
        }
        self.queue.reset_pick();
        self.repeat
    }

    /// Toggle crossfading; disabling cancels any fade and preload
    pub fn toggle_crossfade(&mut self) -> bool {
        let enabled = !self.crossfade.is_enabled();
        self.crossfade.set_enabled(enabled);
        info!(enabled, "crossfade toggled");
        if !enabled {
            self.cancel_crossfade(false);
            self.discard_preload();
        }
        enabled
    }

    /// Set user volume (clamped to 0.0-1.0)
    pub fn set_volume(&mut self, level: f32) {
        self.volume.set_level(level);
        self.apply_volume();
    }

    /// Toggle mute
    pub fn toggle_mute(&mut self) {
        self.volume.toggle_mute();
        self.apply_volume();
    }

    /// Make `track` current without loading it
    ///
    /// Only the swap path uses this: the deck taking over is already
    /// playing the track.
    pub(crate) fn set_current_track_direct(&mut self, track: Track) {
        self.current = Some(track);
    }

    // ===== Platform inputs =====

    /// Handle a system media key
    ///
    /// # Errors
    /// Propagates the error of the mapped command
    pub fn handle_media_key(&mut self, key: MediaKey, now: Instant) -> Result<()> {
        debug!(?key, "media key");
        match key {
            MediaKey::PlayPause => self.play_pause(now),
            MediaKey::Play => self.play(now),
            MediaKey::Pause => {
                self.pause(now);
                Ok(())
            }
            MediaKey::Next => self.next(now),
            MediaKey::Previous => self.previous(now),
        }
    }

    /// Connectivity changed
    pub fn set_online(&mut self, online: bool, now: Instant) {
        if online {
            self.go_online(now);
        } else {
            self.go_offline(now);
        }
    }

    fn go_offline(&mut self, now: Instant) {
        let was_playing = self.decks.active().is_playing();
        let Some(settle) = self.network.go_offline(now, was_playing) else {
            return;
        };
        if let Some(settle) = settle {
            self.timers.cancel(settle);
        }
        for timer in self.monitor.suspend() {
            self.timers.cancel(timer);
        }
        self.timers
            .cancel_where(|t| matches!(t.kind, TimerKind::Retry(_)));

        warn!(was_playing, "connection lost, recovery suspended");
        self.pending_events
            .push(PlaybackEvent::ConnectivityChanged { online: false });
        self.services.notifier.notify(Notice::new(
            NoticeKind::ConnectionLost,
            "Connection lost",
        ));
    }

    fn go_online(&mut self, now: Instant) {
        let Some(action) = self.network.go_online(now) else {
            return;
        };
        self.monitor.resume(now);
        self.pending_events
            .push(PlaybackEvent::ConnectivityChanged { online: true });

        match action {
            ReconnectAction::SettleThenAdvance { offline_for } => {
                info!(?offline_for, "connection restored, skipping stale stream after settle");
                let deadline = now + self.config.recovery.reconnect_settle();
                let timer = self
                    .timers
                    .schedule(TimerKind::ReconnectSettle, self.token, deadline);
                self.network.set_settle(timer);
            }
            ReconnectAction::NotifyOnly { offline_for } => {
                info!(?offline_for, "connection restored");
                self.services.notifier.notify(Notice::new(
                    NoticeKind::ConnectionRestored,
                    "Connection restored",
                ));
                // A load that failed while offline never reached the deck
                if self.state == PlaybackState::Loading
                    && self.play_request.is_none()
                    && self.decks.active().loaded().is_none()
                {
                    self.request_play_resolution();
                }
            }
        }
    }

    /// Page/app visibility changed
    ///
    /// Coming back to the foreground re-syncs the deck with session state.
    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        self.visible = visible;
        if !visible || self.state != PlaybackState::Playing {
            return;
        }
        let active = self.decks.active();
        let in_sync = self
            .current
            .as_ref()
            .is_some_and(|t| active.holds(&t.id));
        if in_sync && !active.is_playing() {
            info!("deck paused in background, resuming");
            self.start_active(now);
        }
        self.emit_position();
    }

    // ===== Media events =====

    /// Observer event from one of the decks
    pub fn handle_media_event(&mut self, channel: ChannelId, event: MediaEvent, now: Instant) {
        match event {
            MediaEvent::Progress { position, duration } => {
                self.on_progress(channel, position, duration, now);
            }
            MediaEvent::Ended => self.on_ended(channel, now),
            MediaEvent::Error(message) => {
                self.decks.get_mut(channel).mark_errored();
                let err = PlaybackError::MediaError {
                    channel,
                    message,
                };
                self.on_failure(channel, &err, now);
            }
            MediaEvent::Stalled => {
                self.decks.get_mut(channel).mark_stalled();
                self.on_failure(channel, &PlaybackError::Stall { channel }, now);
            }
            MediaEvent::Waiting => {
                trace!(%channel, "deck buffering");
            }
        }
    }

    fn on_progress(
        &mut self,
        channel: ChannelId,
        position: Duration,
        duration: Option<Duration>,
        now: Instant,
    ) {
        let deck = self.decks.get_mut(channel);
        if deck.loaded().is_none() {
            trace!(%channel, "progress from empty deck ignored");
            return;
        }
        deck.observe_progress(position, duration);
        if let Some(timer) = self.monitor.on_progress(channel, position, now) {
            debug!(%channel, "progress resumed, retry cancelled");
            self.timers.cancel(timer);
        }

        if channel != self.decks.active_id() || !self.is_current_on_active() {
            return;
        }

        if !self.played_reported && self.state == PlaybackState::Playing {
            self.played_reported = true;
            if let Some(track) = &self.current {
                if let Err(e) = self.services.history.track_played(track, Utc::now()) {
                    debug!(error = %e, "history sink rejected play");
                }
            }
        }

        self.emit_position();
        self.persist_position(now);

        if self.state != PlaybackState::Playing {
            return;
        }
        if let Some(remaining) = self.remaining() {
            self.maybe_preload(remaining);
            self.maybe_start_crossfade(remaining, now);
        }
    }

    fn on_ended(&mut self, channel: ChannelId, now: Instant) {
        if channel != self.decks.active_id() {
            trace!(%channel, "ended on standby deck ignored");
            return;
        }
        if !self.is_current_on_active() || self.state == PlaybackState::Stopped {
            debug!(%channel, "stale ended ignored");
            return;
        }
        if self.repeat == RepeatMode::One {
            debug!("repeat one: replaying");
            self.played_reported = false;
            self.last_persist = None;
            self.decks.active_mut().seek(Duration::ZERO);
            self.start_active(now);
            return;
        }
        if self.crossfade.is_busy() {
            debug!("ended during crossfade ignored");
            return;
        }

        if let Some((track, _)) = self.preloader.staged() {
            let track_id = track.id.clone();
            let track = self.queue.select(&track_id).unwrap_or_else(|| track.clone());
            info!(track_id = %track.id, "track ended, swapping to staged preload");
            self.commit_transition(track, TransitionKind::HardSwap, now);
            return;
        }

        self.discard_preload();
        info!("track ended, advancing");
        self.advance_or_finish(TransitionKind::Advance, now);
    }

    fn on_failure(&mut self, channel: ChannelId, err: &PlaybackError, now: Instant) {
        let fading = self.crossfade.transition().map(|t| (t.from, t.to));
        if let Some((from, to)) = fading {
            if channel == from {
                debug!(%channel, error = %err, "failure on fading-out deck suppressed");
                return;
            }
            if channel == to {
                warn!(%channel, error = %err, "incoming deck failed, aborting crossfade");
                self.cancel_crossfade(false);
                self.discard_preload();
                return;
            }
        }

        if channel != self.decks.active_id() {
            if self.preloader.staged().is_some_and(|(_, ch)| ch == channel) {
                warn!(%channel, error = %err, "staged preload failed, discarding");
                self.discard_preload();
            } else {
                trace!(%channel, error = %err, "failure on idle standby deck ignored");
            }
            return;
        }

        if !self.is_current_on_active() {
            debug!(%channel, error = %err, "failure for stale resource ignored");
            return;
        }

        warn!(%channel, error = %err, "playback failure");
        let action = self.monitor.on_failure(channel);
        self.apply_monitor_action(channel, action, now);
    }

    fn apply_monitor_action(&mut self, channel: ChannelId, action: MonitorAction, now: Instant) {
        match action {
            MonitorAction::None => {}
            MonitorAction::Deferred => {
                debug!(%channel, "offline, recovery deferred");
            }
            MonitorAction::ScheduleRetry { attempt, delay } => {
                info!(%channel, attempt, ?delay, "scheduling retry");
                let timer = self
                    .timers
                    .schedule(TimerKind::Retry(channel), self.token, now + delay);
                self.monitor.set_pending(channel, timer);
                self.pending_events.push(PlaybackEvent::RetryScheduled {
                    channel,
                    attempt,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                });
            }
            MonitorAction::Exhausted { attempts } => {
                let track_id = self
                    .current
                    .as_ref()
                    .map_or_else(|| TrackId::new(""), |t| t.id.clone());
                let err = PlaybackError::ExhaustedRetries { track_id, attempts };
                warn!(%channel, error = %err, "giving up on track");
                self.monitor.reset(channel);
                self.pending_events.push(PlaybackEvent::Error {
                    message: err.to_string(),
                });
                self.services.notifier.notify(Notice::new(
                    NoticeKind::SkippingAfterFailures,
                    "Playback failed repeatedly, skipping to the next track",
                ));
                self.discard_preload();
                self.advance_or_finish(TransitionKind::Failure, now);
            }
        }
    }

    // ===== Resolution =====

    /// Resolution requests issued since the last call
    pub fn take_resolution_requests(&mut self) -> Vec<ResolveRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Report the outcome of a resolution request
    ///
    /// Results for requests that are no longer relevant (track changed,
    /// preload discarded, duplicate completion) are dropped.
    pub fn complete_resolution(
        &mut self,
        request: RequestId,
        result: std::result::Result<String, CoreError>,
        now: Instant,
    ) {
        let Some((token, purpose)) = self.outstanding.remove(&request) else {
            debug!(%request, "completion for unknown request dropped");
            return;
        };
        if token != self.token {
            debug!(%request, "stale completion dropped");
            return;
        }
        match purpose {
            ResolvePurpose::Play => self.complete_play(request, result, now),
            ResolvePurpose::Preload => self.complete_preload(request, result),
        }
    }

    fn complete_play(
        &mut self,
        request: RequestId,
        result: std::result::Result<String, CoreError>,
        now: Instant,
    ) {
        if self.play_request != Some(request) {
            return;
        }
        self.play_request = None;
        let Some(track) = self.current.take() else {
            return;
        };
        let active_id = self.decks.active_id();

        match result {
            Ok(url) => {
                let track = track.with_playable_url(url.clone());
                self.decks.active_mut().ensure_loaded(&track.id, &url);
                self.current = Some(track);
                self.monitor.touch(active_id, now);
                if self.state == PlaybackState::Paused {
                    debug!("loaded while paused, holding");
                    return;
                }
                self.start_active(now);
            }
            Err(e) => {
                self.current = Some(track);
                let err = PlaybackError::from(e);
                warn!(error = %err, "could not resolve current track");
                let action = self.monitor.on_failure(active_id);
                self.apply_monitor_action(active_id, action, now);
            }
        }
    }

    fn complete_preload(&mut self, request: RequestId, result: std::result::Result<String, CoreError>) {
        let Some(track) = self.preloader.take_resolving(request) else {
            return;
        };
        let url = match result {
            Ok(url) => url,
            Err(e) => {
                let err = PlaybackError::from(e);
                warn!(error = %err, "preload resolution failed, will retry on a later tick");
                self.crossfade.set_primed(false);
                return;
            }
        };
        if self.current.as_ref().is_some_and(|c| c.id == track.id) {
            return;
        }

        let channel = self.decks.active_id().other();
        let deck = self.decks.get_mut(channel);
        deck.ensure_loaded(&track.id, &url);
        deck.pause();
        deck.set_volume(0.0);
        if let Some(timer) = self.monitor.reset(channel) {
            self.timers.cancel(timer);
        }

        info!(track_id = %track.id, %channel, "next track staged");
        self.pending_events.push(PlaybackEvent::NextTrackPrepared {
            track_id: track.id.to_string(),
        });
        self.preloader
            .stage(track.with_playable_url(url.clone()), url, channel);
        self.crossfade.set_primed(true);
    }

    fn request_resolution(&mut self, track: Track, purpose: ResolvePurpose) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.outstanding.insert(id, (self.token, purpose));
        debug!(request = %id, track_id = %track.id, ?purpose, "requesting playable url");
        self.requests.push(ResolveRequest {
            id,
            track,
            purpose,
            token: self.token,
        });
        id
    }

    fn request_play_resolution(&mut self) {
        let Some(track) = self.current.clone() else {
            return;
        };
        let id = self.request_resolution(track, ResolvePurpose::Play);
        self.play_request = Some(id);
    }

    // ===== Timers =====

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fire every timer due at or before `now`
    pub fn advance_timers(&mut self, now: Instant) {
        while let Some(timer) = self.timers.pop_due(now) {
            if timer.token != self.token {
                trace!(kind = ?timer.kind, "stale timer discarded");
                if timer.kind == TimerKind::StallCheck {
                    self.stall_timer = None;
                    self.ensure_stall_check(timer.deadline);
                }
                continue;
            }
            self.fire(timer);
        }
    }

    fn fire(&mut self, timer: Timer) {
        let at = timer.deadline;
        match timer.kind {
            TimerKind::CrossfadeStep => self.on_crossfade_step(at),
            TimerKind::CrossfadeSettle => {
                if self.crossfade.settle_elapsed(timer.id) {
                    debug!("crossfade settled");
                    self.crossfade.set_primed(self.preloader.buffer().is_staged());
                }
            }
            TimerKind::StallCheck => self.on_stall_check(timer.id, at),
            TimerKind::Retry(channel) => self.on_retry(channel, timer.id, at),
            TimerKind::ReconnectSettle => {
                if self.network.settle_elapsed(timer.id) {
                    info!("reconnect settled, advancing");
                    self.services.notifier.notify(Notice::new(
                        NoticeKind::ConnectionRestored,
                        "Connection restored, skipping to the next track",
                    ));
                    self.cancel_crossfade(false);
                    self.discard_preload();
                    self.advance_or_finish(TransitionKind::Reconnect, at);
                }
            }
        }
    }

    fn ensure_stall_check(&mut self, now: Instant) {
        if self.stall_timer.is_some_and(|t| self.timers.is_pending(t)) {
            return;
        }
        if self.state == PlaybackState::Stopped {
            self.stall_timer = None;
            return;
        }
        let deadline = now + self.config.recovery.stall_check_interval();
        self.stall_timer = Some(
            self.timers
                .schedule(TimerKind::StallCheck, self.token, deadline),
        );
    }

    fn on_stall_check(&mut self, timer: TimerId, now: Instant) {
        if self.stall_timer == Some(timer) {
            self.stall_timer = None;
        }
        let active_id = self.decks.active_id();
        let expected = self.state == PlaybackState::Playing
            && self.is_current_on_active()
            && !self.crossfade.is_swapping();
        let action = self.monitor.check_liveness(active_id, expected, now);
        if action != MonitorAction::None {
            self.decks.active_mut().mark_stalled();
            debug!(channel = %active_id, "no progress within threshold");
        }
        if let MonitorAction::ScheduleRetry { .. } | MonitorAction::Exhausted { .. } = action {
            let err = PlaybackError::Stall { channel: active_id };
            warn!(channel = %active_id, error = %err, "stall detected");
        }
        self.apply_monitor_action(active_id, action, now);
        self.ensure_stall_check(now);
    }

    fn on_retry(&mut self, channel: ChannelId, timer: TimerId, now: Instant) {
        if !self.monitor.retry_fired(channel, timer, now) {
            return;
        }
        if channel != self.decks.active_id() {
            return;
        }
        let attempt = self.monitor.state(channel).attempts;
        let deck = self.decks.get_mut(channel);
        let resume_at = deck.position();
        if deck.reload() {
            info!(%channel, attempt, ?resume_at, "retrying playback");
            deck.seek(resume_at);
            if self.state == PlaybackState::Playing || self.state == PlaybackState::Loading {
                self.start_active(now);
            }
        } else {
            info!(%channel, attempt, "retrying url resolution");
            if self.play_request.is_none() {
                self.request_play_resolution();
            }
        }
    }

    // ===== Crossfade =====

    fn maybe_preload(&mut self, remaining: Duration) {
        if !self.network.is_online()
            || self.crossfade.is_busy()
            || !self
                .preloader
                .should_preload(remaining, self.crossfade.settings(), self.repeat)
        {
            return;
        }
        let ctx = self.queue_context();
        let Some(next) = self.queue.peek_next(&ctx) else {
            return;
        };
        if ctx.current.as_ref() == Some(&next.id) {
            return;
        }
        debug!(track_id = %next.id, ?remaining, "preloading next track");
        let request = self.request_resolution(next.clone(), ResolvePurpose::Preload);
        self.preloader.begin(request, next);
    }

    fn maybe_start_crossfade(&mut self, remaining: Duration, now: Instant) {
        let Some((track, channel)) = self.preloader.staged() else {
            return;
        };
        if !self
            .crossfade
            .should_start(remaining, true, self.repeat, now)
        {
            return;
        }
        let from = self.decks.active_id();
        if channel != from.other() || !self.decks.get(channel).holds(&track.id) {
            return;
        }
        let track = track.clone();

        let incoming = self.decks.get_mut(channel);
        incoming.set_volume(0.0);
        if let Err(e) = incoming.play() {
            warn!(%channel, error = %e, "incoming deck refused to play, dropping preload");
            self.discard_preload();
            return;
        }
        self.monitor.touch(channel, now);

        let settings = self.crossfade.settings().clone();
        let from_track = self
            .current
            .as_ref()
            .map(|t| t.id.to_string())
            .unwrap_or_default();
        info!(
            from = %from_track,
            to = %track.id,
            ?remaining,
            "starting crossfade"
        );
        self.pending_events.push(PlaybackEvent::CrossfadeStarted {
            from_track_id: from_track,
            to_track_id: track.id.to_string(),
            duration_ms: settings.duration_ms,
        });

        self.crossfade.begin(CrossfadeTransition {
            from,
            to: channel,
            track,
            start_volume: self.decks.get(from).volume(),
            target_volume: self.volume.target(),
            steps: settings.steps,
            step: 0,
            timer: None,
            token: self.token,
        });
        let timer = self.timers.schedule(
            TimerKind::CrossfadeStep,
            self.token,
            now + settings.step_interval(),
        );
        self.crossfade.set_step_timer(timer);
    }

    fn on_crossfade_step(&mut self, at: Instant) {
        let Some(step) = self.crossfade.next_step() else {
            return;
        };
        let Some((from, to, progress)) = self
            .crossfade
            .transition()
            .map(|t| (t.from, t.to, t.progress()))
        else {
            return;
        };
        self.decks.get_mut(from).set_volume(step.outgoing);
        self.decks.get_mut(to).set_volume(step.incoming);
        self.pending_events
            .push(PlaybackEvent::CrossfadeProgress { progress });

        if step.finished {
            self.complete_crossfade(at);
        } else {
            let deadline = at + self.crossfade.settings().step_interval();
            let timer = self
                .timers
                .schedule(TimerKind::CrossfadeStep, self.token, deadline);
            self.crossfade.set_step_timer(timer);
        }
    }

    fn complete_crossfade(&mut self, now: Instant) {
        let Some(track) = self.crossfade.transition().map(|t| t.track.clone()) else {
            return;
        };
        let track = self.queue.select(&track.id).unwrap_or(track);
        self.commit_transition(track, TransitionKind::Crossfade, now);

        let settle = self.timers.schedule(
            TimerKind::CrossfadeSettle,
            self.token,
            now + self.crossfade.settings().settle_delay(),
        );
        if self.crossfade.complete(settle, now).is_some() {
            let active = self.decks.active_id();
            info!(%active, "crossfade complete");
            self.pending_events
                .push(PlaybackEvent::CrossfadeCompleted { active });
        }
    }

    /// Abandon any fade or settle in progress
    ///
    /// The outgoing deck goes back to full volume; the incoming deck is
    /// paused and silenced, rewound when `rewind_incoming` is set.
    fn cancel_crossfade(&mut self, rewind_incoming: bool) {
        match self.crossfade.cancel() {
            CrossfadePhase::Fading(transition) => {
                if let Some(timer) = transition.timer {
                    self.timers.cancel(timer);
                }
                self.timers
                    .cancel_where(|t| t.kind == TimerKind::CrossfadeStep);
                let target = self.volume.target();
                self.decks.get_mut(transition.from).set_volume(target);
                let incoming = self.decks.get_mut(transition.to);
                incoming.pause();
                incoming.set_volume(0.0);
                if rewind_incoming {
                    incoming.seek(Duration::ZERO);
                }
                info!(step = transition.step, "crossfade cancelled");
                self.pending_events.push(PlaybackEvent::CrossfadeCancelled);
            }
            CrossfadePhase::Swapping { settle } => {
                self.timers.cancel(settle);
            }
            CrossfadePhase::Idle | CrossfadePhase::Priming => {}
        }
        self.crossfade
            .set_primed(self.preloader.buffer().is_staged());
    }

    /// Drop the preload slot and the standby deck's resource
    fn discard_preload(&mut self) {
        match self.preloader.clear() {
            PreloadBuffer::Staged { track, channel, .. } => {
                debug!(track_id = %track.id, %channel, "discarding staged preload");
                if channel != self.decks.active_id() {
                    self.decks.get_mut(channel).clear();
                }
                if let Some(timer) = self.monitor.reset(channel) {
                    self.timers.cancel(timer);
                }
            }
            PreloadBuffer::Resolving { request, track } => {
                debug!(track_id = %track.id, %request, "abandoning preload resolution");
                self.outstanding.remove(&request);
            }
            PreloadBuffer::Empty => {}
        }
        self.crossfade.set_primed(false);
    }

    // ===== Transitions =====

    fn advance_or_finish(&mut self, kind: TransitionKind, now: Instant) {
        let ctx = self.queue_context();
        match self.queue.advance(&ctx) {
            Some(track) => self.commit_transition(track, kind, now),
            None => self.finish_queue(),
        }
    }

    /// The single place the current track changes
    ///
    /// Cancels the fade (unless this is the fade's own swap), the preload
    /// (unless this transition consumes it), retries and the reconnect
    /// timer, then bumps the token. Only `Crossfade` and `HardSwap` flip the
    /// active deck; every other kind loads the track on the active deck.
    fn commit_transition(&mut self, track: Track, kind: TransitionKind, now: Instant) {
        if kind != TransitionKind::Crossfade {
            self.cancel_crossfade(false);
        }
        let staged = if kind.flips_channel() {
            self.preloader.take_staged()
        } else {
            None
        };
        self.discard_preload();

        for timer in self.monitor.reset_all() {
            self.timers.cancel(timer);
        }
        self.timers
            .cancel_where(|t| matches!(t.kind, TimerKind::Retry(_)));
        if let Some(timer) = self.network.take_settle() {
            self.timers.cancel(timer);
        }
        if let Some(timer) = self.stall_timer.take() {
            self.timers.cancel(timer);
        }
        if let Some(request) = self.play_request.take() {
            self.outstanding.remove(&request);
        }

        self.token = self.token.next();
        self.played_reported = false;
        self.last_persist = None;

        let previous = self.current.take();
        if let Some(prev) = &previous {
            if kind != TransitionKind::Previous {
                self.history.push(prev.clone());
            }
        }
        info!(
            track_id = %track.id,
            ?kind,
            token = self.token.value(),
            "track changed"
        );
        self.pending_events.push(PlaybackEvent::TrackChanged {
            track_id: track.id.to_string(),
            previous_track_id: previous.map(|t| t.id.to_string()),
            kind,
        });

        let standby = self.decks.active_id().other();
        let swap_ready = match staged {
            Some(s) if s.track.id == track.id && s.channel == standby => Some(s),
            Some(s) => {
                self.decks.get_mut(s.channel).clear();
                None
            }
            None => None,
        };
        match (kind.flips_channel(), swap_ready) {
            (true, Some(staged)) => {
                self.decks.active_mut().clear();
                let active = self.decks.flip();
                self.set_current_track_direct(track.with_playable_url(staged.url));
                self.monitor.touch(active, now);
                if kind == TransitionKind::HardSwap {
                    self.start_active(now);
                } else {
                    self.set_state(PlaybackState::Playing);
                    self.ensure_stall_check(now);
                }
            }
            _ => {
                self.decks.active_mut().clear();
                self.current = Some(track);
                self.set_state(PlaybackState::Loading);
                self.request_play_resolution();
                self.ensure_stall_check(now);
            }
        }

        if let Some(track) = &self.current {
            let playing = self.state != PlaybackState::Paused;
            self.services.platform.update_now_playing(track, playing);
        }
    }

    /// Queue ran out with repeat off: stop and keep the track displayed
    fn finish_queue(&mut self) {
        info!("queue ended");
        self.cancel_crossfade(false);
        self.discard_preload();
        for timer in self.monitor.reset_all() {
            self.timers.cancel(timer);
        }
        if let Some(timer) = self.stall_timer.take() {
            self.timers.cancel(timer);
        }
        self.decks.active_mut().pause();
        self.set_state(PlaybackState::Stopped);
        self.pending_events.push(PlaybackEvent::QueueEnded);
        if let Some(track) = &self.current {
            self.services.platform.update_now_playing(track, false);
        }
    }

    // ===== Helpers =====

    fn start_active(&mut self, now: Instant) {
        let active_id = self.decks.active_id();
        let target = self.volume.target();
        let deck = self.decks.active_mut();
        deck.set_volume(target);
        if let Err(e) = deck.play() {
            self.set_state(PlaybackState::Playing);
            self.on_failure(active_id, &e, now);
            return;
        }
        self.monitor.touch(active_id, now);
        self.set_state(PlaybackState::Playing);
        self.ensure_stall_check(now);
        if let Some(track) = &self.current {
            self.services.platform.update_now_playing(track, true);
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "state changed");
        self.state = state;
        self.pending_events.push(PlaybackEvent::StateChanged { state });

        match state {
            PlaybackState::Playing | PlaybackState::Loading => {
                if !self.wake_lock {
                    self.wake_lock = true;
                    self.services.platform.acquire_wake_lock();
                }
            }
            PlaybackState::Paused | PlaybackState::Stopped => {
                if self.wake_lock {
                    self.wake_lock = false;
                    self.services.platform.release_wake_lock();
                }
            }
        }
    }

    fn apply_volume(&mut self) {
        let target = self.volume.target();
        if let Some(((from, to), (outgoing, incoming))) = self
            .crossfade
            .transition()
            .map(|t| (t.from, t.to))
            .zip(self.crossfade.retarget(target))
        {
            self.decks.get_mut(from).set_volume(outgoing);
            self.decks.get_mut(to).set_volume(incoming);
        } else if self.state != PlaybackState::Stopped || self.decks.active().loaded().is_some() {
            self.decks.active_mut().set_volume(target);
        }
        self.pending_events.push(PlaybackEvent::VolumeChanged {
            level: self.volume.level(),
            is_muted: self.volume.is_muted(),
        });
    }

    fn emit_position(&mut self) {
        let deck = self.decks.active();
        let position_ms = u64::try_from(deck.position().as_millis()).unwrap_or(u64::MAX);
        let duration_ms = deck
            .duration()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self.pending_events.push(PlaybackEvent::PositionUpdate {
            position_ms,
            duration_ms,
        });
    }

    fn persist_position(&mut self, now: Instant) {
        let interval = self.config.position_persist_interval();
        if self
            .last_persist
            .is_some_and(|at| now.saturating_duration_since(at) < interval)
        {
            return;
        }
        let Some(track) = &self.current else {
            return;
        };
        self.last_persist = Some(now);
        let position = self.decks.active().position();
        if let Err(e) = self.services.positions.save_position(&track.id, position) {
            debug!(error = %e, "position store rejected save");
        }
    }

    fn is_current_on_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|t| self.decks.active().holds(&t.id))
    }

    fn remaining(&self) -> Option<Duration> {
        let deck = self.decks.active();
        deck.remaining().or_else(|| {
            self.current
                .as_ref()
                .and_then(|t| t.duration_hint)
                .map(|d| d.saturating_sub(deck.position()))
        })
    }

    fn queue_context(&self) -> QueueContext {
        QueueContext {
            current: self.current.as_ref().map(|t| t.id.clone()),
            shuffle: self.shuffle,
            repeat: self.repeat,
        }
    }

    // ===== Queries =====

    /// Drain all pending events
    ///
    /// Returns all events that have been emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Check if there are pending events
    pub fn has_pending_events(&self) -> bool {
        !self.pending_events.is_empty()
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Current track
    pub fn current_track(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    /// Identity of the current track instance
    pub fn token(&self) -> PlaybackToken {
        self.token
    }

    /// Both decks (read-only)
    pub fn decks(&self) -> &Decks {
        &self.decks
    }

    /// Audible deck
    pub fn active_channel(&self) -> ChannelId {
        self.decks.active_id()
    }

    /// Position of the audible deck
    pub fn position(&self) -> Duration {
        self.decks.active().position()
    }

    /// Duration of the audible deck, once known
    pub fn duration(&self) -> Option<Duration> {
        self.decks.active().duration()
    }

    /// User volume level
    pub fn volume(&self) -> f32 {
        self.volume.level()
    }

    /// Whether muted
    pub fn is_muted(&self) -> bool {
        self.volume.is_muted()
    }

    /// Shuffle flag
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Repeat mode
    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    /// Crossfade flag
    pub fn crossfade_enabled(&self) -> bool {
        self.crossfade.is_enabled()
    }

    /// Crossfade scheduler phase
    pub fn crossfade_phase(&self) -> &CrossfadePhase {
        self.crossfade.phase()
    }

    /// Preload slot
    pub fn preload(&self) -> &PreloadBuffer {
        self.preloader.buffer()
    }

    /// Retry bookkeeping for a deck
    pub fn retry_state(&self, channel: ChannelId) -> &RetryState {
        self.monitor.state(channel)
    }

    /// Connectivity as last reported
    pub fn connectivity(&self) -> Connectivity {
        self.network.connectivity()
    }

    /// Whether the page/app is in the foreground
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Tracks that were current before this one, oldest first
    pub fn history(&self) -> Vec<&Track> {
        self.history.get_all()
    }

    /// Effective configuration
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("state", &self.state)
            .field("current", &self.current.as_ref().map(|t| &t.id))
            .field("token", &self.token)
            .field("decks", &self.decks)
            .field("crossfade", self.crossfade.phase())
            .field("connectivity", &self.network.connectivity())
            .finish_non_exhaustive()
    }
}
