//! Shared fakes for session tests
//!
//! Decks record every call into a shared log; the queue counts commits;
//! services record what they were told.

#![allow(dead_code)]

use encore_core::{
    Notice, NoticeKind, Notifier, PlatformHooks, PlayHistorySink, PositionStore, QueueContext,
    QueueProvider, Track, TrackId,
};
use encore_playback::{
    ChannelId, MediaBackend, MediaEvent, PlayQueue, PlaybackConfig, PlaybackError,
    PlaybackEvent, PlaybackSession, ResolvePurpose, Result, Services,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const A: ChannelId = ChannelId::A;
pub const B: ChannelId = ChannelId::B;

// ===== Decks =====

#[derive(Debug, Default)]
pub struct DeckLog {
    pub loads: Vec<String>,
    pub plays: usize,
    pub pauses: usize,
    pub seeks: Vec<Duration>,
    pub unloads: usize,
    pub volume: f32,
    pub playing: bool,
    pub position: Duration,
    pub refuse_play: bool,
}

pub struct FakeDeck(pub Arc<Mutex<DeckLog>>);

impl MediaBackend for FakeDeck {
    fn load(&mut self, url: &str) {
        let mut log = self.0.lock().unwrap();
        log.loads.push(url.to_string());
        log.position = Duration::ZERO;
        log.playing = false;
    }

    fn play(&mut self) -> Result<()> {
        let mut log = self.0.lock().unwrap();
        if log.refuse_play {
            return Err(PlaybackError::MediaError {
                channel: ChannelId::A,
                message: "autoplay blocked".to_string(),
            });
        }
        log.plays += 1;
        log.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        let mut log = self.0.lock().unwrap();
        log.pauses += 1;
        log.playing = false;
    }

    fn seek(&mut self, position: Duration) {
        let mut log = self.0.lock().unwrap();
        log.seeks.push(position);
        log.position = position;
    }

    fn set_volume(&mut self, volume: f32) {
        self.0.lock().unwrap().volume = volume;
    }

    fn unload(&mut self) {
        let mut log = self.0.lock().unwrap();
        log.unloads += 1;
        log.playing = false;
    }

    fn position(&self) -> Duration {
        self.0.lock().unwrap().position
    }

    fn duration(&self) -> Option<Duration> {
        None
    }

    fn is_playing(&self) -> bool {
        self.0.lock().unwrap().playing
    }
}

// ===== Queue =====

/// [`PlayQueue`] that counts committed picks
pub struct CountingQueue {
    inner: PlayQueue,
    pub advances: Arc<AtomicUsize>,
    pub selects: Arc<AtomicUsize>,
}

impl QueueProvider for CountingQueue {
    fn load(&mut self, tracks: Vec<Track>) {
        self.inner.load(tracks);
    }

    fn peek_next(&mut self, ctx: &QueueContext) -> Option<Track> {
        self.inner.peek_next(ctx)
    }

    fn advance(&mut self, ctx: &QueueContext) -> Option<Track> {
        self.advances.fetch_add(1, Ordering::SeqCst);
        self.inner.advance(ctx)
    }

    fn previous(&mut self, ctx: &QueueContext) -> Option<Track> {
        self.inner.previous(ctx)
    }

    fn select(&mut self, id: &TrackId) -> Option<Track> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.inner.select(id)
    }

    fn reset_pick(&mut self) {
        self.inner.reset_pick();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

// ===== Services =====

#[derive(Clone, Default)]
pub struct Recorded {
    pub played: Arc<Mutex<Vec<TrackId>>>,
    pub positions: Arc<Mutex<Vec<(TrackId, Duration)>>>,
    pub notices: Arc<Mutex<Vec<Notice>>>,
    pub wake_locks: Arc<Mutex<Vec<bool>>>,
}

struct HistoryRecorder(Arc<Mutex<Vec<TrackId>>>);

impl PlayHistorySink for HistoryRecorder {
    fn track_played(&mut self, track: &Track, _at: DateTime<Utc>) -> encore_core::Result<()> {
        self.0.lock().unwrap().push(track.id.clone());
        Ok(())
    }
}

struct PositionRecorder(Arc<Mutex<Vec<(TrackId, Duration)>>>);

impl PositionStore for PositionRecorder {
    fn save_position(&mut self, track_id: &TrackId, position: Duration) -> encore_core::Result<()> {
        self.0.lock().unwrap().push((track_id.clone(), position));
        Ok(())
    }
}

struct NoticeRecorder(Arc<Mutex<Vec<Notice>>>);

impl Notifier for NoticeRecorder {
    fn notify(&mut self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

struct PlatformRecorder(Arc<Mutex<Vec<bool>>>);

impl PlatformHooks for PlatformRecorder {
    fn acquire_wake_lock(&mut self) {
        self.0.lock().unwrap().push(true);
    }

    fn release_wake_lock(&mut self) {
        self.0.lock().unwrap().push(false);
    }
}

impl Recorded {
    fn services(&self) -> Services {
        Services {
            history: Box::new(HistoryRecorder(self.played.clone())),
            positions: Box::new(PositionRecorder(self.positions.clone())),
            notifier: Box::new(NoticeRecorder(self.notices.clone())),
            platform: Box::new(PlatformRecorder(self.wake_locks.clone())),
        }
    }

    pub fn notice_kinds(&self) -> Vec<NoticeKind> {
        self.notices.lock().unwrap().iter().map(|n| n.kind).collect()
    }
}

// ===== Harness =====

pub fn tracks(n: usize, secs: u64) -> Vec<Track> {
    (0..n)
        .map(|i| {
            Track::new(TrackId::new(format!("t{i}")), format!("Song {i}"), "Artist", format!("raw/t{i}"))
                .with_duration_hint(Duration::from_secs(secs))
        })
        .collect()
}

pub fn url_for(track: &Track) -> String {
    format!("https://cdn.test/{}", track.id)
}

pub struct Harness {
    pub session: PlaybackSession,
    pub deck_a: Arc<Mutex<DeckLog>>,
    pub deck_b: Arc<Mutex<DeckLog>>,
    pub advances: Arc<AtomicUsize>,
    pub selects: Arc<AtomicUsize>,
    pub recorded: Recorded,
    pub events: Vec<PlaybackEvent>,
    pub t0: Instant,
    pub track_secs: u64,
}

impl Harness {
    pub fn new(config: PlaybackConfig) -> Self {
        Self::with_queue_seed(config, 7)
    }

    pub fn with_queue_seed(config: PlaybackConfig, seed: u64) -> Self {
        let deck_a = Arc::new(Mutex::new(DeckLog::default()));
        let deck_b = Arc::new(Mutex::new(DeckLog::default()));
        let advances = Arc::new(AtomicUsize::new(0));
        let selects = Arc::new(AtomicUsize::new(0));
        let queue = CountingQueue {
            inner: PlayQueue::with_seed(seed),
            advances: advances.clone(),
            selects: selects.clone(),
        };
        let recorded = Recorded::default();
        let session = PlaybackSession::new(
            config,
            Box::new(FakeDeck(deck_a.clone())),
            Box::new(FakeDeck(deck_b.clone())),
            Box::new(queue),
        )
        .unwrap()
        .with_services(recorded.services());

        Self {
            session,
            deck_a,
            deck_b,
            advances,
            selects,
            recorded,
            events: Vec::new(),
            t0: Instant::now(),
            track_secs: 30,
        }
    }

    pub fn at(&self, secs: f64) -> Instant {
        self.t0 + Duration::from_secs_f64(secs)
    }

    pub fn deck(&self, channel: ChannelId) -> MutexGuard<'_, DeckLog> {
        match channel {
            ChannelId::A => self.deck_a.lock().unwrap(),
            ChannelId::B => self.deck_b.lock().unwrap(),
        }
    }

    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::SeqCst)
    }

    pub fn current_id(&self) -> Option<String> {
        self.session.current_track().map(|t| t.id.to_string())
    }

    /// Load `n` tracks of `track_secs` each and start playing the first
    pub fn start(&mut self, n: usize, track_secs: u64) {
        self.track_secs = track_secs;
        let now = self.at(0.0);
        self.session.load_queue(tracks(n, track_secs), None, now).unwrap();
        self.resolve_all(now);
    }

    /// Answer every outstanding resolution successfully
    pub fn resolve_all(&mut self, now: Instant) {
        for request in self.session.take_resolution_requests() {
            let url = url_for(&request.track);
            self.session.complete_resolution(request.id, Ok(url), now);
        }
        self.collect();
    }

    /// Answer only preload requests, failing them
    pub fn fail_preloads(&mut self, now: Instant) {
        for request in self.session.take_resolution_requests() {
            let result = match request.purpose {
                ResolvePurpose::Preload => Err(encore_core::CoreError::resolution(
                    request.track.id.clone(),
                    "signed url expired",
                )),
                ResolvePurpose::Play => Ok(url_for(&request.track)),
            };
            self.session.complete_resolution(request.id, result, now);
        }
        self.collect();
    }

    pub fn media(&mut self, channel: ChannelId, event: MediaEvent, secs: f64) {
        let now = self.at(secs);
        self.session.handle_media_event(channel, event, now);
        self.collect();
    }

    /// Progress on `channel` at wall-clock `secs` with the given track position
    pub fn progress(&mut self, channel: ChannelId, position_secs: f64, secs: f64) {
        let event = MediaEvent::Progress {
            position: Duration::from_secs_f64(position_secs),
            duration: Some(Duration::from_secs(self.track_secs)),
        };
        self.media(channel, event, secs);
    }

    pub fn timers(&mut self, secs: f64) {
        let now = self.at(secs);
        self.session.advance_timers(now);
        self.collect();
    }

    /// One wall-clock second of playback on the active deck
    ///
    /// Fires due timers, reports progress and answers resolutions.
    pub fn tick(&mut self, secs: u64, position_secs: u64) {
        let (secs, position) = (secs as f64, position_secs as f64);
        self.timers(secs);
        let active = self.session.active_channel();
        self.progress(active, position, secs);
        self.resolve_all(self.at(secs));
    }

    pub fn collect(&mut self) {
        self.events.extend(self.session.drain_events());
    }

    pub fn count_events(&self, pred: impl Fn(&PlaybackEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn volumes(&self) -> (f32, f32) {
        let decks = self.session.decks();
        (decks.get(A).volume(), decks.get(B).volume())
    }
}
