//! Session command and transition tests
//!
//! Commands, idempotency of loads, stale completions and the collaborator
//! services a session reports to.

mod common;

use common::{Harness, A};
use encore_playback::{
    Command, MediaEvent, MediaKey, PlaybackConfig, PlaybackError, PlaybackEvent, PlaybackState,
    ResolvePurpose, TransitionKind,
};
use encore_core::TrackId;
use std::time::Duration;

// ============================================================================
// HELPERS
// ============================================================================

fn without_crossfade() -> PlaybackConfig {
    let mut config = PlaybackConfig::default();
    config.crossfade.enabled = false;
    config
}

fn track_changes(h: &Harness) -> Vec<(String, TransitionKind)> {
    h.events
        .iter()
        .filter_map(|e| match e {
            PlaybackEvent::TrackChanged { track_id, kind, .. } => Some((track_id.clone(), *kind)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// NATURAL ADVANCE
// ============================================================================

#[test]
fn test_duplicate_ended_advances_once() {
    let mut h = Harness::new(without_crossfade());
    h.start(3, 30);
    for sec in 1..=30 {
        h.tick(sec, sec);
    }
    assert!(h.session.preload().is_empty(), "no preload without crossfade");

    h.media(A, MediaEvent::Ended, 30.0);
    h.media(A, MediaEvent::Ended, 30.1);

    assert_eq!(h.advances(), 2, "start plus exactly one advance");
    assert_eq!(h.current_id().as_deref(), Some("t1"));
    assert_eq!(
        track_changes(&h),
        vec![
            ("t0".to_string(), TransitionKind::Start),
            ("t1".to_string(), TransitionKind::Advance)
        ]
    );

    h.resolve_all(h.at(30.1));
    assert_eq!(h.session.state(), PlaybackState::Playing);
    assert_eq!(h.deck(A).loads.len(), 2);
}

#[test]
fn test_end_of_queue_stops_and_keeps_track_displayed() {
    let mut h = Harness::new(without_crossfade());
    h.start(1, 30);
    for sec in 1..=30 {
        h.tick(sec, sec);
    }

    h.media(A, MediaEvent::Ended, 30.0);

    assert_eq!(h.session.state(), PlaybackState::Stopped);
    assert_eq!(h.current_id().as_deref(), Some("t0"));
    assert_eq!(h.count_events(|e| matches!(e, PlaybackEvent::QueueEnded)), 1);
    assert_eq!(*h.recorded.wake_locks.lock().unwrap(), vec![true, false]);
    assert!(h.session.next_deadline().is_none(), "nothing left to schedule");

    // Stopped sessions ignore late element events
    h.media(A, MediaEvent::Ended, 30.5);
    assert_eq!(h.count_events(|e| matches!(e, PlaybackEvent::QueueEnded)), 1);

    // Play restarts the displayed track from the top
    h.session.play(h.at(40.0)).unwrap();
    assert_eq!(h.session.state(), PlaybackState::Playing);
    assert_eq!(h.deck(A).seeks.last(), Some(&Duration::ZERO));
}

#[test]
fn test_repeat_all_wraps_to_first_track() {
    let mut h = Harness::new(without_crossfade());
    h.start(2, 30);
    h.session.toggle_repeat();

    h.session.next(h.at(1.0)).unwrap();
    h.resolve_all(h.at(1.0));
    h.session.next(h.at(2.0)).unwrap();

    assert_eq!(h.current_id().as_deref(), Some("t0"));
}

#[test]
fn test_repeat_one_replay_counts_as_a_new_play() {
    let mut h = Harness::new(without_crossfade());
    h.start(2, 30);
    h.session.toggle_repeat();
    h.session.toggle_repeat();

    h.progress(A, 29.0, 29.0);
    h.media(A, MediaEvent::Ended, 30.0);
    h.progress(A, 1.0, 31.0);

    assert_eq!(h.current_id().as_deref(), Some("t0"));
    assert_eq!(
        *h.recorded.played.lock().unwrap(),
        vec![TrackId::new("t0"), TrackId::new("t0")]
    );
    let positions: Vec<_> = h
        .recorded
        .positions
        .lock()
        .unwrap()
        .iter()
        .map(|(_, p)| p.as_secs())
        .collect();
    assert_eq!(positions, vec![29, 1], "replay persists without waiting out the throttle");
}

// ============================================================================
// IDEMPOTENT LOADS
// ============================================================================

#[test]
fn test_duplicate_completion_does_not_reload() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.session
        .load_queue(common::tracks(3, 30), None, h.at(0.0))
        .unwrap();
    let request = h.session.take_resolution_requests().remove(0);
    let url = common::url_for(&request.track);

    h.session
        .complete_resolution(request.id, Ok(url.clone()), h.at(0.0));
    h.session.complete_resolution(request.id, Ok(url), h.at(0.1));

    assert_eq!(h.deck(A).loads.len(), 1);
    assert_eq!(h.deck(A).plays, 1);
}

#[test]
fn test_play_and_foregrounding_while_playing_leave_deck_alone() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);
    for sec in 1..=12 {
        h.tick(sec, sec);
    }
    let plays = h.deck(A).plays;

    h.session.play(h.at(12.5)).unwrap();
    h.session.set_visible(false, h.at(13.0));
    h.session.set_visible(true, h.at(14.0));

    assert_eq!(h.deck(A).loads.len(), 1);
    assert!(h.deck(A).seeks.is_empty());
    assert_eq!(h.deck(A).plays, plays);
    assert_eq!(h.session.position(), Duration::from_secs(12));
}

#[test]
fn test_foregrounding_resumes_deck_paused_by_platform() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);
    h.tick(1, 1);

    h.session.set_visible(false, h.at(2.0));
    h.deck(A).playing = false;
    h.session.set_visible(true, h.at(5.0));

    assert!(h.session.is_visible());
    assert!(h.deck(A).playing);
    assert_eq!(h.deck(A).loads.len(), 1);
}

// ============================================================================
// STALE COMPLETIONS
// ============================================================================

#[test]
fn test_resolution_for_superseded_track_is_dropped() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.session
        .load_queue(common::tracks(3, 30), None, h.at(0.0))
        .unwrap();
    h.session.next(h.at(0.5)).unwrap();

    let requests = h.session.take_resolution_requests();
    assert_eq!(requests.len(), 2);
    let (stale, fresh) = (&requests[0], &requests[1]);
    assert_eq!(stale.track.id.as_str(), "t0");
    assert_eq!(fresh.track.id.as_str(), "t1");
    assert!(fresh.token > stale.token);

    h.session
        .complete_resolution(stale.id, Ok(common::url_for(&stale.track)), h.at(0.6));
    assert!(h.deck(A).loads.is_empty());
    assert_eq!(h.session.state(), PlaybackState::Loading);

    h.session
        .complete_resolution(fresh.id, Ok(common::url_for(&fresh.track)), h.at(0.7));
    assert_eq!(h.deck(A).loads, vec!["https://cdn.test/t1".to_string()]);
    assert_eq!(h.session.state(), PlaybackState::Playing);
}

#[test]
fn test_preload_resolved_after_skip_is_dropped() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);
    for sec in 1..=15 {
        h.timers(sec as f64);
        h.progress(A, sec as f64, sec as f64);
    }
    let preload = h.session.take_resolution_requests().remove(0);
    assert_eq!(preload.purpose, ResolvePurpose::Preload);

    h.session.next(h.at(15.5)).unwrap();
    h.session
        .complete_resolution(preload.id, Ok(common::url_for(&preload.track)), h.at(15.6));

    assert!(h.deck(common::B).loads.is_empty());
    assert!(h.session.preload().is_empty());
}

// ============================================================================
// COMMANDS
// ============================================================================

#[test]
fn test_previous_restarts_past_threshold_then_goes_back() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);
    h.tick(1, 1);
    h.session.next(h.at(1.5)).unwrap();
    h.resolve_all(h.at(1.5));
    assert_eq!(h.current_id().as_deref(), Some("t1"));

    h.progress(A, 5.0, 6.5);
    h.session.previous(h.at(6.5)).unwrap();
    assert_eq!(h.current_id().as_deref(), Some("t1"));
    assert_eq!(h.deck(A).seeks.last(), Some(&Duration::ZERO));

    h.progress(A, 2.0, 8.5);
    h.session.previous(h.at(8.5)).unwrap();
    h.collect();
    assert_eq!(h.current_id().as_deref(), Some("t0"));
    assert!(h.session.history().is_empty());
    assert_eq!(
        track_changes(&h).last(),
        Some(&("t0".to_string(), TransitionKind::Previous))
    );
}

#[test]
fn test_pause_and_resume_hold_the_deck() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);
    h.tick(1, 1);

    h.session.play_pause(h.at(2.0)).unwrap();
    assert_eq!(h.session.state(), PlaybackState::Paused);
    assert!(!h.deck(A).playing);

    h.session.play_pause(h.at(3.0)).unwrap();
    assert_eq!(h.session.state(), PlaybackState::Playing);
    assert!(h.deck(A).playing);
    assert_eq!(h.deck(A).loads.len(), 1);
    assert_eq!(
        *h.recorded.wake_locks.lock().unwrap(),
        vec![true, false, true]
    );
}

#[test]
fn test_media_keys_map_to_commands() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);

    h.session.handle_media_key(MediaKey::Pause, h.at(1.0)).unwrap();
    assert_eq!(h.session.state(), PlaybackState::Paused);
    h.session.handle_media_key(MediaKey::Play, h.at(2.0)).unwrap();
    assert_eq!(h.session.state(), PlaybackState::Playing);
    h.session.handle_media_key(MediaKey::Next, h.at(3.0)).unwrap();
    assert_eq!(h.current_id().as_deref(), Some("t1"));
}

#[test]
fn test_commands_apply_through_one_entry_point() {
    let mut h = Harness::new(PlaybackConfig::default());
    let now = h.at(0.0);
    h.session
        .apply(
            Command::LoadQueue {
                tracks: common::tracks(3, 30),
                start: Some(TrackId::new("t2")),
            },
            now,
        )
        .unwrap();
    assert_eq!(h.current_id().as_deref(), Some("t2"));

    h.session.apply(Command::SetVolume(1.7), now).unwrap();
    assert_eq!(h.session.volume(), 1.0);
    h.session.apply(Command::ToggleMute, now).unwrap();
    assert!(h.session.is_muted());
    h.session.apply(Command::ToggleShuffle, now).unwrap();
    assert!(h.session.shuffle());
    h.session.apply(Command::ToggleCrossfade, now).unwrap();
    assert!(!h.session.crossfade_enabled());
}

#[test]
fn test_muted_playback_is_silent() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);
    h.session.toggle_mute();
    assert_eq!(h.deck(A).volume, 0.0);

    h.session.toggle_mute();
    assert!((h.deck(A).volume - 0.8).abs() < 1e-6);
}

#[test]
fn test_invalid_inputs_are_rejected() {
    let mut h = Harness::new(PlaybackConfig::default());
    let now = h.at(0.0);

    assert!(matches!(h.session.next(now), Err(PlaybackError::QueueEmpty)));
    assert!(matches!(h.session.previous(now), Err(PlaybackError::NoTrackLoaded)));
    assert!(matches!(
        h.session.seek(Duration::from_secs(1), now),
        Err(PlaybackError::NoTrackLoaded)
    ));
    assert!(matches!(
        h.session.load_queue(Vec::new(), None, now),
        Err(PlaybackError::QueueEmpty)
    ));
    assert!(matches!(
        h.session
            .load_queue(common::tracks(2, 30), Some(&TrackId::new("nope")), now),
        Err(PlaybackError::InvalidOperation(_))
    ));

    h.start(2, 30);
    assert!(matches!(
        h.session.seek(Duration::from_secs(31), now),
        Err(PlaybackError::InvalidSeekPosition(_))
    ));
    assert!(h.session.seek(Duration::from_secs(10), now).is_ok());
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = PlaybackConfig::default();
    config.recovery.max_retries = 0;
    let result = encore_playback::PlaybackSession::new(
        config,
        Box::new(common::FakeDeck(Default::default())),
        Box::new(common::FakeDeck(Default::default())),
        Box::new(encore_playback::PlayQueue::new()),
    );
    assert!(matches!(result, Err(PlaybackError::InvalidOperation(_))));
}

// ============================================================================
// SERVICES
// ============================================================================

#[test]
fn test_history_reported_once_and_positions_throttled() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);
    for sec in 1..=12 {
        h.tick(sec, sec);
    }

    assert_eq!(*h.recorded.played.lock().unwrap(), vec![TrackId::new("t0")]);
    let positions = h.recorded.positions.lock().unwrap().clone();
    assert_eq!(
        positions.iter().map(|(_, p)| p.as_secs()).collect::<Vec<_>>(),
        vec![1, 6, 11]
    );
}

#[test]
fn test_position_updates_follow_active_deck() {
    let mut h = Harness::new(PlaybackConfig::default());
    h.start(3, 30);
    h.tick(1, 4);

    let last = h
        .events
        .iter()
        .rev()
        .find_map(|e| match e {
            PlaybackEvent::PositionUpdate {
                position_ms,
                duration_ms,
            } => Some((*position_ms, *duration_ms)),
            _ => None,
        })
        .unwrap();
    assert_eq!(last, (4000, Some(30_000)));

    // Standby deck progress is not surfaced
    let before = h.events.len();
    h.progress(common::B, 9.0, 1.5);
    assert_eq!(h.events.len(), before);
}
