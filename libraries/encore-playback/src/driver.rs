//! Tokio runtime driver
//!
//! Runs a [`PlaybackSession`] on its own task: feeds it inputs from a
//! channel, resolves URLs on spawned tasks, sleeps until the next timer
//! deadline and broadcasts drained events. The session stays the single
//! owner of playback state; the driver only moves messages and time.

use crate::{
    channel::MediaEvent,
    error::{PlaybackError, Result},
    events::PlaybackEvent,
    session::{Command, MediaKey, PlaybackSession},
    types::{ChannelId, RequestId},
};
use encore_core::{CoreError, TrackResolver};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const INPUT_CAPACITY: usize = 256;
const EVENT_CAPACITY: usize = 1024;

/// Input delivered to a running session
#[derive(Debug, Clone)]
pub enum DriverInput {
    /// User command
    Command(Command),
    /// Observer event from a deck
    Media {
        /// Deck that reported it
        channel: ChannelId,
        /// What happened
        event: MediaEvent,
    },
    /// Connectivity changed
    Connectivity(bool),
    /// Page/app visibility changed
    Visibility(bool),
    /// System media key
    MediaKey(MediaKey),
}

enum Input {
    External(DriverInput),
    Resolved {
        request: RequestId,
        result: std::result::Result<String, CoreError>,
    },
    Shutdown,
}

/// Handle to a session running on a tokio task
#[derive(Debug)]
pub struct SessionHandle {
    inputs: mpsc::Sender<Input>,
    events: broadcast::Sender<PlaybackEvent>,
    task: JoinHandle<PlaybackSession>,
}

impl SessionHandle {
    /// Deliver an input
    ///
    /// # Errors
    /// `SessionClosed` once the session task has stopped
    pub async fn send(&self, input: DriverInput) -> Result<()> {
        self.inputs
            .send(Input::External(input))
            .await
            .map_err(|_| PlaybackError::SessionClosed)
    }

    /// Shorthand for sending a [`Command`]
    ///
    /// # Errors
    /// `SessionClosed` once the session task has stopped
    pub async fn command(&self, command: Command) -> Result<()> {
        self.send(DriverInput::Command(command)).await
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Stop the session task and take the session back
    ///
    /// # Errors
    /// `SessionClosed` if the task already ended abnormally
    pub async fn shutdown(self) -> Result<PlaybackSession> {
        // The task may already be gone; the join below reports that
        let _ = self.inputs.send(Input::Shutdown).await;
        self.task.await.map_err(|e| {
            warn!(error = %e, "session task ended abnormally");
            PlaybackError::SessionClosed
        })
    }
}

/// Spawn `session` on the current tokio runtime
///
/// URL resolution requests are answered by `resolver` on separate tasks.
pub fn spawn_session(session: PlaybackSession, resolver: Arc<dyn TrackResolver>) -> SessionHandle {
    let (inputs, rx) = mpsc::channel(INPUT_CAPACITY);
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let task = tokio::spawn(run(session, resolver, inputs.downgrade(), rx, events.clone()));
    SessionHandle {
        inputs,
        events,
        task,
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

async fn run(
    mut session: PlaybackSession,
    resolver: Arc<dyn TrackResolver>,
    loopback: mpsc::WeakSender<Input>,
    mut rx: mpsc::Receiver<Input>,
    events: broadcast::Sender<PlaybackEvent>,
) -> PlaybackSession {
    info!("playback session started");
    loop {
        dispatch_resolutions(&mut session, &resolver, &loopback);
        publish(&mut session, &events);

        let input = match session.next_deadline() {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                tokio::select! {
                    input = rx.recv() => input,
                    () = tokio::time::sleep_until(deadline) => {
                        session.advance_timers(now());
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        let now = now();
        match input {
            Some(Input::External(input)) => apply(&mut session, input, now, &events),
            Some(Input::Resolved { request, result }) => {
                session.complete_resolution(request, result, now);
            }
            Some(Input::Shutdown) | None => break,
        }
        session.advance_timers(now);
    }

    publish(&mut session, &events);
    info!("playback session stopped");
    session
}

fn apply(
    session: &mut PlaybackSession,
    input: DriverInput,
    now: std::time::Instant,
    events: &broadcast::Sender<PlaybackEvent>,
) {
    let result = match input {
        DriverInput::Command(command) => session.apply(command, now),
        DriverInput::Media { channel, event } => {
            session.handle_media_event(channel, event, now);
            Ok(())
        }
        DriverInput::Connectivity(online) => {
            session.set_online(online, now);
            Ok(())
        }
        DriverInput::Visibility(visible) => {
            session.set_visible(visible, now);
            Ok(())
        }
        DriverInput::MediaKey(key) => session.handle_media_key(key, now),
    };
    if let Err(e) = result {
        warn!(error = %e, "command rejected");
        let _ = events.send(PlaybackEvent::Error {
            message: e.to_string(),
        });
    }
}

fn dispatch_resolutions(
    session: &mut PlaybackSession,
    resolver: &Arc<dyn TrackResolver>,
    loopback: &mpsc::WeakSender<Input>,
) {
    for request in session.take_resolution_requests() {
        let resolver = Arc::clone(resolver);
        let loopback = loopback.clone();
        tokio::spawn(async move {
            let result = resolver.resolve_playable_url(&request.track).await;
            let Some(tx) = loopback.upgrade() else {
                debug!(request = %request.id, "session gone, dropping resolution");
                return;
            };
            let _ = tx
                .send(Input::Resolved {
                    request: request.id,
                    result,
                })
                .await;
        });
    }
}

fn publish(session: &mut PlaybackSession, events: &broadcast::Sender<PlaybackEvent>) {
    for event in session.drain_events() {
        // No subscribers is fine
        let _ = events.send(event);
    }
}
