//! Deck clock
//!
//! Every period the ticker advances playing decks, turns what they observed
//! into [`MediaEvent`]s and plays out the outage schedule. While offline,
//! decks stay "playing" but their clocks freeze, like an element starved of
//! data.

use crate::deck::{lock, SharedDeck};
use encore_playback::{ChannelId, DriverInput, MediaEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// When connectivity drops and returns, measured from the start of the run
#[derive(Debug, Clone, Copy, Default)]
pub struct Outage {
    pub offline_at: Option<Duration>,
    pub online_at: Option<Duration>,
}

pub struct Ticker {
    decks: [(ChannelId, SharedDeck); 2],
    period: Duration,
    elapsed: Duration,
    outage: Outage,
    online: Arc<AtomicBool>,
    went_offline: bool,
}

impl Ticker {
    pub fn new(
        deck_a: SharedDeck,
        deck_b: SharedDeck,
        period: Duration,
        outage: Outage,
        online: Arc<AtomicBool>,
    ) -> Self {
        Self {
            decks: [(ChannelId::A, deck_a), (ChannelId::B, deck_b)],
            period,
            elapsed: Duration::ZERO,
            outage,
            online,
            went_offline: false,
        }
    }

    /// Simulated time since the start of the run
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Advance one period and collect what the host would observe
    pub fn step(&mut self) -> Vec<DriverInput> {
        self.elapsed += self.period;
        let mut inputs = Vec::new();
        self.connectivity(&mut inputs);
        let online = self.online.load(Ordering::SeqCst);

        for (channel, deck) in &self.decks {
            let mut deck = lock(deck);
            if !deck.playing {
                continue;
            }
            if deck.faulty {
                deck.playing = false;
                inputs.push(media(*channel, MediaEvent::Error("decode error".to_string())));
                continue;
            }
            if !online {
                continue;
            }

            deck.position += self.period;
            let ended = deck.duration.is_some_and(|duration| deck.position >= duration);
            if let Some(duration) = deck.duration {
                deck.position = deck.position.min(duration);
            }
            inputs.push(media(
                *channel,
                MediaEvent::Progress {
                    position: deck.position,
                    duration: deck.duration,
                },
            ));
            if ended {
                deck.playing = false;
                inputs.push(media(*channel, MediaEvent::Ended));
            }
        }
        inputs
    }

    fn connectivity(&mut self, inputs: &mut Vec<DriverInput>) {
        let due = |at: Option<Duration>| at.is_some_and(|at| self.elapsed >= at);

        if !self.went_offline && due(self.outage.offline_at) {
            self.went_offline = true;
            self.online.store(false, Ordering::SeqCst);
            info!(at_secs = self.elapsed.as_secs_f64(), "simulated outage begins");
            inputs.push(DriverInput::Connectivity(false));
        } else if self.went_offline
            && !self.online.load(Ordering::SeqCst)
            && due(self.outage.online_at)
        {
            self.online.store(true, Ordering::SeqCst);
            info!(at_secs = self.elapsed.as_secs_f64(), "simulated outage ends");
            inputs.push(DriverInput::Connectivity(true));
        }
    }

    /// Tick until the receiver goes away
    pub async fn run(mut self, tx: mpsc::Sender<DriverInput>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            for input in self.step() {
                if tx.send(input).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn media(channel: ChannelId, event: MediaEvent) -> DriverInput {
    DriverInput::Media { channel, event }
}
