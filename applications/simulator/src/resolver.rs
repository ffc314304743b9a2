//! Simulated signed-URL service

use crate::catalog;
use async_trait::async_trait;
use encore_core::{CoreError, Track, TrackResolver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

pub struct SimResolver {
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
    online: Arc<AtomicBool>,
}

impl SimResolver {
    /// `online` is shared with the ticker's outage schedule
    pub fn new(
        latency: Duration,
        failure_rate: f64,
        seed: Option<u64>,
        online: Arc<AtomicBool>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            latency,
            failure_rate,
            rng: Mutex::new(rng),
            online,
        }
    }

    fn roll(&self) -> (f64, u32) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (rng.gen(), rng.gen())
    }
}

#[async_trait]
impl TrackResolver for SimResolver {
    async fn resolve_playable_url(&self, track: &Track) -> encore_core::Result<String> {
        tokio::time::sleep(self.latency).await;

        if !self.online.load(Ordering::SeqCst) {
            return Err(CoreError::network("no connection"));
        }
        let (roll, signature) = self.roll();
        if roll < self.failure_rate {
            debug!(track_id = %track.id, "injected resolution failure");
            return Err(CoreError::resolution(
                track.id.clone(),
                "signing service unavailable",
            ));
        }
        Ok(catalog::playable_url(track, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_core::TrackId;

    fn track() -> Track {
        Track::new(TrackId::new("track-000"), "Track 1", "Artist", "audio/track-000.mp3")
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_to_a_simulated_url() {
        let resolver = SimResolver::new(
            Duration::from_millis(100),
            0.0,
            Some(1),
            Arc::new(AtomicBool::new(true)),
        );
        let url = resolver.resolve_playable_url(&track()).await.unwrap();
        assert_eq!(
            catalog::track_id_from_url(&url),
            Some(TrackId::new("track-000"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fails_while_offline() {
        let online = Arc::new(AtomicBool::new(false));
        let resolver = SimResolver::new(Duration::ZERO, 0.0, Some(1), online.clone());
        let err = resolver.resolve_playable_url(&track()).await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));

        online.store(true, Ordering::SeqCst);
        assert!(resolver.resolve_playable_url(&track()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn certain_failure_rate_always_fails() {
        let resolver = SimResolver::new(
            Duration::ZERO,
            1.0,
            Some(7),
            Arc::new(AtomicBool::new(true)),
        );
        for _ in 0..5 {
            let err = resolver.resolve_playable_url(&track()).await.unwrap_err();
            assert!(matches!(err, CoreError::Resolution { .. }));
        }
    }
}
