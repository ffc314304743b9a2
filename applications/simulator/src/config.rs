/// Simulator configuration
///
/// Layered lowest to highest: built-in defaults, a TOML file, `ENCORE_`
/// environment variables (`__` separates nested keys, e.g.
/// `ENCORE_PLAYBACK__CROSSFADE__DURATION_MS=8000`), then CLI flags.
use anyhow::{bail, Context, Result};
use encore_playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "encore.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SimConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub sim: SimSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimSettings {
    /// Number of generated tracks
    #[serde(default = "default_tracks")]
    pub tracks: usize,

    /// Length of every generated track
    #[serde(default = "default_track_secs")]
    pub track_secs: u64,

    /// Deck clock resolution
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Simulated round trip of the URL service
    #[serde(default = "default_resolve_latency_ms")]
    pub resolve_latency_ms: u64,

    /// Probability (0.0-1.0) that a URL request fails
    #[serde(default)]
    pub resolve_failure_rate: f64,

    /// Zero-based index of a track whose deck errors every time it loads
    #[serde(default)]
    pub fail_track: Option<usize>,

    /// Simulated second at which connectivity drops
    #[serde(default)]
    pub offline_at_secs: Option<u64>,

    /// Simulated second at which connectivity returns
    #[serde(default)]
    pub online_at_secs: Option<u64>,

    /// Hard stop
    #[serde(default = "default_max_secs")]
    pub max_secs: u64,

    /// Seed for shuffle and resolver failures
    #[serde(default)]
    pub seed: Option<u64>,

    /// Run against the wall clock instead of an accelerated one
    #[serde(default)]
    pub realtime: bool,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            tracks: default_tracks(),
            track_secs: default_track_secs(),
            tick_ms: default_tick_ms(),
            resolve_latency_ms: default_resolve_latency_ms(),
            resolve_failure_rate: 0.0,
            fail_track: None,
            offline_at_secs: None,
            online_at_secs: None,
            max_secs: default_max_secs(),
            seed: None,
            realtime: false,
        }
    }
}

/// Command-line overrides, applied on top of file and environment
#[derive(Debug, Default, Clone, clap::Args)]
pub struct Overrides {
    /// Number of generated tracks
    #[arg(long)]
    pub tracks: Option<usize>,

    /// Length of every generated track in seconds
    #[arg(long)]
    pub track_secs: Option<u64>,

    /// Crossfade length in seconds (0 disables crossfading)
    #[arg(long)]
    pub crossfade_secs: Option<u64>,

    /// Shuffle the generated playlist
    #[arg(long)]
    pub shuffle: bool,

    /// Drop connectivity at this simulated second
    #[arg(long)]
    pub offline_at: Option<u64>,

    /// Restore connectivity at this simulated second
    #[arg(long)]
    pub online_at: Option<u64>,

    /// Zero-based index of a track that always fails to play
    #[arg(long)]
    pub fail_track: Option<usize>,

    /// Probability (0.0-1.0) that resolving a URL fails
    #[arg(long)]
    pub resolve_failure_rate: Option<f64>,

    /// Stop after this many simulated seconds
    #[arg(long)]
    pub max_secs: Option<u64>,

    /// Seed for shuffle and injected failures
    #[arg(long)]
    pub seed: Option<u64>,

    /// Follow the wall clock instead of fast-forwarding
    #[arg(long)]
    pub realtime: bool,
}

impl SimConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        settings = match path {
            Some(path) => settings.add_source(config::File::from(path).required(true)),
            None => settings
                .add_source(config::File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false)),
        };

        settings = settings.add_source(
            config::Environment::with_prefix("ENCORE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        settings
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, overrides: &Overrides) {
        let sim = &mut self.sim;
        if let Some(tracks) = overrides.tracks {
            sim.tracks = tracks;
        }
        if let Some(secs) = overrides.track_secs {
            sim.track_secs = secs;
        }
        if let Some(secs) = overrides.offline_at {
            sim.offline_at_secs = Some(secs);
        }
        if let Some(secs) = overrides.online_at {
            sim.online_at_secs = Some(secs);
        }
        if let Some(index) = overrides.fail_track {
            sim.fail_track = Some(index);
        }
        if let Some(rate) = overrides.resolve_failure_rate {
            sim.resolve_failure_rate = rate;
        }
        if let Some(secs) = overrides.max_secs {
            sim.max_secs = secs;
        }
        if let Some(seed) = overrides.seed {
            sim.seed = Some(seed);
        }
        sim.realtime |= overrides.realtime;

        match overrides.crossfade_secs {
            Some(0) => self.playback.crossfade.enabled = false,
            Some(secs) => {
                self.playback.crossfade.enabled = true;
                self.playback.crossfade.duration_ms = secs * 1000;
            }
            None => {}
        }
        self.playback.shuffle |= overrides.shuffle;
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.playback
            .validate()
            .context("invalid playback configuration")?;

        let sim = &self.sim;
        if sim.tracks == 0 {
            bail!("sim.tracks must be at least 1");
        }
        if sim.track_secs == 0 {
            bail!("sim.track_secs must be at least 1");
        }
        if sim.tick_ms == 0 {
            bail!("sim.tick_ms must be at least 1");
        }
        if !(0.0..=1.0).contains(&sim.resolve_failure_rate) {
            bail!(
                "sim.resolve_failure_rate must be within 0.0-1.0, got {}",
                sim.resolve_failure_rate
            );
        }
        if let Some(index) = sim.fail_track {
            if index >= sim.tracks {
                bail!("sim.fail_track {index} is out of range for {} tracks", sim.tracks);
            }
        }
        if let (Some(offline), Some(online)) = (sim.offline_at_secs, sim.online_at_secs) {
            if online <= offline {
                bail!("sim.online_at_secs ({online}) must come after sim.offline_at_secs ({offline})");
            }
        }
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

// Default values
fn default_tracks() -> usize {
    8
}

fn default_track_secs() -> u64 {
    30
}

fn default_tick_ms() -> u64 {
    250
}

fn default_resolve_latency_ms() -> u64 {
    120
}

fn default_max_secs() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sim.tracks, 8);
        assert!(config.playback.crossfade.enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: SimConfig = toml::from_str(
            r#"
            [sim]
            tracks = 3
            fail_track = 1

            [playback.crossfade]
            duration_ms = 8000
            "#,
        )
        .unwrap();

        assert_eq!(config.sim.tracks, 3);
        assert_eq!(config.sim.fail_track, Some(1));
        assert_eq!(config.sim.track_secs, 30);
        assert_eq!(config.playback.crossfade.duration_ms, 8000);
        assert_eq!(config.playback.crossfade.steps, 50);
        assert_eq!(config.playback.recovery.max_retries, 3);
    }

    #[test]
    fn overrides_win() {
        let mut config = SimConfig::default();
        config.apply(&Overrides {
            tracks: Some(2),
            crossfade_secs: Some(8),
            shuffle: true,
            offline_at: Some(10),
            ..Default::default()
        });

        assert_eq!(config.sim.tracks, 2);
        assert_eq!(config.sim.offline_at_secs, Some(10));
        assert_eq!(config.playback.crossfade.duration_ms, 8000);
        assert!(config.playback.shuffle);
    }

    #[test]
    fn zero_crossfade_disables_fading() {
        let mut config = SimConfig::default();
        config.apply(&Overrides {
            crossfade_secs: Some(0),
            ..Default::default()
        });
        assert!(!config.playback.crossfade.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inconsistent_settings() {
        let mut config = SimConfig::default();
        config.sim.fail_track = Some(8);
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.sim.offline_at_secs = Some(20);
        config.sim.online_at_secs = Some(10);
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.sim.resolve_failure_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.playback.crossfade.steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn renders_toml_that_reads_back() {
        let mut config = SimConfig::default();
        config.sim.seed = Some(42);
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[sim]"));
        let parsed: SimConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
