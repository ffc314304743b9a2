/// Encore Simulator - drives the playback engine against simulated decks
use anyhow::Context;
use clap::{Parser, Subcommand};
use encore_playback::{
    spawn_session, ChannelId, Command, PlayQueue, PlaybackEvent, PlaybackSession, Services,
};
use encore_sim::{
    deck::SharedDeck,
    report::{self, Summary},
    services::{LogHistory, LogNotifier, LogPlatform},
    ticker::{Outage, Ticker},
    Catalog, Overrides, SimConfig, SimResolver, SimulatedDeck,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "encore_sim=info,encore_playback=info";
const VERBOSE_FILTER: &str = "encore_sim=debug,encore_playback=debug";

#[derive(Parser)]
#[command(name = "encore-sim")]
#[command(about = "Continuous playback simulator", long_about = None)]
struct Cli {
    /// Log at debug level (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (default: ./encore.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a generated playlist to the end
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let fallback = if cli.verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (Commands::Run { overrides } | Commands::Config { overrides }) = &cli.command;
    let mut config = SimConfig::load(cli.config.as_deref())?;
    config.apply(overrides);
    config.validate()?;

    match cli.command {
        Commands::Run { .. } => run(config).await?,
        Commands::Config { .. } => {
            let rendered = config.to_toml()?;
            writeln!(std::io::stdout().lock(), "{rendered}")?;
        }
    }

    Ok(())
}

async fn run(config: SimConfig) -> anyhow::Result<()> {
    let sim = config.sim.clone();
    if !sim.realtime {
        // Fast-forward: the clock jumps whenever every task is waiting
        tokio::time::pause();
    }

    info!("Starting Encore simulator");
    info!("Tracks: {} x {}s", sim.tracks, sim.track_secs);
    info!(
        "Crossfade: {}",
        if config.playback.crossfade.enabled {
            format!("{}ms", config.playback.crossfade.duration_ms)
        } else {
            "off".to_string()
        }
    );

    let catalog = Arc::new(Catalog::generate(&sim));
    let online = Arc::new(AtomicBool::new(true));
    let deck_a = SharedDeck::default();
    let deck_b = SharedDeck::default();

    let queue = match sim.seed {
        Some(seed) => PlayQueue::with_seed(seed),
        None => PlayQueue::new(),
    };
    let session = PlaybackSession::new(
        config.playback.clone(),
        Box::new(SimulatedDeck::new(ChannelId::A, deck_a.clone(), catalog.clone())),
        Box::new(SimulatedDeck::new(ChannelId::B, deck_b.clone(), catalog.clone())),
        Box::new(queue),
    )
    .context("failed to create playback session")?
    .with_services(Services {
        history: Box::new(LogHistory),
        notifier: Box::new(LogNotifier),
        platform: Box::new(LogPlatform),
        ..Services::default()
    });

    let resolver = Arc::new(SimResolver::new(
        Duration::from_millis(sim.resolve_latency_ms),
        sim.resolve_failure_rate,
        sim.seed,
        online.clone(),
    ));
    let handle = spawn_session(session, resolver);
    let mut events = handle.subscribe();

    let outage = Outage {
        offline_at: sim.offline_at_secs.map(Duration::from_secs),
        online_at: sim.online_at_secs.map(Duration::from_secs),
    };
    let ticker = Ticker::new(
        deck_a,
        deck_b,
        Duration::from_millis(sim.tick_ms),
        outage,
        online,
    );
    let (tick_tx, mut ticks) = mpsc::channel(64);
    let ticker = tokio::spawn(ticker.run(tick_tx));

    handle
        .command(Command::LoadQueue {
            tracks: catalog.tracks().to_vec(),
            start: None,
        })
        .await?;

    let started = tokio::time::Instant::now();
    let limit = tokio::time::sleep(Duration::from_secs(sim.max_secs));
    tokio::pin!(limit);
    let mut summary = Summary::default();

    loop {
        tokio::select! {
            () = &mut limit => {
                warn!(max_secs = sim.max_secs, "time limit reached");
                break;
            }
            Some(input) = ticks.recv() => handle.send(input).await?,
            event = events.recv() => match event {
                Ok(event) => {
                    report::log_event(&event);
                    summary.record(&event);
                    if matches!(event, PlaybackEvent::QueueEnded) {
                        info!("queue finished");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    ticker.abort();
    let session = handle.shutdown().await?;

    info!(
        simulated_secs = started.elapsed().as_secs_f64(),
        final_state = ?session.state(),
        tracks_started = summary.tracks_started,
        crossfades = summary.crossfades,
        hard_swaps = summary.hard_swaps,
        skips_after_failure = summary.skips_after_failure,
        reconnect_advances = summary.reconnect_advances,
        retries = summary.retries,
        errors = summary.errors,
        "simulation finished"
    );

    Ok(())
}
