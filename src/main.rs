use clap::{Parser, Subcommand};
use sonicbot::execution::PaperLedger;
use sonicbot::models::ChainEvent;
use sonicbot::risk::EventWindowMonitor;
use sonicbot::{Engine, EngineConfig, HttpSampler, Result, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "sonicbot", about = "Signal-gated trading engine for a single pool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until Ctrl+C
    Run {
        /// Path to a TOML/YAML/JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Read chain events as JSON lines from stdin
        #[arg(long, default_value_t = false)]
        events_stdin: bool,
    },
    /// Print the resolved settings as JSON
    ShowConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            events_stdin,
        } => run(Settings::load(config.as_deref())?, events_stdin).await,
        Commands::ShowConfig { config } => {
            let settings = Settings::load(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sonicbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(settings: Settings, events_stdin: bool) -> Result<()> {
    tracing::info!("🚀 SonicBot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Price feed: {}", settings.sampler.price_url);
    tracing::info!("  Volume feed: {}", settings.sampler.volume_url);
    tracing::info!("  Poll interval: {}s", settings.engine.poll_interval_secs);
    tracing::info!("  Cooldown: {}s", settings.trading.cooldown_secs);
    tracing::info!("  Min confidence: {}", settings.trading.min_confidence);
    tracing::info!("  Trading enabled: {}", settings.trading.trading_enabled);

    let sampler = Arc::new(HttpSampler::new(&settings.sampler)?);
    let risk = Arc::new(EventWindowMonitor::new(
        settings.risk.event_window,
        settings.suspicion_rules(),
    ));
    let engine = Arc::new(Engine::new(
        EngineConfig::from(&settings),
        sampler,
        risk,
        Arc::new(PaperLedger),
    ));

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let shutdown = CancellationToken::new();

    let reader = if events_stdin {
        Some(tokio::spawn(read_events(tx, shutdown.clone())))
    } else {
        // Keep the channel open; without a watcher only the poll loop triggers
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                shutdown.cancelled().await;
                drop(tx);
            }
        });
        None
    };

    let engine_task = tokio::spawn(engine.run(rx, shutdown.clone()));
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::signal::ctrl_c().await?;
    tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
    shutdown.cancel();

    if let Err(e) = engine_task.await {
        tracing::error!("Engine task failed: {}", e);
    }
    if let Some(reader) = reader {
        reader.abort();
    }

    tracing::info!("👋 SonicBot stopped");
    Ok(())
}

/// Forward JSON-encoded chain events from stdin to the engine
async fn read_events(tx: mpsc::Sender<ChainEvent>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<ChainEvent>(&line) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Ignoring malformed chain event: {}", e),
            },
            Ok(None) => {
                tracing::info!("Event input closed");
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read chain events: {}", e);
                break;
            }
        }
    }
}
