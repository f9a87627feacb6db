//! doorbridge - doorbell MQTT bridges
//!
//! Subcommands:
//! - `doorbridge log` - Record device sessions to CSV and notify on start/end
//! - `doorbridge pushover` - Forward every doorbell message to Pushover
//! - `doorbridge ntfy` - Forward every doorbell message to ntfy
//! - `doorbridge config` - Show or write the configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use doorbridge::notify::{DispatchWorker, NtfyNotifier, PushoverNotifier};
use doorbridge::subscriber::{self, SubscriberConfig};
use doorbridge::{
    telemetry, Dispatcher, ForwardPipeline, MessageHandler, Notifier, SessionManager,
    SessionPipeline,
};
use doorconf::{ConfigSources, DoorConfig};
use tokio_util::sync::CancellationToken;

/// How long queued notifications get to drain at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "doorbridge")]
#[command(about = "MQTT bridges for the doorbell")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./doorbridge.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log device sessions to CSV files
    Log {
        /// Where session start/end notifications go
        #[arg(long, value_enum, default_value_t = NotifierKind::Pushover)]
        notifier: NotifierKind,

        /// Directory for session logs (overrides paths.sessions_dir)
        #[arg(long)]
        sessions_dir: Option<PathBuf>,
    },

    /// Forward all doorbell messages to Pushover
    Pushover,

    /// Forward all doorbell messages to ntfy
    Ntfy,

    /// Print the effective configuration
    Config {
        /// Write a default config file here instead
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NotifierKind {
    Pushover,
    Ntfy,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { write: Some(path) } = &cli.command {
        DoorConfig::write_default(path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let (config, sources) = DoorConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Config { .. } => {
            print_config(&config, &sources);
            Ok(())
        }
        Commands::Log {
            notifier,
            sessions_dir,
        } => {
            let guard = telemetry::init(&config.infra.telemetry, "log")?;
            let result = run_logger(&config, notifier, sessions_dir).await;
            guard.shutdown();
            result
        }
        Commands::Pushover => {
            let guard = telemetry::init(&config.infra.telemetry, "pushover")?;
            let result = run_forwarder(&config, NotifierKind::Pushover).await;
            guard.shutdown();
            result
        }
        Commands::Ntfy => {
            let guard = telemetry::init(&config.infra.telemetry, "ntfy")?;
            let result = run_forwarder(&config, NotifierKind::Ntfy).await;
            guard.shutdown();
            result
        }
    }
}

fn print_config(config: &DoorConfig, sources: &ConfigSources) {
    if sources.files.is_empty() {
        println!("# No config files found, using defaults");
    }
    for file in &sources.files {
        println!("# Loaded from {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# Overridden by ${}", var);
    }
    println!();
    print!("{}", config.redacted().to_toml());
}

fn build_notifier(kind: NotifierKind, config: &DoorConfig) -> Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match kind {
        NotifierKind::Pushover => Arc::new(
            PushoverNotifier::from_config(&config.services.pushover)
                .context("Cannot start Pushover notifications")?,
        ),
        NotifierKind::Ntfy => Arc::new(
            NtfyNotifier::from_config(&config.services.ntfy)
                .context("Cannot start ntfy notifications")?,
        ),
    };
    Ok(notifier)
}

async fn run_logger(
    config: &DoorConfig,
    kind: NotifierKind,
    sessions_dir: Option<PathBuf>,
) -> Result<()> {
    let notifier = build_notifier(kind, config)?;
    let sessions_dir = sessions_dir.unwrap_or_else(|| config.infra.paths.sessions_dir.clone());

    let (dispatcher, worker) = Dispatcher::spawn(notifier);
    let manager = SessionManager::new(&sessions_dir, dispatcher)
        .context("Cannot prepare sessions directory")?;
    tracing::info!("📼 Logging sessions to {}", sessions_dir.display());

    let pipeline = SessionPipeline::new(config.infra.mqtt.topic("debug"), manager);
    serve(config, "log", Box::new(pipeline), worker).await
}

async fn run_forwarder(config: &DoorConfig, kind: NotifierKind) -> Result<()> {
    let notifier = build_notifier(kind, config)?;
    tracing::info!("🔔 Forwarding doorbell messages to {}", notifier.name());

    let (dispatcher, worker) = Dispatcher::spawn(notifier);
    let pipeline = ForwardPipeline::new(config.infra.mqtt.topic("#"), dispatcher);
    let bridge = match kind {
        NotifierKind::Pushover => "pushover",
        NotifierKind::Ntfy => "ntfy",
    };
    serve(config, bridge, Box::new(pipeline), worker).await
}

/// Run the subscriber until a signal arrives, then drain notifications.
async fn serve(
    config: &DoorConfig,
    bridge: &str,
    mut handler: Box<dyn MessageHandler>,
    worker: DispatchWorker,
) -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let result = subscriber::run(
        SubscriberConfig::from_mqtt(&config.infra.mqtt, bridge),
        handler.as_mut(),
        shutdown,
    )
    .await;

    // The handler owns the last Dispatcher; dropping it lets the worker drain
    drop(handler);
    worker.finish(DRAIN_TIMEOUT).await;

    tracing::info!("Shutdown complete");
    result
}

/// Cancel `token` on SIGINT (Ctrl+C) or SIGTERM (systemd, docker stop).
async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = sigterm() => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
    token.cancel();
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to set up SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
