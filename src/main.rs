use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use audion_cli::aggregator::SessionAggregator;
use audion_cli::panel::DevtoolsMessage;
use audion_cli::{metrics, replay, AppConfig, DevtoolSession};
use cdp_adapter::{ChannelTransport, FrameRoutes};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Audion - WebAudio graph inspector backend
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded protocol session and print panel messages as JSON lines
    Replay {
        /// JSON-lines recording of `{method, params, sessionId?}` events
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Do not poll realtime telemetry
        #[arg(long)]
        no_realtime: bool,

        /// Print Prometheus metrics to stderr after the replay
        #[arg(long)]
        metrics: bool,
    },
    /// Print the effective configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, config.json_logs)?;
    metrics::register_metrics();

    match cli.command {
        Commands::Replay {
            file,
            no_realtime,
            metrics,
        } => {
            let mut config = config;
            if no_realtime {
                config.integrator.realtime_enabled = false;
            }
            cmd_replay(config, file, metrics).await
        }
        Commands::Config => cmd_config(&config),
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let level: tracing::Level = level.parse().context("Invalid log level")?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    // stdout carries panel messages; logs go to stderr.
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
    Ok(())
}

async fn cmd_replay(config: AppConfig, file: PathBuf, print_metrics: bool) -> Result<()> {
    let events = replay::read_recording(&file)
        .with_context(|| format!("Failed to read recording {}", file.display()))?;
    info!(target: "audion-session", events = events.len(), path = %file.display(), "replaying recording");

    if config.integrator.realtime_enabled {
        warn!(target: "audion-session", "recordings cannot answer telemetry requests; consider --no-realtime");
    }

    let (transport, tx) = ChannelTransport::new_pair(config.integrator.event_buffer);
    let routes = Arc::new(FrameRoutes::new());
    let session = DevtoolSession::start_with_aggregator(
        &config.integrator,
        transport,
        routes,
        SessionAggregator::new(config.update_buffer),
    )
    .await
    .context("Failed to start devtool session")?;

    let aggregator = session.aggregator().clone();
    let mut connection = session.connect();
    let feeder = tokio::spawn(replay::feed(events, tx));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let closed = session.closed();
    tokio::pin!(closed);
    loop {
        tokio::select! {
            message = connection.next() => match message {
                Some(message) => print_message(&mut out, &message)?,
                None => break,
            },
            result = &mut closed => {
                result.context("Devtool session failed")?;
                break;
            }
        }
    }
    while let Some(message) = connection.try_next() {
        print_message(&mut out, &message)?;
    }

    let sent = feeder.await.context("Replay feeder failed")?;
    print_message(
        &mut out,
        &DevtoolsMessage::AllGraphs {
            all_graphs: aggregator.all_graphs(),
        },
    )?;
    info!(target: "audion-session", sent, contexts = aggregator.all_graphs().len(), "replay finished");

    if print_metrics {
        eprint!("{}", metrics::render());
    }
    Ok(())
}

fn print_message(out: &mut impl Write, message: &DevtoolsMessage) -> Result<()> {
    let line = serde_json::to_string(message).context("Failed to encode panel message")?;
    writeln!(out, "{line}").context("Failed to write panel message")?;
    Ok(())
}

fn cmd_config(config: &AppConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to encode configuration")?;
    print!("{yaml}");
    Ok(())
}
