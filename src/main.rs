//! CLI entry point for adl-bridge
//!
//! Provides command-line interface for:
//! - Running the bridge (queue → daily log files) until interrupted
//! - Injecting test messages into the queue
//!
//! # Usage
//!
//! Run the bridge:
//! ```bash
//! adl-bridge run --config config/adl_bridge.toml
//! ```
//!
//! Send test traffic:
//! ```bash
//! adl-bridge send device door_open
//! adl-bridge send env 1013.2 21.5 45.0 120.3 25.0 25.0 500.0 0.5 80.0
//! ```

use adl_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use adl_bridge::logging;
use adl_bridge::record::{Envelope, EnvironmentalSample, FixedPoint, ENVIRONMENTAL_READINGS};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "adl-bridge")]
#[command(about = "Persist queued sensor and event records into daily log files", long_about = None)]
struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the queue until Ctrl+C
    Run,

    /// Send one message to the queue
    Send {
        #[command(subcommand)]
        message: Message,
    },
}

#[derive(Subcommand)]
enum Message {
    /// Device event text
    Device { text: String },
    /// Sound event text
    Sound { text: String },
    /// Environmental sample: press temp humid gas_raw iaq s_iaq eco2 bvoc gas_percent
    Env {
        #[arg(num_args = ENVIRONMENTAL_READINGS, required = true, allow_hyphen_values = true)]
        values: Vec<FixedPoint>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BridgeConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    logging::init_from_config(&config.logging).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Run => run_bridge(&config).await,
        Commands::Send { message } => send_message(&config, message),
    }
}

#[cfg(target_os = "linux")]
async fn run_bridge(config: &BridgeConfig) -> Result<()> {
    use adl_bridge::bridge::Bridge;

    let mut bridge = Bridge::start(config).context("starting bridge")?;
    let exit = bridge
        .take_exit()
        .ok_or_else(|| anyhow!("consumer exit channel already taken"))?;

    info!(key = config.queue.key, "Bridge running - press Ctrl+C to stop");

    let worker_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl+C")?;
            info!("Termination requested");
            None
        }
        result = exit => Some(result),
    };

    let stats = bridge.shutdown();
    info!(rows = stats.rows_written, "Log file closed");

    match worker_exit {
        None => Ok(()),
        Some(Ok(Err(e))) => {
            error!(error = %e, "Consumer failed");
            Err(e.into())
        }
        Some(Ok(Ok(()))) => bail!("consumer stopped without a shutdown request"),
        Some(Err(_)) => bail!("consumer thread ended without reporting a result"),
    }
}

#[cfg(not(target_os = "linux"))]
async fn run_bridge(_config: &BridgeConfig) -> Result<()> {
    bail!("System V message queues are only supported on Linux")
}

#[cfg(target_os = "linux")]
fn send_message(config: &BridgeConfig, message: Message) -> Result<()> {
    use adl_bridge::queue::SysvQueue;

    let envelope = match message {
        Message::Device { text } => Envelope::device(&text)?,
        Message::Sound { text } => Envelope::sound(&text)?,
        Message::Env { values } => {
            let readings: [FixedPoint; ENVIRONMENTAL_READINGS] = values
                .try_into()
                .map_err(|v: Vec<FixedPoint>| {
                    anyhow!("expected {ENVIRONMENTAL_READINGS} readings, got {}", v.len())
                })?;
            Envelope::environmental(&EnvironmentalSample::from(readings))
        }
    };

    let queue = SysvQueue::attach(config.queue.key)?;
    queue.send(&envelope)?;
    info!(key = queue.key(), kind = envelope.discriminant(), "Message sent");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn send_message(_config: &BridgeConfig, _message: Message) -> Result<()> {
    bail!("System V message queues are only supported on Linux")
}
