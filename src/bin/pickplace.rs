//! Pick-and-place cell daemon
//!
//! Connects every peripheral, homes the arm, then loops the pick-and-place
//! cycle until interrupted, a peripheral fails, or `--cycles` is reached.

use anyhow::{Context, Result};
use clap::Parser;
use pickplace::{Config, ConsoleTelemetry, Mode, Orchestrator, Peripherals};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pickplace")]
#[command(about = "Pick-and-place cell orchestrator for a UR arm, gripper and solenoid")]
#[command(version)]
struct Args {
    /// Path to the cell configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured mode (task_driven or fixed_cycle)
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Stop after this many completed cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Print stage and cycle events to stdout as JSON lines
    #[arg(long)]
    events: bool,
}

impl Args {
    fn get_config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| std::env::var("PICKPLACE_CONFIG").ok())
            .unwrap_or_else(|| "config/default_config.yaml".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.get_config_path();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Pick-and-Place Orchestrator");
    info!("{}", "=".repeat(50));
    info!("Using config: {}", config_path);

    let mut config = Config::load_from_path(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    if let Some(mode) = args.mode {
        config.mode = mode;
        config.validate().context("Config invalid for the requested mode")?;
    }

    let peripherals = match Peripherals::connect(&config).await {
        Ok(peripherals) => peripherals,
        Err(e) => {
            error!("Peripheral initialization failed: {}", e);
            error!("Make sure:");
            error!("   - Robot simulator/hardware is running");
            error!("   - Gripper controller and solenoid relay are reachable");
            error!("   - Task server is listening (task_driven mode)");
            return Err(e).context("Failed to connect peripherals");
        }
    };

    let mut orchestrator = Orchestrator::new(&config, peripherals)
        .context("Failed to create orchestrator")?;
    if args.events {
        orchestrator = orchestrator.with_telemetry(Box::new(ConsoleTelemetry::new()));
    }

    tokio::select! {
        result = orchestrator.run(args.cycles) => {
            if let Err(e) = result {
                error!("Halted at {} after {} cycle(s): {}", orchestrator.stage(), orchestrator.cycles_completed(), e);
                return Err(e).context("Pick-and-place loop failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
        }
    }

    info!("Shutdown complete after {} cycle(s)", orchestrator.cycles_completed());
    Ok(())
}
