//! Pick-and-place manual control
//!
//! Sends single directives to one peripheral at a time, for commissioning
//! and for recovering the cell after an aborted cycle.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pickplace::{
    Config, Direction, GripperActuator, HttpGripperTransport, MotionChannel,
    MoveCommand, MoveKind, Pose, SolenoidTrigger, UdpSolenoid, UrScriptChannel, Waypoint,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pickplace-cli")]
#[command(about = "Send manual directives to the pick-and-place cell")]
#[command(version)]
struct Args {
    /// Path to the cell configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move the arm to the configured home pose
    Home,
    /// Move the arm to a pose
    Move {
        /// movej/joint or movel/linear
        #[arg(short, long, default_value = "movej")]
        kind: MoveKind,
        /// x y z rx ry rz
        #[arg(num_args = 6, allow_hyphen_values = true, required = true)]
        pose: Vec<f64>,
        /// Move duration in seconds
        #[arg(short, long, default_value = "2.0")]
        duration: f64,
    },
    /// Linear move between a pose and the clearance pose above it
    Vertical {
        /// up or down
        direction: Direction,
        /// x y z rx ry rz of the waypoint
        #[arg(num_args = 6, allow_hyphen_values = true, required = true)]
        pose: Vec<f64>,
        /// Clearance above the waypoint in meters
        #[arg(short, long, default_value = "0.05")]
        lift: f64,
        /// Move duration in seconds
        #[arg(short, long, default_value = "0.5")]
        duration: f64,
    },
    /// Set the controller's payload mass in kg
    Payload { mass: f64 },
    /// Command the gripper to a width in mm and wait for it to settle
    Gripper { width: f64 },
    /// Fire the solenoid once
    Pulse,
}

fn parse_pose(values: &[f64]) -> Result<Pose> {
    let values: [f64; 6] = values
        .try_into()
        .map_err(|_| anyhow::anyhow!("Expected 6 pose values, got {}", values.len()))?;
    Ok(Pose::from(values))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("PICKPLACE_CONFIG").ok())
        .unwrap_or_else(|| "config/default_config.yaml".to_string());
    let config = Config::load_from_path(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    match args.command {
        Commands::Home => {
            let command = MoveCommand::joint(config.robot.home_pose, config.timing.home_move);
            send_move(&config, &command).await?;
        }
        Commands::Move { kind, pose, duration } => {
            let command = MoveCommand {
                kind,
                target: parse_pose(&pose)?,
                duration,
            };
            send_move(&config, &command).await?;
        }
        Commands::Vertical { direction, pose, lift, duration } => {
            let waypoint = Waypoint {
                pose: parse_pose(&pose)?,
                lift_height: lift,
            };
            let command = MoveCommand::linear(waypoint.vertical(direction), duration);
            send_move(&config, &command).await?;
        }
        Commands::Payload { mass } => {
            let mut channel = UrScriptChannel::connect(&config.robot_address(), &config.connection).await?;
            channel.send_payload(mass).await?;
        }
        Commands::Gripper { width } => {
            let transport = HttpGripperTransport::new(&config.gripper)?;
            let gripper = GripperActuator::new(
                Box::new(transport),
                config.gripper.force,
                config.gripper.settle.clone(),
            );
            gripper.set_width(width).await?;
            info!("Gripper settled at {}mm", width);
        }
        Commands::Pulse => {
            let mut solenoid = UdpSolenoid::bind(&config.solenoid).await?;
            solenoid.pulse().await?;
        }
    }

    Ok(())
}

async fn send_move(config: &Config, command: &MoveCommand) -> Result<()> {
    command.validate()?;
    let mut channel = UrScriptChannel::connect(&config.robot_address(), &config.connection)
        .await
        .context("Failed to connect to robot")?;
    channel.send_move(command).await?;
    Ok(())
}
