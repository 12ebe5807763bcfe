//! Pick-and-place cell orchestrator
//!
//! Drives a UR arm, an HTTP-controlled two-finger gripper and a UDP-triggered
//! solenoid through a fixed pick-and-place cycle, with tasks either fetched
//! from a TCP task server or taken from configuration.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pickplace::{Config, Orchestrator, Peripherals};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_from_path("config/default_config.yaml")?;
//!     let peripherals = Peripherals::connect(&config).await?;
//!
//!     let mut orchestrator = Orchestrator::new(&config, peripherals)?;
//!     orchestrator.run(Some(1)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Orchestrator**: stage-by-stage cycle state machine
//! - **MotionChannel**: URScript move and payload directives over TCP
//! - **GripperActuator**: width requests over HTTP, settled by delay or sensor feedback
//! - **SolenoidTrigger**: single UDP datagram pulse
//! - **MotionMonitor**: optional arrival rendezvous over TCP
//! - **TaskSource**: request/response task records over TCP
//! - **CycleTelemetry**: transport-agnostic stage and cycle events

pub mod config;
pub mod connection;
pub mod error;
pub mod gripper;
pub mod monitor;
pub mod motion;
pub mod orchestrator;
pub mod peripherals;
pub mod solenoid;
pub mod task;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::{Config, Mode};
pub use error::{PnpError, Result};
pub use gripper::{GripperActuator, GripperSpec, GripperTransport, HttpGripperTransport, SettleStrategy};
pub use monitor::{MotionMonitor, TcpMotionMonitor};
pub use motion::{Direction, MotionChannel, MoveCommand, MoveKind, Pose, UrScriptChannel};
pub use orchestrator::{Orchestrator, Stage};
pub use peripherals::Peripherals;
pub use solenoid::{SolenoidTrigger, UdpSolenoid};
pub use task::{Task, TaskSource, TcpTaskSource, Waypoint};
pub use telemetry::{ConsoleTelemetry, CycleSummary, CycleTelemetry, NoOpTelemetry, StageEvent};
