//! Peripheral bring-up
//!
//! Opens every connection the orchestrator needs, once, at startup. The
//! task source is connected first so a missing task server fails fast before
//! the arm is touched.

use crate::{
    config::{Config, Mode},
    error::Result,
    gripper::{GripperActuator, HttpGripperTransport},
    monitor::{MotionMonitor, TcpMotionMonitor},
    motion::{MotionChannel, UrScriptChannel},
    solenoid::{SolenoidTrigger, UdpSolenoid},
    task::{TaskSource, TcpTaskSource},
};
use tracing::info;

/// Everything the orchestrator drives, exclusively owned
pub struct Peripherals {
    pub motion: Box<dyn MotionChannel>,
    pub gripper: GripperActuator,
    pub solenoid: Box<dyn SolenoidTrigger>,
    pub monitor: Option<Box<dyn MotionMonitor>>,
    pub task_source: Option<Box<dyn TaskSource>>,
}

impl Peripherals {
    pub async fn connect(config: &Config) -> Result<Self> {
        info!("Connecting peripherals for {} mode", config.mode);

        let task_source: Option<Box<dyn TaskSource>> = match (&config.mode, &config.task_source) {
            (Mode::TaskDriven, Some(source)) => {
                Some(Box::new(TcpTaskSource::connect(source, &config.connection).await?))
            }
            _ => None,
        };

        let motion = UrScriptChannel::connect(&config.robot_address(), &config.connection).await?;

        // Fixed-cycle mode runs purely on delays
        let monitor: Option<Box<dyn MotionMonitor>> = match (&config.mode, &config.monitor) {
            (Mode::TaskDriven, Some(monitor)) => {
                Some(Box::new(TcpMotionMonitor::connect(monitor, &config.connection).await?))
            }
            _ => None,
        };

        let transport = HttpGripperTransport::new(&config.gripper)?;
        let gripper = GripperActuator::new(
            Box::new(transport),
            config.gripper.force,
            config.gripper.settle.clone(),
        );

        let solenoid = UdpSolenoid::bind(&config.solenoid).await?;

        info!("All peripherals connected");
        Ok(Self {
            motion: Box::new(motion),
            gripper,
            solenoid: Box::new(solenoid),
            monitor,
            task_source,
        })
    }
}
