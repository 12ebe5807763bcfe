//! Pick-and-place cycle state machine
//!
//! Sequences motion, payload, solenoid and gripper commands into one
//! strictly ordered cycle. The peripherals share no completion protocol, so
//! ordering is enforced by waiting: every move is followed by a fixed delay
//! as a floor, joined with the motion monitor's arrival signal when one is
//! attached.

use crate::{
    config::{secs, validate_gripper_spec, Config, Mode, TimingConfig},
    error::{PnpError, Result},
    gripper::GripperActuator,
    monitor::MotionMonitor,
    motion::{Direction, MotionChannel, MoveCommand, Pose},
    peripherals::Peripherals,
    solenoid::SolenoidTrigger,
    task::{Task, TaskSource, Waypoint},
    telemetry::{CycleSummary, CycleTelemetry, NoOpTelemetry, StageEvent},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Position in the per-cycle sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Home,
    FetchTask,
    ConfigureGripper,
    TransitAbovePick,
    DescendPick,
    /// Payload model set to the item mass before lifting
    SetPayloadItem,
    TriggerSolenoid,
    CloseGripper,
    AscendPick,
    TransitAbovePlace,
    DescendPlace,
    /// Payload model cleared before releasing
    SetPayloadZero,
    OpenGripper,
    AscendPlace,
}

impl Stage {
    /// First stage of every cycle after homing
    pub fn loop_start(mode: Mode) -> Stage {
        match mode {
            Mode::TaskDriven => Stage::FetchTask,
            Mode::FixedCycle => Stage::TransitAbovePick,
        }
    }

    pub fn next(self, mode: Mode) -> Stage {
        match self {
            Stage::Home => match mode {
                Mode::TaskDriven => Stage::FetchTask,
                Mode::FixedCycle => Stage::ConfigureGripper,
            },
            Stage::FetchTask => Stage::ConfigureGripper,
            Stage::ConfigureGripper => Stage::TransitAbovePick,
            Stage::TransitAbovePick => Stage::DescendPick,
            Stage::DescendPick => Stage::SetPayloadItem,
            Stage::SetPayloadItem => Stage::TriggerSolenoid,
            Stage::TriggerSolenoid => Stage::CloseGripper,
            Stage::CloseGripper => Stage::AscendPick,
            Stage::AscendPick => Stage::TransitAbovePlace,
            Stage::TransitAbovePlace => Stage::DescendPlace,
            Stage::DescendPlace => Stage::SetPayloadZero,
            Stage::SetPayloadZero => Stage::OpenGripper,
            Stage::OpenGripper => Stage::AscendPlace,
            Stage::AscendPlace => Stage::loop_start(mode),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Home => "HOME",
            Stage::FetchTask => "FETCH_TASK",
            Stage::ConfigureGripper => "CONFIGURE_GRIPPER",
            Stage::TransitAbovePick => "TRANSIT_ABOVE_PICK",
            Stage::DescendPick => "DESCEND_PICK",
            Stage::SetPayloadItem => "SET_PAYLOAD_ITEM",
            Stage::TriggerSolenoid => "TRIGGER_SOLENOID",
            Stage::CloseGripper => "CLOSE_GRIPPER",
            Stage::AscendPick => "ASCEND_PICK",
            Stage::TransitAbovePlace => "TRANSIT_ABOVE_PLACE",
            Stage::DescendPlace => "DESCEND_PLACE",
            Stage::SetPayloadZero => "SET_PAYLOAD_ZERO",
            Stage::OpenGripper => "OPEN_GRIPPER",
            Stage::AscendPlace => "ASCEND_PLACE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Drives the peripherals through the cycle, one stage at a time
pub struct Orchestrator {
    mode: Mode,
    timing: TimingConfig,
    home_pose: Pose,
    open_gripper_on_home: bool,
    motion: Box<dyn MotionChannel>,
    gripper: GripperActuator,
    solenoid: Box<dyn SolenoidTrigger>,
    monitor: Option<Box<dyn MotionMonitor>>,
    task_source: Option<Box<dyn TaskSource>>,
    telemetry: Box<dyn CycleTelemetry>,
    stage: Stage,
    task: Option<Task>,
    cycles: u64,
    cycle_started: Option<Instant>,
    last_payload: Option<f64>,
}

impl Orchestrator {
    pub fn new(config: &Config, peripherals: Peripherals) -> Result<Self> {
        let Peripherals {
            motion,
            mut gripper,
            solenoid,
            monitor,
            task_source,
        } = peripherals;

        let (task, monitor, task_source) = match config.mode {
            Mode::TaskDriven => {
                if task_source.is_none() {
                    return Err(PnpError::Config(
                        "task_driven mode requires a task source".to_string(),
                    ));
                }
                (None, monitor, task_source)
            }
            Mode::FixedCycle => {
                if monitor.is_some() {
                    warn!("Motion monitor ignored in fixed_cycle mode");
                }
                if task_source.is_some() {
                    warn!("Task source ignored in fixed_cycle mode");
                }
                let task = config.fixed_task();
                validate_gripper_spec(&task.gripper)?;
                gripper.configure(task.gripper);
                (Some(task), None, None)
            }
        };

        Ok(Self {
            mode: config.mode,
            timing: config.timing.clone(),
            home_pose: config.robot.home_pose,
            open_gripper_on_home: config.robot.open_gripper_on_home,
            motion,
            gripper,
            solenoid,
            monitor,
            task_source,
            telemetry: Box::new(NoOpTelemetry),
            stage: Stage::Home,
            task,
            cycles: 0,
            cycle_started: None,
            last_payload: None,
        })
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn CycleTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Stage the next `step` will execute
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Last mass written to the controller's payload model
    pub fn last_payload(&self) -> Option<f64> {
        self.last_payload
    }

    /// Execute the current stage and advance to the next one.
    ///
    /// On failure the stage is not advanced and the error is returned as-is;
    /// there is no recovery path.
    pub async fn step(&mut self) -> Result<Stage> {
        let stage = self.stage;
        let started = Instant::now();

        if stage == Stage::loop_start(self.mode) {
            self.cycle_started = Some(started);
        }

        if let Err(e) = self.execute(stage).await {
            error!("Cycle {} aborted at {}: {}", self.cycles + 1, stage, e);
            return Err(e);
        }

        let event = StageEvent::new(self.cycles, stage, started.elapsed().as_millis() as u64);
        if let Err(e) = self.telemetry.publish_stage(&event).await {
            warn!("Failed to publish stage event: {}", e);
        }

        if stage == Stage::AscendPlace {
            self.finish_cycle().await;
        }

        self.stage = stage.next(self.mode);
        Ok(self.stage)
    }

    /// Run stages until one more cycle completes (homing first if needed)
    pub async fn run_cycle(&mut self) -> Result<()> {
        let target = self.cycles + 1;
        while self.cycles < target {
            self.step().await?;
        }
        Ok(())
    }

    /// Loop cycles forever, or until `max_cycles` have completed
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<()> {
        info!("Starting {} pick-and-place loop", self.mode);

        loop {
            if let Some(max) = max_cycles {
                if self.cycles >= max {
                    info!("Completed {} cycle(s)", self.cycles);
                    return Ok(());
                }
            }
            self.run_cycle().await?;
        }
    }

    async fn execute(&mut self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Home => self.home().await,
            Stage::FetchTask => {
                let source = self
                    .task_source
                    .as_mut()
                    .ok_or_else(|| PnpError::Config("No task source attached".to_string()))?;
                let task = source.next_task().await?;
                validate_gripper_spec(&task.gripper)
                    .map_err(|e| PnpError::Protocol(format!("Rejected task: {}", e)))?;
                self.task = Some(task);
                Ok(())
            }
            Stage::ConfigureGripper => {
                let task = self.task()?;
                self.gripper.configure(task.gripper);
                Ok(())
            }
            Stage::TransitAbovePick => {
                let task = self.task()?;
                let delay = self.timing.transit_pick_delay;
                self.transit(task.pick, delay).await
            }
            Stage::DescendPick => self.move_vertical(self.task()?.pick, Direction::Down).await,
            Stage::SetPayloadItem => self.set_payload(self.task()?.gripper.payload).await,
            Stage::TriggerSolenoid => {
                self.solenoid.pulse().await?;
                tokio::time::sleep(secs(self.timing.solenoid_margin)).await;
                Ok(())
            }
            Stage::CloseGripper => self.gripper.close().await,
            Stage::AscendPick => self.move_vertical(self.task()?.pick, Direction::Up).await,
            Stage::TransitAbovePlace => {
                let task = self.task()?;
                let delay = self.timing.transit_place_delay;
                self.transit(task.place, delay).await
            }
            Stage::DescendPlace => self.move_vertical(self.task()?.place, Direction::Down).await,
            Stage::SetPayloadZero => self.set_payload(0.0).await,
            Stage::OpenGripper => self.gripper.open().await,
            Stage::AscendPlace => self.move_vertical(self.task()?.place, Direction::Up).await,
        }
    }

    fn task(&self) -> Result<Task> {
        self.task
            .ok_or_else(|| PnpError::Config("No task loaded for this cycle".to_string()))
    }

    async fn home(&mut self) -> Result<()> {
        info!("Moving to home position");
        let home = self.home_pose;
        self.motion
            .send_move(&MoveCommand::joint(home, self.timing.home_move))
            .await?;

        if self.open_gripper_on_home && self.gripper.spec().is_some() {
            self.gripper.open().await?;
        }

        let settle = self.timing.home_settle;
        self.synchronize(home, settle).await
    }

    /// Joint move to the clearance pose above a waypoint
    async fn transit(&mut self, waypoint: Waypoint, delay: f64) -> Result<()> {
        let target = waypoint.above();
        self.motion
            .send_move(&MoveCommand::joint(target, self.timing.transit_move))
            .await?;
        self.synchronize(target, delay).await
    }

    /// Linear move between a waypoint and the clearance pose above it
    async fn move_vertical(&mut self, waypoint: Waypoint, direction: Direction) -> Result<()> {
        let target = waypoint.vertical(direction);
        self.motion
            .send_move(&MoveCommand::linear(target, self.timing.vertical_move))
            .await?;
        let delay = self.timing.vertical_delay;
        self.synchronize(target, delay).await
    }

    async fn set_payload(&mut self, mass: f64) -> Result<()> {
        self.motion.send_payload(mass).await?;
        self.last_payload = Some(mass);
        Ok(())
    }

    /// Wait at least `delay` seconds, and for the monitor's arrival signal if attached
    async fn synchronize(&mut self, target: Pose, delay: f64) -> Result<()> {
        let floor = tokio::time::sleep(secs(delay));

        match self.monitor.as_mut() {
            Some(monitor) => {
                let (_, arrived) = tokio::join!(floor, monitor.await_arrival(target.position()));
                arrived
            }
            None => {
                floor.await;
                Ok(())
            }
        }
    }

    async fn finish_cycle(&mut self) {
        self.cycles += 1;

        let duration_ms = self
            .cycle_started
            .take()
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or_default();
        let payload = self.task.map(|t| t.gripper.payload).unwrap_or_default();
        info!("Cycle {} complete in {}ms", self.cycles, duration_ms);

        let summary = CycleSummary::new(self.cycles, duration_ms, payload);
        if let Err(e) = self.telemetry.publish_cycle(&summary).await {
            warn!("Failed to publish cycle summary: {}", e);
        }

        // A task lives for exactly one cycle
        if self.mode == Mode::TaskDriven {
            self.task = None;
        }
    }
}
