//! Configuration loading for the pick-and-place cell

use crate::{
    error::{PnpError, Result},
    gripper::{GripperSpec, SettleStrategy},
    motion::Pose,
    task::{Task, Waypoint},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

/// Seconds from config as a `Duration`. Negatives and NaN clamp to zero,
/// values too large to represent saturate.
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PnpError::Config(format!("{} must be positive and finite, got {}", name, value)));
    }
    Ok(())
}

/// Operating mode, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Poses and gripper geometry come from the task source every cycle
    TaskDriven,
    /// Poses and gripper geometry are constants looped indefinitely
    FixedCycle,
}

impl FromStr for Mode {
    type Err = PnpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "task_driven" | "task-driven" => Ok(Mode::TaskDriven),
            "fixed_cycle" | "fixed-cycle" => Ok(Mode::FixedCycle),
            other => Err(PnpError::Config(format!("Unknown mode: {}", other))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::TaskDriven => write!(f, "task_driven"),
            Mode::FixedCycle => write!(f, "fixed_cycle"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub mode: Mode,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub gripper: GripperConfig,
    #[serde(default)]
    pub solenoid: SolenoidConfig,
    #[serde(default)]
    pub task_source: Option<TaskSourceConfig>,
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,
    #[serde(default)]
    pub fixed_cycle: FixedCycleConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    pub host: String,
    #[serde(default = "default_robot_port")]
    pub port: u16,
    #[serde(default = "default_home_pose")]
    pub home_pose: Pose,
    /// Open the gripper while homing when its widths are already known
    #[serde(default = "default_true")]
    pub open_gripper_on_home: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GripperConfig {
    pub host: String,
    #[serde(default = "default_vendor")]
    pub vendor: String,
    #[serde(default = "default_force")]
    pub force: f64,
    #[serde(default = "default_sensor_path")]
    pub sensor_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,
    #[serde(default)]
    pub settle: SettleStrategy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolenoidConfig {
    pub address: String,
    #[serde(default = "default_marker")]
    pub marker: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskSourceConfig {
    pub address: String,
    #[serde(default = "default_request_token")]
    pub request_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    pub address: String,
}

/// Constant task used in fixed-cycle mode
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FixedCycleConfig {
    pub pick: Waypoint,
    pub place: Waypoint,
    pub gripper: GripperSpec,
}

/// Move durations and post-command delays, in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub home_move: f64,
    pub home_settle: f64,
    pub transit_move: f64,
    pub transit_pick_delay: f64,
    pub transit_place_delay: f64,
    pub vertical_move: f64,
    pub vertical_delay: f64,
    /// Pneumatic actuation lead time between solenoid pulse and jaw close
    pub solenoid_margin: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub timeout_secs: f64,
    pub retry_attempts: u32,
    pub retry_delay_secs: f64,
}

fn default_true() -> bool {
    true
}

fn default_robot_port() -> u16 {
    30002
}

fn default_home_pose() -> Pose {
    Pose::new([0.355, -0.3, 0.132, 2.25, -2.25, 0.0])
}

fn default_vendor() -> String {
    "dc/rg2ft".to_string()
}

fn default_force() -> f64 {
    40.0
}

fn default_sensor_path() -> String {
    "sensor_data".to_string()
}

fn default_request_timeout_secs() -> f64 {
    5.0
}

fn default_marker() -> String {
    "MSG PLACEHOLDER".to_string()
}

fn default_request_token() -> String {
    "get".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::FixedCycle,
            robot: RobotConfig::default(),
            gripper: GripperConfig::default(),
            solenoid: SolenoidConfig::default(),
            task_source: None,
            monitor: None,
            fixed_cycle: FixedCycleConfig::default(),
            timing: TimingConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            host: "10.6.6.10".to_string(),
            port: default_robot_port(),
            home_pose: default_home_pose(),
            open_gripper_on_home: true,
        }
    }
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            host: "10.6.6.11".to_string(),
            vendor: default_vendor(),
            force: default_force(),
            sensor_path: default_sensor_path(),
            request_timeout_secs: default_request_timeout_secs(),
            settle: SettleStrategy::default(),
        }
    }
}

impl Default for SolenoidConfig {
    fn default() -> Self {
        Self {
            address: "10.6.6.8:7777".to_string(),
            marker: default_marker(),
        }
    }
}

impl Default for FixedCycleConfig {
    fn default() -> Self {
        Self {
            pick: Waypoint {
                pose: Pose::new([0.413, -0.32, 0.05, 2.25, -2.25, 0.0]),
                lift_height: 0.05,
            },
            place: Waypoint {
                pose: Pose::new([0.413, -0.12, 0.045, 2.25, -2.25, 0.0]),
                lift_height: 0.05,
            },
            gripper: GripperSpec {
                open_width: 52.0,
                close_width: 38.0,
                payload: 0.10,
            },
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            home_move: 2.0,
            home_settle: 3.0,
            transit_move: 1.0,
            transit_pick_delay: 1.0,
            transit_place_delay: 1.05,
            vertical_move: 0.5,
            vertical_delay: 0.6,
            solenoid_margin: 0.2,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5.0,
            retry_attempts: 1,
            retry_delay_secs: 1.0,
        }
    }
}

impl Config {
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| PnpError::Config(format!("Failed to read {}: {}", config_path, e)))?;

        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the orchestrator cannot run safely
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::TaskDriven && self.task_source.is_none() {
            return Err(PnpError::Config(
                "task_driven mode requires a task_source section".to_string(),
            ));
        }

        if !self.robot.home_pose.is_finite() {
            return Err(PnpError::Config("robot.home_pose must be finite".to_string()));
        }

        let fixed = &self.fixed_cycle;
        for (name, waypoint) in [("pick", &fixed.pick), ("place", &fixed.place)] {
            if !waypoint.pose.is_finite() || !waypoint.lift_height.is_finite() {
                return Err(PnpError::Config(format!("fixed_cycle.{} must be finite", name)));
            }
        }
        validate_gripper_spec(&fixed.gripper)?;

        require_positive("gripper.force", self.gripper.force)?;
        require_positive("gripper.request_timeout_secs", self.gripper.request_timeout_secs)?;
        match &self.gripper.settle {
            SettleStrategy::Timed { settle_secs } => {
                if !settle_secs.is_finite() || *settle_secs < 0.0 {
                    return Err(PnpError::Config(
                        "gripper.settle.settle_secs must be non-negative".to_string(),
                    ));
                }
            }
            SettleStrategy::Feedback {
                tolerance_mm,
                poll_interval_ms,
                timeout_secs,
            } => {
                require_positive("gripper.settle.tolerance_mm", *tolerance_mm)?;
                if *poll_interval_ms == 0 {
                    return Err(PnpError::Config("gripper.settle.poll_interval_ms must be positive".to_string()));
                }
                require_positive("gripper.settle.timeout_secs", *timeout_secs)?;
            }
        }

        require_positive("connection.timeout_secs", self.connection.timeout_secs)?;
        let retry_delay = self.connection.retry_delay_secs;
        if !retry_delay.is_finite() || retry_delay < 0.0 {
            return Err(PnpError::Config(
                "connection.retry_delay_secs must be non-negative".to_string(),
            ));
        }

        let timing = &self.timing;
        let timings = [
            ("home_move", timing.home_move),
            ("home_settle", timing.home_settle),
            ("transit_move", timing.transit_move),
            ("transit_pick_delay", timing.transit_pick_delay),
            ("transit_place_delay", timing.transit_place_delay),
            ("vertical_move", timing.vertical_move),
            ("vertical_delay", timing.vertical_delay),
            ("solenoid_margin", timing.solenoid_margin),
        ];
        for (name, value) in timings {
            if !value.is_finite() || value < 0.0 {
                return Err(PnpError::Config(format!("timing.{} must be non-negative", name)));
            }
        }

        Ok(())
    }

    /// The constant task looped in fixed-cycle mode
    pub fn fixed_task(&self) -> Task {
        Task {
            gripper: self.fixed_cycle.gripper,
            pick: self.fixed_cycle.pick,
            place: self.fixed_cycle.place,
        }
    }

    pub fn robot_address(&self) -> String {
        format!("{}:{}", self.robot.host, self.robot.port)
    }
}

/// Widths and payload must describe a grip that can physically happen
pub fn validate_gripper_spec(spec: &GripperSpec) -> Result<()> {
    let finite = spec.open_width.is_finite() && spec.close_width.is_finite();
    if !finite || spec.open_width <= 0.0 || spec.close_width <= 0.0 {
        return Err(PnpError::Config(format!(
            "Gripper widths must be positive (open {}mm, close {}mm)",
            spec.open_width, spec.close_width
        )));
    }
    if !spec.payload.is_finite() || spec.payload < 0.0 {
        return Err(PnpError::Config(format!("Payload must be non-negative, got {}kg", spec.payload)));
    }
    Ok(())
}

impl GripperConfig {
    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cell_constants() {
        let config = Config::default();

        assert_eq!(config.mode, Mode::FixedCycle);
        assert_eq!(config.robot_address(), "10.6.6.10:30002");
        assert_eq!(config.robot.home_pose.values(), [0.355, -0.3, 0.132, 2.25, -2.25, 0.0]);
        assert_eq!(config.gripper.vendor, "dc/rg2ft");
        assert_eq!(config.gripper.force, 40.0);
        assert_eq!(config.gripper.settle, SettleStrategy::Timed { settle_secs: 0.3 });
        assert_eq!(config.solenoid.address, "10.6.6.8:7777");
        assert_eq!(config.fixed_cycle.gripper.close_width, 38.0);
        assert_eq!(config.fixed_cycle.gripper.open_width, 52.0);
        assert_eq!(config.timing.solenoid_margin, 0.2);
        assert_eq!(config.connection.retry_attempts, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_task_driven_yaml() {
        let yaml = r#"
mode: task_driven
robot:
  host: 127.0.0.1
  port: 30002
gripper:
  host: 127.0.0.1:8080
  settle:
    strategy: feedback
    tolerance_mm: 1.5
task_source:
  address: 127.0.0.1:4321
monitor:
  address: 127.0.0.1:5432
timing:
  solenoid_margin: 0.3
"#;
        let config = Config::load_from_str(yaml).unwrap();

        assert_eq!(config.mode, Mode::TaskDriven);
        assert_eq!(config.task_source.as_ref().unwrap().request_token, "get");
        assert_eq!(config.monitor.as_ref().unwrap().address, "127.0.0.1:5432");
        assert_eq!(config.robot.home_pose.values(), [0.355, -0.3, 0.132, 2.25, -2.25, 0.0]);
        assert_eq!(
            config.gripper.settle,
            SettleStrategy::Feedback {
                tolerance_mm: 1.5,
                poll_interval_ms: 50,
                timeout_secs: 5.0,
            }
        );
        assert_eq!(config.timing.solenoid_margin, 0.3);
        assert_eq!(config.timing.vertical_delay, 0.6);
    }

    #[test]
    fn test_task_driven_requires_task_source() {
        let result = Config::load_from_str("mode: task_driven\n");
        assert!(matches!(result, Err(PnpError::Config(_))));
    }

    #[test]
    fn test_rejects_negative_timing() {
        let mut config = Config::default();
        config.timing.vertical_delay = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_width_fixed_gripper() {
        let mut config = Config::default();
        config.fixed_cycle.gripper.close_width = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_configs_load() {
        let fixed = Config::load_from_str(include_str!("../config/default_config.yaml")).unwrap();
        assert_eq!(fixed.mode, Mode::FixedCycle);
        assert_eq!(fixed.fixed_task().pick.pose.z(), 0.05);

        let driven = Config::load_from_str(include_str!("../config/task_driven.yaml")).unwrap();
        assert_eq!(driven.mode, Mode::TaskDriven);
        assert_eq!(driven.connection.retry_attempts, 3);
        assert!(matches!(driven.gripper.settle, SettleStrategy::Feedback { .. }));
    }

    #[test]
    fn test_rejects_non_finite_durations() {
        let infinite_settle = "
mode: fixed_cycle
gripper:
  host: 127.0.0.1:8080
  settle:
    strategy: feedback
    timeout_secs: .inf
";
        assert!(matches!(Config::load_from_str(infinite_settle), Err(PnpError::Config(_))));

        let infinite_connect = "
mode: fixed_cycle
connection:
  timeout_secs: .inf
";
        assert!(matches!(Config::load_from_str(infinite_connect), Err(PnpError::Config(_))));

        let mut config = Config::default();
        config.gripper.request_timeout_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.retry_delay_secs = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nan_gripper_width() {
        let spec = GripperSpec {
            open_width: f64::NAN,
            close_width: 38.0,
            payload: 0.1,
        };
        assert!(validate_gripper_spec(&spec).is_err());

        let mut config = Config::default();
        config.fixed_cycle.gripper.close_width = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secs_never_panics() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(f64::INFINITY), Duration::MAX);
        assert_eq!(secs(0.25), Duration::from_millis(250));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("task-driven".parse::<Mode>().unwrap(), Mode::TaskDriven);
        assert_eq!("fixed_cycle".parse::<Mode>().unwrap(), Mode::FixedCycle);
        assert!("random".parse::<Mode>().is_err());
    }
}
