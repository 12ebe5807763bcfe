//! Motion controller command channel
//!
//! Encodes move and payload directives as newline-terminated URScript and
//! writes them to the controller's primary socket. The controller never
//! acknowledges; a failed write is the only error signal.

use crate::{
    config::ConnectionConfig,
    connection::connect_stream,
    error::{PnpError, Result},
};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

const MOVE_PATTERN: &str =
    r"^\s*(movej|movel)\(get_inverse_kin\(p\[([^\]]*)\]\),\s*t=([^)\s]+)\)\s*$";

/// TCP pose [x, y, z, rx, ry, rz] in meters and rotation-vector radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose([f64; 6]);

impl Pose {
    pub const fn new(values: [f64; 6]) -> Self {
        Self(values)
    }

    pub fn values(&self) -> [f64; 6] {
        self.0
    }

    pub fn position(&self) -> [f64; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    pub fn z(&self) -> f64 {
        self.0[2]
    }

    /// Copy of this pose raised by `lift` along z. The receiver is untouched.
    pub fn above(&self, lift: f64) -> Pose {
        let mut values = self.0;
        values[2] += lift;
        Pose(values)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl From<[f64; 6]> for Pose {
    fn from(values: [f64; 6]) -> Self {
        Self(values)
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

/// Direction of the shared vertical-move primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = PnpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(PnpError::InvalidDirection(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Interpolation space of a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Joint-space interpolation, used for large transits
    Joint,
    /// Cartesian interpolation, used near the gripper where straightness matters
    Linear,
}

impl MoveKind {
    pub fn script_name(self) -> &'static str {
        match self {
            MoveKind::Joint => "movej",
            MoveKind::Linear => "movel",
        }
    }
}

impl FromStr for MoveKind {
    type Err = PnpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "movej" | "joint" => Ok(MoveKind::Joint),
            "movel" | "linear" => Ok(MoveKind::Linear),
            other => Err(PnpError::Protocol(format!("Unknown move kind: {}", other))),
        }
    }
}

/// A single move directive. Built, sent, discarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    pub kind: MoveKind,
    pub target: Pose,
    /// Seconds the controller should take for the move
    pub duration: f64,
}

impl MoveCommand {
    pub fn joint(target: Pose, duration: f64) -> Self {
        Self { kind: MoveKind::Joint, target, duration }
    }

    pub fn linear(target: Pose, duration: f64) -> Self {
        Self { kind: MoveKind::Linear, target, duration }
    }

    /// Render as `movej(get_inverse_kin(p[...]),t=1)\n`
    pub fn to_script(&self) -> String {
        format!(
            "{}(get_inverse_kin(p{}),t={})\n",
            self.kind.script_name(),
            self.target,
            self.duration
        )
    }

    /// Parse a directive produced by [`MoveCommand::to_script`]
    pub fn parse(script: &str) -> Result<Self> {
        let pattern = Regex::new(MOVE_PATTERN)
            .map_err(|e| PnpError::Protocol(format!("Invalid move pattern: {}", e)))?;

        let captures = pattern
            .captures(script)
            .ok_or_else(|| PnpError::Protocol(format!("Not a move directive: {}", script.trim())))?;

        let kind: MoveKind = captures[1].parse()?;

        let values = captures[2]
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PnpError::Protocol(format!("Invalid pose literal '{}': {}", &captures[2], e)))?;
        let values: [f64; 6] = values.try_into().map_err(|v: Vec<f64>| {
            PnpError::Protocol(format!("Pose literal has {} values, expected 6", v.len()))
        })?;

        let duration: f64 = captures[3]
            .parse()
            .map_err(|e| PnpError::Protocol(format!("Invalid duration '{}': {}", &captures[3], e)))?;
        let command = Self { kind, target: Pose(values), duration };
        command.validate()?;
        Ok(command)
    }

    /// Reject directives the controller must never see
    pub fn validate(&self) -> Result<()> {
        if !self.target.is_finite() {
            return Err(PnpError::Protocol(format!("Pose contains non-finite values: {}", self.target)));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(PnpError::Protocol(format!(
                "Duration must be non-negative, got {}",
                self.duration
            )));
        }
        Ok(())
    }
}

impl fmt::Display for MoveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_script().trim_end())
    }
}

/// Render a payload-set directive
pub fn payload_script(mass: f64) -> String {
    format!("set_payload({})\n", mass)
}

/// Fire-and-forget command sink for the motion controller
#[async_trait]
pub trait MotionChannel: Send {
    async fn send_move(&mut self, command: &MoveCommand) -> Result<()>;

    async fn send_payload(&mut self, mass: f64) -> Result<()>;
}

/// Motion channel over the controller's URScript socket
pub struct UrScriptChannel {
    stream: TcpStream,
    address: String,
}

impl UrScriptChannel {
    pub async fn connect(address: &str, connection: &ConnectionConfig) -> Result<Self> {
        info!("Connecting to motion controller");
        let stream = connect_stream(address, connection).await?;
        info!("Connected to motion controller at {}", address);

        Ok(Self {
            stream,
            address: address.to_string(),
        })
    }

    async fn send_script(&mut self, script: &str) -> Result<()> {
        info!("Sending command - {}", script.trim());

        self.stream.write_all(script.as_bytes()).await.map_err(|e| {
            PnpError::Connection(format!(
                "Failed to send '{}' to {}: {}",
                script.trim(),
                self.address,
                e
            ))
        })
    }
}

#[async_trait]
impl MotionChannel for UrScriptChannel {
    async fn send_move(&mut self, command: &MoveCommand) -> Result<()> {
        self.send_script(&command.to_script()).await
    }

    async fn send_payload(&mut self, mass: f64) -> Result<()> {
        self.send_script(&payload_script(mass)).await
    }
}
