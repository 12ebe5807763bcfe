//! Error types for pick-and-place peripherals

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PnpError>;

#[derive(Error, Debug)]
pub enum PnpError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Gripper fault: set_width {width}mm returned HTTP {status}")]
    GripperFault { width: f64, status: u16 },

    #[error("Invalid parameter for direction - {0}")]
    InvalidDirection(String),

    #[error("Gripper did not settle at {target}mm within {timeout_secs}s (last reading: {last:?})")]
    SettleTimeout {
        target: f64,
        timeout_secs: f64,
        last: Option<f64>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
