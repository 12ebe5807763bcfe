//! Parallel-jaw gripper actuator
//!
//! Widths are set through the gripper's HTTP API. Completion is confirmed
//! either by sleeping a fixed settle time or by polling the width sensor
//! until the jaws are within tolerance of the target.

use crate::{
    config::{secs, GripperConfig},
    error::{PnpError, Result},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Width band accepted as "settled" when polling the sensor
pub const DEFAULT_TOLERANCE_MM: f64 = 2.0;

/// Jaw geometry and item mass for one kind of part
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GripperSpec {
    /// Jaw width in mm when released
    #[serde(rename = "open")]
    pub open_width: f64,
    /// Jaw width in mm when gripping
    #[serde(rename = "close")]
    pub close_width: f64,
    /// Item mass in kg, sent to the controller's payload model while held
    pub payload: f64,
}

/// How a width change is confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SettleStrategy {
    Timed {
        #[serde(default = "default_settle_secs")]
        settle_secs: f64,
    },
    Feedback {
        #[serde(default = "default_tolerance_mm")]
        tolerance_mm: f64,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
        /// Overall bound on polling; the sensor may never report the target
        #[serde(default = "default_feedback_timeout_secs")]
        timeout_secs: f64,
    },
}

fn default_settle_secs() -> f64 {
    0.3
}

fn default_tolerance_mm() -> f64 {
    DEFAULT_TOLERANCE_MM
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_feedback_timeout_secs() -> f64 {
    5.0
}

impl Default for SettleStrategy {
    fn default() -> Self {
        SettleStrategy::Timed {
            settle_secs: default_settle_secs(),
        }
    }
}

/// Raw access to the gripper controller
#[async_trait]
pub trait GripperTransport: Send + Sync {
    /// Request a jaw width, returning the HTTP status code
    async fn request_width(&self, width: f64, force: f64) -> Result<u16>;

    /// Current measured jaw width in mm
    async fn measured_width(&self) -> Result<f64>;
}

/// Gripper transport over the controller's REST endpoints
pub struct HttpGripperTransport {
    client: reqwest::Client,
    base_url: String,
    vendor: String,
    sensor_path: String,
}

impl HttpGripperTransport {
    pub fn new(config: &GripperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PnpError::Config(format!("Failed to build gripper HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("http://{}", config.host),
            vendor: config.vendor.trim_matches('/').to_string(),
            sensor_path: config.sensor_path.trim_start_matches('/').to_string(),
        })
    }

    pub fn width_url(&self, width: f64, force: f64) -> String {
        format!("{}/api/{}/set_width/{}/{}", self.base_url, self.vendor, width, force)
    }

    pub fn sensor_url(&self) -> String {
        format!("{}/{}", self.base_url, self.sensor_path)
    }
}

#[async_trait]
impl GripperTransport for HttpGripperTransport {
    async fn request_width(&self, width: f64, force: f64) -> Result<u16> {
        let url = self.width_url(width, force);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PnpError::Connection(format!("Gripper request {} failed: {}", url, e)))?;

        Ok(response.status().as_u16())
    }

    async fn measured_width(&self) -> Result<f64> {
        let url = self.sensor_url();
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PnpError::Connection(format!("Gripper sensor request {} failed: {}", url, e)))?
            .text()
            .await
            .map_err(|e| PnpError::Protocol(format!("Unreadable gripper sensor reply: {}", e)))?;

        parse_sensor_width(&body)
    }
}

/// Extract the jaw width from a sensor_data reply
pub fn parse_sensor_width(body: &str) -> Result<f64> {
    let data: serde_json::Value = serde_json::from_str(body)?;

    data.pointer("/devices/0/variable/backpack/width")
        .or_else(|| data.get("width"))
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| PnpError::Protocol("Sensor data has no width reading".to_string()))
}

/// Width actuator with completion confirmation
pub struct GripperActuator {
    transport: Box<dyn GripperTransport>,
    force: f64,
    settle: SettleStrategy,
    spec: Option<GripperSpec>,
}

impl GripperActuator {
    pub fn new(transport: Box<dyn GripperTransport>, force: f64, settle: SettleStrategy) -> Self {
        Self {
            transport,
            force,
            settle,
            spec: None,
        }
    }

    /// Store the widths used by subsequent `open`/`close` calls
    pub fn configure(&mut self, spec: GripperSpec) {
        info!(
            "Gripper configured: open {}mm, close {}mm, payload {}kg",
            spec.open_width, spec.close_width, spec.payload
        );
        self.spec = Some(spec);
    }

    pub fn spec(&self) -> Option<&GripperSpec> {
        self.spec.as_ref()
    }

    pub fn settle_strategy(&self) -> &SettleStrategy {
        &self.settle
    }

    pub async fn set_width(&self, width: f64) -> Result<()> {
        info!("Setting gripper to {}mm", width);

        let status = self.transport.request_width(width, self.force).await?;
        if status != 200 {
            return Err(PnpError::GripperFault { width, status });
        }

        debug!("Gripper accepted width {}mm", width);
        self.await_settled(width).await
    }

    pub async fn await_settled(&self, width: f64) -> Result<()> {
        match &self.settle {
            SettleStrategy::Timed { settle_secs } => {
                tokio::time::sleep(secs(*settle_secs)).await;
            }
            SettleStrategy::Feedback {
                tolerance_mm,
                poll_interval_ms,
                timeout_secs,
            } => {
                let mut last_reading = None;
                let poll = async {
                    loop {
                        let measured = self.transport.measured_width().await?;
                        last_reading = Some(measured);
                        if (measured - width).abs() <= *tolerance_mm {
                            return Ok::<f64, PnpError>(measured);
                        }
                        debug!("Gripper at {}mm, waiting for {}mm", measured, width);
                        tokio::time::sleep(Duration::from_millis(*poll_interval_ms)).await;
                    }
                };

                let outcome = tokio::time::timeout(secs(*timeout_secs), poll).await;
                match outcome {
                    Ok(result) => {
                        let measured = result?;
                        debug!("Gripper measured {}mm", measured);
                    }
                    Err(_) => {
                        return Err(PnpError::SettleTimeout {
                            target: width,
                            timeout_secs: *timeout_secs,
                            last: last_reading,
                        })
                    }
                }
            }
        }

        info!("Gripper is set");
        Ok(())
    }

    pub async fn open(&self) -> Result<()> {
        let spec = self.configured_spec()?;
        self.set_width(spec.open_width).await
    }

    pub async fn close(&self) -> Result<()> {
        let spec = self.configured_spec()?;
        self.set_width(spec.close_width).await
    }

    fn configured_spec(&self) -> Result<GripperSpec> {
        self.spec
            .ok_or_else(|| PnpError::Config("Gripper widths not configured".to_string()))
    }
}
