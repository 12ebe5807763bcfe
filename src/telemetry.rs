//! Telemetry abstraction for the cycle orchestrator
//!
//! Stage and cycle events are published through a trait so the orchestrator
//! can feed any sink (console, message bus, test recorder) without knowing
//! about the transport.

use crate::orchestrator::Stage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Current time as f64 seconds since UNIX epoch, microsecond precision
pub fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Emitted after every executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Completed cycles before this stage ran
    pub cycle: u64,
    pub stage: Stage,
    pub elapsed_ms: u64,
}

impl StageEvent {
    pub fn new(cycle: u64, stage: Stage, elapsed_ms: u64) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "stage".to_string(),
            cycle,
            stage,
            elapsed_ms,
        }
    }
}

/// Emitted once a cycle returns to its loop start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub cycle: u64,
    pub duration_ms: u64,
    pub payload: f64,
}

impl CycleSummary {
    pub fn new(cycle: u64, duration_ms: u64, payload: f64) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "cycle".to_string(),
            cycle,
            duration_ms,
            payload,
        }
    }
}

#[async_trait]
pub trait CycleTelemetry: Send + Sync {
    async fn publish_stage(&self, event: &StageEvent) -> anyhow::Result<()>;

    async fn publish_cycle(&self, summary: &CycleSummary) -> anyhow::Result<()> {
        let _ = summary;
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Clone)]
pub struct NoOpTelemetry;

#[async_trait]
impl CycleTelemetry for NoOpTelemetry {
    async fn publish_stage(&self, _event: &StageEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Prints events to stdout as JSON lines
#[derive(Debug, Clone)]
pub struct ConsoleTelemetry {
    pub pretty_print: bool,
}

impl ConsoleTelemetry {
    pub fn new() -> Self {
        Self { pretty_print: false }
    }

    pub fn pretty() -> Self {
        Self { pretty_print: true }
    }

    fn render<T: Serialize>(&self, data: &T) -> anyhow::Result<String> {
        if self.pretty_print {
            Ok(serde_json::to_string_pretty(data)?)
        } else {
            Ok(serde_json::to_string(data)?)
        }
    }
}

impl Default for ConsoleTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CycleTelemetry for ConsoleTelemetry {
    async fn publish_stage(&self, event: &StageEvent) -> anyhow::Result<()> {
        println!("{}", self.render(event)?);
        Ok(())
    }

    async fn publish_cycle(&self, summary: &CycleSummary) -> anyhow::Result<()> {
        println!("{}", self.render(summary)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_event_json_shape() {
        let event = StageEvent::new(3, Stage::TransitAbovePick, 1002);
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "stage");
        assert_eq!(json["stage"], "TRANSIT_ABOVE_PICK");
        assert_eq!(json["cycle"], 3);
        assert_eq!(json["elapsed_ms"], 1002);
        assert!(json["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_cycle_summary_json_shape() {
        let summary = CycleSummary::new(1, 7450, 0.1);
        let json: serde_json::Value = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["type"], "cycle");
        assert_eq!(json["payload"], 0.1);
    }
}
