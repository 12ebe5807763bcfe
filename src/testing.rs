//! Recording mock peripherals for unit tests

use crate::{
    error::{PnpError, Result},
    gripper::GripperTransport,
    monitor::MotionMonitor,
    motion::{MotionChannel, MoveCommand},
    orchestrator::Stage,
    solenoid::SolenoidTrigger,
    task::{Task, TaskSource},
    telemetry::{CycleSummary, CycleTelemetry, StageEvent},
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchTask,
    Move(MoveCommand),
    Payload(f64),
    Pulse,
    SetWidth(f64),
    MeasureWidth,
    AwaitArrival([f64; 3]),
}

/// Shared, timestamped log of every peripheral call
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<(Instant, Call)>>>);

impl Recorder {
    pub fn record(&self, call: Call) {
        self.0.lock().unwrap().push((Instant::now(), call));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed(&self) -> Vec<(Instant, Call)> {
        self.0.lock().unwrap().clone()
    }

    pub fn moves(&self) -> Vec<MoveCommand> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Move(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn index_of(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }
}

pub struct MockMotion {
    recorder: Recorder,
    /// 1-based index of the move whose write fails
    fail_on_move: Option<usize>,
    moves_sent: usize,
}

impl MockMotion {
    pub fn new(recorder: Recorder, fail_on_move: Option<usize>) -> Self {
        Self {
            recorder,
            fail_on_move,
            moves_sent: 0,
        }
    }
}

#[async_trait]
impl MotionChannel for MockMotion {
    async fn send_move(&mut self, command: &MoveCommand) -> Result<()> {
        self.moves_sent += 1;
        if self.fail_on_move == Some(self.moves_sent) {
            return Err(PnpError::Connection(format!(
                "Failed to send '{}' to mock: Broken pipe",
                command
            )));
        }
        self.recorder.record(Call::Move(*command));
        Ok(())
    }

    async fn send_payload(&mut self, mass: f64) -> Result<()> {
        self.recorder.record(Call::Payload(mass));
        Ok(())
    }
}

pub struct MockGripperTransport {
    recorder: Recorder,
    status: u16,
    readings: Mutex<VecDeque<f64>>,
}

impl MockGripperTransport {
    /// `readings` are returned in order; the last one repeats forever
    pub fn new(recorder: Recorder, status: u16, readings: Vec<f64>) -> Self {
        Self {
            recorder,
            status,
            readings: Mutex::new(readings.into()),
        }
    }
}

#[async_trait]
impl GripperTransport for MockGripperTransport {
    async fn request_width(&self, width: f64, _force: f64) -> Result<u16> {
        self.recorder.record(Call::SetWidth(width));
        Ok(self.status)
    }

    async fn measured_width(&self) -> Result<f64> {
        self.recorder.record(Call::MeasureWidth);
        let mut readings = self.readings.lock().unwrap();
        let reading = if readings.len() > 1 {
            readings.pop_front()
        } else {
            readings.front().copied()
        };
        reading.ok_or_else(|| PnpError::Protocol("No sensor readings".to_string()))
    }
}

pub struct MockSolenoid {
    recorder: Recorder,
}

impl MockSolenoid {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl SolenoidTrigger for MockSolenoid {
    async fn pulse(&mut self) -> Result<()> {
        self.recorder.record(Call::Pulse);
        Ok(())
    }
}

pub struct MockMonitor {
    recorder: Recorder,
}

impl MockMonitor {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl MotionMonitor for MockMonitor {
    async fn await_arrival(&mut self, position: [f64; 3]) -> Result<()> {
        self.recorder.record(Call::AwaitArrival(position));
        Ok(())
    }
}

pub struct MockTaskSource {
    recorder: Recorder,
    tasks: VecDeque<Task>,
}

impl MockTaskSource {
    pub fn new(recorder: Recorder, tasks: Vec<Task>) -> Self {
        Self {
            recorder,
            tasks: tasks.into(),
        }
    }
}

#[async_trait]
impl TaskSource for MockTaskSource {
    async fn next_task(&mut self) -> Result<Task> {
        self.recorder.record(Call::FetchTask);
        self.tasks
            .pop_front()
            .ok_or_else(|| PnpError::Connection("Task source closed the connection".to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    pub stages: Arc<Mutex<Vec<Stage>>>,
    pub cycles: Arc<Mutex<Vec<CycleSummary>>>,
}

#[async_trait]
impl CycleTelemetry for RecordingTelemetry {
    async fn publish_stage(&self, event: &StageEvent) -> anyhow::Result<()> {
        self.stages.lock().unwrap().push(event.stage);
        Ok(())
    }

    async fn publish_cycle(&self, summary: &CycleSummary) -> anyhow::Result<()> {
        self.cycles.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

/// Sink that rejects every event
#[derive(Debug, Clone, Default)]
pub struct FailingTelemetry;

#[async_trait]
impl CycleTelemetry for FailingTelemetry {
    async fn publish_stage(&self, _event: &StageEvent) -> anyhow::Result<()> {
        anyhow::bail!("telemetry sink unavailable")
    }

    async fn publish_cycle(&self, _summary: &CycleSummary) -> anyhow::Result<()> {
        anyhow::bail!("telemetry sink unavailable")
    }
}
