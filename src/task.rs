//! Pick-and-place tasks and the external source that supplies them

use crate::{
    config::{ConnectionConfig, TaskSourceConfig},
    connection::connect_stream,
    error::{PnpError, Result},
    gripper::GripperSpec,
    motion::{Direction, Pose},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

/// Largest task record accepted from the source
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

/// A grip or release location plus the clearance used to transit above it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub pose: Pose,
    #[serde(alias = "liftHeight")]
    pub lift_height: f64,
}

impl Waypoint {
    /// Transit pose: `pose` raised by `lift_height`
    pub fn above(&self) -> Pose {
        self.pose.above(self.lift_height)
    }

    /// Target of the vertical-move primitive
    pub fn vertical(&self, direction: Direction) -> Pose {
        match direction {
            Direction::Up => self.above(),
            Direction::Down => self.pose,
        }
    }
}

/// One cycle's worth of work
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub gripper: GripperSpec,
    #[serde(rename = "from")]
    pub pick: Waypoint,
    #[serde(rename = "to")]
    pub place: Waypoint,
}

/// Supplies one task per cycle in task-driven mode
#[async_trait]
pub trait TaskSource: Send {
    async fn next_task(&mut self) -> Result<Task>;
}

/// Task source reached over a request/response TCP stream
pub struct TcpTaskSource {
    stream: TcpStream,
    address: String,
    request_token: String,
}

impl TcpTaskSource {
    pub async fn connect(config: &TaskSourceConfig, connection: &ConnectionConfig) -> Result<Self> {
        info!("Connecting to task source");
        let stream = connect_stream(&config.address, connection).await?;
        info!("Connected to task source at {}", config.address);

        Ok(Self {
            stream,
            address: config.address.clone(),
            request_token: config.request_token.clone(),
        })
    }

    /// Read until the buffered bytes form one complete JSON record
    async fn read_record(&mut self) -> Result<Task> {
        let mut buffer = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];

        loop {
            let n = self.stream.read(&mut chunk).await.map_err(|e| {
                PnpError::Connection(format!("Failed to read task from {}: {}", self.address, e))
            })?;
            if n == 0 {
                return Err(PnpError::Connection(format!(
                    "Task source {} closed the connection",
                    self.address
                )));
            }
            buffer.extend_from_slice(&chunk[..n]);
            if buffer.len() > MAX_RECORD_BYTES {
                return Err(PnpError::Protocol(format!(
                    "Task record from {} exceeds {} bytes without completing",
                    self.address, MAX_RECORD_BYTES
                )));
            }

            match serde_json::from_slice::<Task>(&buffer) {
                Ok(task) => return Ok(task),
                Err(e) if e.is_eof() => continue,
                Err(e) => {
                    return Err(PnpError::Protocol(format!(
                        "Invalid task record '{}': {}",
                        String::from_utf8_lossy(&buffer).trim(),
                        e
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl TaskSource for TcpTaskSource {
    async fn next_task(&mut self) -> Result<Task> {
        info!("Querying task");
        self.stream
            .write_all(self.request_token.as_bytes())
            .await
            .map_err(|e| {
                PnpError::Connection(format!("Failed to request task from {}: {}", self.address, e))
            })?;

        let task = self.read_record().await?;
        info!(
            "Received task: pick {} (+{}), place {} (+{})",
            task.pick.pose, task.pick.lift_height, task.place.pose, task.place.lift_height
        );
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const RECORD: &str = r#"{
        "gripper": {"open": 60, "close": 42, "payload": 0.25},
        "from": {"pose": [0.4, -0.3, 0.1, 2.25, -2.25, 0], "lift_height": 0.05},
        "to": {"pose": [0.4, -0.1, 0.045, 2.25, -2.25, 0], "liftHeight": 0.08}
    }"#;

    #[test]
    fn test_task_record_deserializes() {
        let task: Task = serde_json::from_str(RECORD).unwrap();

        assert_eq!(task.gripper.open_width, 60.0);
        assert_eq!(task.gripper.close_width, 42.0);
        assert_eq!(task.gripper.payload, 0.25);
        assert_eq!(task.pick.pose.z(), 0.1);
        assert_eq!(task.place.lift_height, 0.08);
    }

    #[test]
    fn test_vertical_targets() {
        let task: Task = serde_json::from_str(RECORD).unwrap();

        assert!((task.pick.vertical(Direction::Up).z() - 0.15).abs() < 1e-12);
        assert_eq!(task.pick.vertical(Direction::Down), task.pick.pose);
        assert_eq!(task.pick.above(), task.pick.vertical(Direction::Up));
        assert_eq!(task.pick.pose.z(), 0.1);
    }

    #[tokio::test]
    async fn test_tcp_source_requests_and_reassembles_record() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 3];
            socket.read_exact(&mut request).await.unwrap();

            // Split the record to force reassembly on the client side
            let (head, tail) = RECORD.split_at(40);
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            socket.write_all(tail.as_bytes()).await.unwrap();

            String::from_utf8(request.to_vec()).unwrap()
        });

        let config = TaskSourceConfig {
            address,
            request_token: "get".to_string(),
        };
        let mut source = TcpTaskSource::connect(&config, &ConnectionConfig::default())
            .await
            .unwrap();
        let task = source.next_task().await.unwrap();

        assert_eq!(server.await.unwrap(), "get");
        assert_eq!(task.gripper.close_width, 42.0);
        assert_eq!(task.place.pose.z(), 0.045);
    }

    #[tokio::test]
    async fn test_tcp_source_rejects_oversized_record() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 3];
            socket.read_exact(&mut request).await.unwrap();

            // A string that never closes keeps the record incomplete
            let _ = socket.write_all(b"{\"gripper\": {\"open\": \"").await;
            let filler = vec![b'a'; 1024];
            for _ in 0..(MAX_RECORD_BYTES / 1024 + 2) {
                if socket.write_all(&filler).await.is_err() {
                    break;
                }
            }
            // Hold the connection open until the client gives up
            let mut rest = [0u8; 16];
            let _ = socket.read(&mut rest).await;
        });

        let config = TaskSourceConfig {
            address,
            request_token: "get".to_string(),
        };
        let mut source = TcpTaskSource::connect(&config, &ConnectionConfig::default())
            .await
            .unwrap();

        assert!(matches!(
            source.next_task().await,
            Err(PnpError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_tcp_source_closed_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let config = TaskSourceConfig {
            address,
            request_token: "get".to_string(),
        };
        let mut source = TcpTaskSource::connect(&config, &ConnectionConfig::default())
            .await
            .unwrap();

        assert!(matches!(source.next_task().await, Err(PnpError::Connection(_))));
    }
}
