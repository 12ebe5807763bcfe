//! Motion-completion monitor rendezvous
//!
//! The monitor watches the arm independently and answers once the arm's
//! observed position matches the requested one. Only the arrival of a reply
//! matters; its content is ignored.

use crate::{
    config::{ConnectionConfig, MonitorConfig},
    connection::connect_stream,
    error::{PnpError, Result},
};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

#[async_trait]
pub trait MotionMonitor: Send {
    /// Block until the arm is reported at `position` ([x, y, z] in meters)
    async fn await_arrival(&mut self, position: [f64; 3]) -> Result<()>;
}

pub struct TcpMotionMonitor {
    stream: TcpStream,
    address: String,
}

impl TcpMotionMonitor {
    pub async fn connect(config: &MonitorConfig, connection: &ConnectionConfig) -> Result<Self> {
        info!("Connecting to motion monitor");
        let stream = connect_stream(&config.address, connection).await?;
        info!("Connected to motion monitor at {}", config.address);

        Ok(Self {
            stream,
            address: config.address.clone(),
        })
    }
}

#[async_trait]
impl MotionMonitor for TcpMotionMonitor {
    async fn await_arrival(&mut self, position: [f64; 3]) -> Result<()> {
        debug!("Waiting for move completion at {:?}", position);

        let request = serde_json::to_string(&position)?;
        self.stream.write_all(request.as_bytes()).await.map_err(|e| {
            PnpError::Connection(format!("Failed to send {} to monitor {}: {}", request, self.address, e))
        })?;

        let mut reply = [0u8; 1024];
        let n = self.stream.read(&mut reply).await.map_err(|e| {
            PnpError::Connection(format!("Failed to read from monitor {}: {}", self.address, e))
        })?;
        if n == 0 {
            return Err(PnpError::Connection(format!(
                "Motion monitor {} closed the connection",
                self.address
            )));
        }

        debug!("Move completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_sends_position_and_waits_for_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 1024];
            let n = socket.read(&mut buffer).await.unwrap();
            let position: Vec<f64> = serde_json::from_slice(&buffer[..n]).unwrap();
            socket.write_all(b"done").await.unwrap();
            position
        });

        let mut monitor = TcpMotionMonitor::connect(
            &MonitorConfig { address },
            &ConnectionConfig::default(),
        )
        .await
        .unwrap();
        monitor.await_arrival([0.413, -0.32, 0.1]).await.unwrap();

        assert_eq!(server.await.unwrap(), vec![0.413, -0.32, 0.1]);
    }

    #[tokio::test]
    async fn test_closed_monitor_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 64];
            let _ = socket.read(&mut buffer).await;
        });

        let mut monitor = TcpMotionMonitor::connect(
            &MonitorConfig { address },
            &ConnectionConfig::default(),
        )
        .await
        .unwrap();

        assert!(matches!(
            monitor.await_arrival([0.0, 0.0, 0.0]).await,
            Err(PnpError::Connection(_))
        ));
    }
}
