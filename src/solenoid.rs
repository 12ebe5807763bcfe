//! Pneumatic solenoid valve trigger

use crate::{
    config::SolenoidConfig,
    error::{PnpError, Result},
};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::info;

/// One-shot valve pulse. No response is expected.
#[async_trait]
pub trait SolenoidTrigger: Send {
    async fn pulse(&mut self) -> Result<()>;
}

/// Fires the valve controller with a single UDP datagram
pub struct UdpSolenoid {
    socket: UdpSocket,
    target: SocketAddr,
    marker: Vec<u8>,
}

impl UdpSolenoid {
    pub async fn bind(config: &SolenoidConfig) -> Result<Self> {
        let target = tokio::net::lookup_host(config.address.as_str())
            .await
            .map_err(|e| PnpError::Connection(format!("Cannot resolve solenoid {}: {}", config.address, e)))?
            .next()
            .ok_or_else(|| PnpError::Connection(format!("No address for solenoid {}", config.address)))?;

        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        info!("Solenoid trigger ready for {}", target);

        Ok(Self {
            socket,
            target,
            marker: config.marker.as_bytes().to_vec(),
        })
    }
}

#[async_trait]
impl SolenoidTrigger for UdpSolenoid {
    async fn pulse(&mut self) -> Result<()> {
        info!("Pulsing solenoid at {}", self.target);
        self.socket
            .send_to(&self.marker, self.target)
            .await
            .map_err(|e| PnpError::Connection(format!("Failed to pulse solenoid {}: {}", self.target, e)))?;
        Ok(())
    }
}
