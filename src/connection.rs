//! Startup connection helper shared by the stream-socket peripherals

use crate::{
    config::ConnectionConfig,
    error::{PnpError, Result},
};
use tokio::net::TcpStream;
use tracing::info;

/// Open a TCP stream, retrying up to `retry_attempts` times.
///
/// Only used while bringing peripherals up. Once a cycle is running a lost
/// connection is fatal and nothing reconnects.
pub async fn connect_stream(address: &str, connection: &ConnectionConfig) -> Result<TcpStream> {
    let max_attempts = connection.retry_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match tokio::time::timeout(connection.timeout(), TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {:.1}s", connection.timeout_secs),
        }

        if attempt < max_attempts {
            info!("Waiting for {} (attempt {}/{})", address, attempt, max_attempts);
            tokio::time::sleep(connection.retry_delay()).await;
        }
    }

    Err(PnpError::Connection(format!(
        "Failed to connect to {} after {} attempt(s): {}",
        address, max_attempts, last_error
    )))
}
