use crate::config::ProtocolConfig;
use crate::error::{DeviceError, Result};
use crate::serial::SerialChannel;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Command issued back to the capture device after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Healthy,
    Unhealthy,
}

impl DeviceCommand {
    /// Wire form: a single ASCII byte, newline-terminated.
    pub fn token(&self) -> &'static [u8] {
        match self {
            DeviceCommand::Healthy => b"H\n",
            DeviceCommand::Unhealthy => b"D\n",
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Healthy => write!(f, "healthy"),
            DeviceCommand::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Sends one command and observes, without requiring, an acknowledgment.
///
/// After the write the device gets a fixed settle interval to reply, then
/// whatever lines are already waiting are drained and logged. Lack of an
/// acknowledgment is an observability gap, not an error: the command has
/// already been physically transmitted.
pub struct ResponseDispatcher {
    settle: Duration,
    ack_token: String,
}

impl ResponseDispatcher {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            settle: Duration::from_millis(config.settle_ms),
            ack_token: config.ack_token.clone(),
        }
    }

    /// Write the command and drain device replies. Returns whether the
    /// spray acknowledgment was observed (only ever true for `Unhealthy`).
    pub async fn send<C>(&self, channel: &mut C, command: DeviceCommand) -> Result<bool>
    where
        C: SerialChannel,
    {
        info!(%command, "sending signal to device");
        channel
            .write_all(command.token())
            .await
            .map_err(DeviceError::Write)?;

        sleep(self.settle).await;

        let mut acknowledged = false;
        loop {
            match channel.drain_line().await {
                Ok(Some(line)) => {
                    info!(response = %line, "device response");
                    if command == DeviceCommand::Unhealthy && line.contains(&self.ack_token) {
                        info!("spray system activated");
                        acknowledged = true;
                        break;
                    }
                }
                Ok(None) => break,
                // The command is already on the wire; a failed drain only
                // loses visibility into the reply.
                Err(e) => {
                    warn!("failed to drain device replies: {}", e);
                    break;
                }
            }
        }
        Ok(acknowledged)
    }
}
