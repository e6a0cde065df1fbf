use super::BufferedChannel;
use crate::config::SerialConfig;
use crate::error::Result;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

/// Open the configured serial device as a buffered channel.
pub fn open_port(config: &SerialConfig) -> Result<BufferedChannel<SerialStream>> {
    let stream = tokio_serial::new(config.port.as_str(), config.baud).open_native_async()?;
    info!(port = %config.port, baud = config.baud, "serial port opened");
    Ok(BufferedChannel::new(stream))
}
