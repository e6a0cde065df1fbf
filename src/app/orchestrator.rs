use crate::capture::FrameStore;
use crate::classifier::ClassificationClient;
use crate::config::PlantguardConfig;
use crate::error::Result;
use crate::protocol::{FrameReceiver, ResponseDispatcher};
use crate::serial::SerialChannel;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Coordinates the capture/classify/actuate loop.
///
/// Owns the serial channel exclusively: the receiver and dispatcher borrow
/// it for the duration of their step, so the device only ever holds one
/// conversation at a time. Dropping the orchestrator releases the port.
pub struct PlantguardOrchestrator<C: SerialChannel> {
    pub(super) channel: C,
    pub(super) store: FrameStore,
    pub(super) receiver: FrameReceiver,
    pub(super) dispatcher: ResponseDispatcher,
    pub(super) classifier: ClassificationClient,
    pub(super) cycle_delay: Duration,
    pub(super) error_backoff: Duration,
    pub(super) cancellation_token: CancellationToken,
}

impl<C: SerialChannel> PlantguardOrchestrator<C> {
    /// Build an orchestrator around an already-open serial channel.
    pub async fn new(config: PlantguardConfig, channel: C) -> Result<Self> {
        let store = FrameStore::new(&config.capture.path).await?;
        let poll_timeout = Duration::from_millis(config.serial.poll_timeout_ms);
        let receiver = FrameReceiver::new(&config.protocol, poll_timeout);
        let dispatcher = ResponseDispatcher::new(&config.protocol);
        let classifier = ClassificationClient::new(&config.classifier)?;

        Ok(Self {
            channel,
            store,
            receiver,
            dispatcher,
            classifier,
            cycle_delay: Duration::from_secs(config.runtime.cycle_delay_secs),
            error_backoff: Duration::from_secs(config.runtime.error_backoff_secs),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Token that ends the run loop at its next top-of-loop check.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
