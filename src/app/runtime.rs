use super::orchestrator::PlantguardOrchestrator;
use super::types::{CycleOutcome, ShutdownReason};
use crate::classifier::{ClassificationResult, HealthStatus};
use crate::error::{PlantguardError, Result};
use crate::protocol::{DeviceCommand, FrameCapture};
use crate::serial::SerialChannel;
use std::time::Duration;
use tokio::signal;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Cycle phases. `Idle` lives in the caller between passes; the other
/// phases advance inside `run_cycle`, each carrying its input forward.
enum CycleState {
    AwaitFrame,
    Classify(FrameCapture),
    Actuate(ClassificationResult),
    Done(CycleOutcome),
}

impl<C: SerialChannel> PlantguardOrchestrator<C> {
    /// Run the capture/classify/actuate loop until an interrupt arrives.
    ///
    /// Cancellation is honored only at the top of the loop: a cycle in
    /// flight always completes, since frame loss is survivable but an
    /// in-progress write to the device must finish.
    pub async fn run(&mut self) -> Result<i32> {
        info!("plant health monitor running");
        self.spawn_signal_handlers();

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            match self.run_cycle().await {
                Ok(outcome) => {
                    debug!(?outcome, "cycle complete");
                    self.idle(self.cycle_delay).await;
                }
                Err(e) => {
                    error!("cycle failed: {}", e);
                    self.idle(self.error_backoff).await;
                }
            }
        }

        info!("shutdown complete, serial channel released");
        Ok(0)
    }

    /// One pass through the cycle state machine.
    pub(super) async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let mut state = CycleState::AwaitFrame;
        loop {
            state = match state {
                CycleState::AwaitFrame => {
                    match self.receiver.receive(&mut self.channel, &self.store).await {
                        Ok(frame) => CycleState::Classify(frame),
                        Err(PlantguardError::Protocol(reason)) => {
                            warn!(%reason, "no frame this cycle, retrying after delay");
                            CycleState::Done(CycleOutcome::Skipped)
                        }
                        Err(other) => return Err(other),
                    }
                }
                CycleState::Classify(frame) => {
                    let result = self.classifier.classify(&frame.path).await;
                    info!(
                        status = result.status.as_str(),
                        confidence = result.confidence,
                        "classification result"
                    );
                    CycleState::Actuate(result)
                }
                CycleState::Actuate(result) => {
                    let commanded = match result.status {
                        HealthStatus::Healthy => {
                            self.dispatcher
                                .send(&mut self.channel, DeviceCommand::Healthy)
                                .await?;
                            true
                        }
                        HealthStatus::Unhealthy => {
                            self.dispatcher
                                .send(&mut self.channel, DeviceCommand::Unhealthy)
                                .await?;
                            true
                        }
                        HealthStatus::Unknown => {
                            info!("indeterminate classification, no command sent");
                            false
                        }
                    };
                    CycleState::Done(CycleOutcome::Classified {
                        status: result.status,
                        commanded,
                    })
                }
                CycleState::Done(outcome) => return Ok(outcome),
            };
        }
    }

    /// Inter-cycle delay. Cut short on cancellation: nothing is in flight
    /// while idling, so this does not violate the no-mid-cycle-cancel rule.
    async fn idle(&self, delay: Duration) {
        tokio::select! {
            _ = sleep(delay) => {}
            _ = self.cancellation_token.cancelled() => {}
        }
    }

    /// Set up signal handlers for graceful shutdown
    fn spawn_signal_handlers(&self) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                if sigterm.recv().await.is_some() {
                    info!(
                        reason = ?ShutdownReason::Signal("SIGTERM".to_string()),
                        "shutdown requested"
                    );
                    token.cancel();
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!(
                    reason = ?ShutdownReason::Signal("SIGINT".to_string()),
                    "shutdown requested"
                );
                token.cancel();
            }
        });
    }
}
