use super::{Component, ComponentState, OwlwatchOrchestrator, SampleSource, ShutdownReason};
use crate::error::{OwlwatchError, Result};
use crate::events::OwlwatchEvent;
use chrono::Utc;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info, warn};

impl OwlwatchOrchestrator {
    /// Run detection cycles until the source is exhausted, a signal arrives
    /// or shutdown is requested, then shut down gracefully.
    pub async fn run<S: SampleSource>(&mut self, mut source: S) -> Result<i32> {
        info!("Owlwatch system is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| OwlwatchError::system("Shutdown sender already taken"))?;
        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| OwlwatchError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;
        self.set_component_state(Component::Detection, ComponentState::Running)
            .await;

        let reason = tokio::select! {
            reason = self.detection_loop(&mut source) => reason,
            received = &mut shutdown_receiver => received.map_err(|_| {
                OwlwatchError::system("Shutdown channel closed unexpectedly")
            })?,
        };

        info!("Shutdown initiated: {:?}", reason);
        self.event_bus.emit(OwlwatchEvent::ShutdownRequested {
            timestamp: Utc::now(),
            reason: format!("{:?}", reason),
        });

        let exit_code = self.shutdown(&reason).await?;
        info!("Owlwatch system shutdown complete");
        Ok(exit_code)
    }

    /// One cycle per tick. Source errors cost one cycle, never the loop.
    async fn detection_loop<S: SampleSource>(&self, source: &mut S) -> ShutdownReason {
        // A zero interval replays back to back
        let mut ticker = (!self.cycle_interval.is_zero()).then(|| {
            let mut ticker = tokio::time::interval(self.cycle_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    return ShutdownReason::UserRequest;
                }
                _ = next_tick(&mut ticker) => {}
            }

            match source.next_cycle().await {
                Ok(Some(samples)) => {
                    let report = self.process_cycle(&samples);
                    if report.errors > 0 {
                        warn!(
                            "Cycle {} had {} camera errors",
                            report.cycle, report.errors
                        );
                    }
                }
                Ok(None) => {
                    info!(
                        "Sample source exhausted after {} cycles",
                        self.cycles_completed()
                    );
                    return ShutdownReason::SourceExhausted;
                }
                Err(e) => {
                    error!("Failed to read detection samples: {}", e);
                    self.event_bus.emit(OwlwatchEvent::SystemError {
                        component: "sample_source".to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}
