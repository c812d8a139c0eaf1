use super::{Component, ComponentState, OwlwatchOrchestrator, ShutdownReason};
use crate::alerts::AlertStatistics;
use crate::error::{OwlwatchError, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

impl OwlwatchOrchestrator {
    /// Stop the loop, drain dispatches and report the session
    pub async fn shutdown(&self, reason: &ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();
        self.set_component_state(Component::Detection, ComponentState::Stopped)
            .await;

        let mut exit_code = match reason {
            ShutdownReason::Error(_) => 1,
            _ => 0,
        };

        self.set_component_state(Component::Dispatch, ComponentState::Stopping)
            .await;
        let grace = Duration::from_secs(self.config.alerts.dispatch_grace_seconds);
        if self.coordinator.shutdown(grace).await {
            self.set_component_state(Component::Dispatch, ComponentState::Stopped)
                .await;
        } else {
            // Abandoned deliveries are logged, not fatal
            self.set_component_state(Component::Dispatch, ComponentState::Failed)
                .await;
        }

        let failed = self.failed_components().await;
        if !failed.is_empty() {
            warn!("Components ended in a failed state: {:?}", failed);
        }

        self.coordinator.sweep();
        let statistics = self.coordinator.get_alert_statistics();
        log_statistics(&statistics);

        if let Some(path) = &self.stats_output {
            if let Err(e) = write_statistics(path, &statistics).await {
                error!("Error writing alert statistics: {}", e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}

fn log_statistics(statistics: &AlertStatistics) {
    info!(
        "Session since {}: {} alerts, {}s of owl activity",
        statistics.session_start,
        statistics.total_count(),
        statistics.total_duration_seconds()
    );
    for entry in statistics.alerts.iter().filter(|entry| entry.count > 0) {
        info!(
            "  {}: {} sent, {} suppressed, {}s, {} recipients",
            entry.alert_type,
            entry.count,
            entry.suppressed_count,
            entry.duration_seconds,
            entry.delivered_recipients
        );
    }
    if statistics.total_count() == 0 {
        warn!("No alerts were sent this session");
    }
}

/// Write the statistics report as pretty JSON
pub(super) async fn write_statistics(path: &Path, statistics: &AlertStatistics) -> Result<()> {
    let json = serde_json::to_string_pretty(statistics)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OwlwatchError::component(
                    "statistics".to_string(),
                    format!("Failed to create directory {}: {}", parent.display(), e),
                )
            })?;
        }
    }

    tokio::fs::write(path, json).await.map_err(|e| {
        OwlwatchError::component(
            "statistics".to_string(),
            format!("Failed to write {}: {}", path.display(), e),
        )
    })?;

    info!("Alert statistics written to {}", path.display());
    Ok(())
}
