use super::types::{Component, ComponentState, CycleReport, ShutdownReason};
use crate::alerts::{
    AlertCoordinator, AlertRequest, AlertStore, JsonLinesAlertStore, LogTransport,
    MemoryAlertStore, NotificationTransport,
};
use crate::config::OwlwatchConfig;
use crate::detection::{
    DetectionEngine, DetectionSample, Evaluation, FrameHistoryStore, ParameterSelector,
};
use crate::error::Result;
use crate::events::{EventBus, OwlwatchEvent};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Main application coordinator: drives detection cycles and owns the alert
/// pipeline for the lifetime of the process.
pub struct OwlwatchOrchestrator {
    pub(super) config: OwlwatchConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) engine: DetectionEngine,
    pub(super) coordinator: Arc<AlertCoordinator>,

    pub(super) cycle_interval: Duration,
    pub(super) dry_run: bool,
    pub(super) stats_output: Option<PathBuf>,
    pub(super) cycles: AtomicU64,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<BTreeMap<Component, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl OwlwatchOrchestrator {
    /// Create an orchestrator with the transports and store the config asks for
    pub fn new(config: OwlwatchConfig) -> Result<Self> {
        let store: Arc<dyn AlertStore> = match &config.notification.alert_log_path {
            Some(path) => {
                info!("Alert records will be appended to {}", path);
                Arc::new(JsonLinesAlertStore::new(path))
            }
            None => Arc::new(MemoryAlertStore::new()),
        };

        if config.notification.recipients.is_empty() {
            warn!("No notification recipients configured, alerts will only be logged");
        }
        let transports: Vec<Arc<dyn NotificationTransport>> = vec![Arc::new(LogTransport::new(
            config.notification.recipients.clone(),
        ))];

        Self::with_components(config, transports, store)
    }

    /// Create an orchestrator around caller-supplied transports and store
    pub fn with_components(
        config: OwlwatchConfig,
        transports: Vec<Arc<dyn NotificationTransport>>,
        store: Arc<dyn AlertStore>,
    ) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let selector = Arc::new(ParameterSelector::from_config(&config));
        let history = Arc::new(FrameHistoryStore::new());
        let engine = DetectionEngine::new(Arc::clone(&selector), history);

        let coordinator = Arc::new(AlertCoordinator::new(
            &config.alerts,
            &config.notification,
            selector,
            transports,
            store,
            Arc::clone(&event_bus),
        ));

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let cycle_interval = Duration::from_secs(config.detection.cycle_interval_seconds);

        info!(
            "Orchestrator created for cameras {:?} (cycle every {:?})",
            engine.selector().camera_ids(),
            cycle_interval
        );

        Ok(Self {
            config,
            event_bus,
            engine,
            coordinator,
            cycle_interval,
            dry_run: false,
            stats_output: None,
            cycles: AtomicU64::new(0),
            component_states: Arc::new(Mutex::new(BTreeMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Score and log presence without sending alerts
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Override the configured cycle interval (replays)
    pub fn set_cycle_interval(&mut self, interval: Duration) {
        self.cycle_interval = interval;
    }

    /// Write alert statistics as JSON here on shutdown
    pub fn set_stats_output(&mut self, path: Option<PathBuf>) {
        self.stats_output = path;
    }

    pub fn config(&self) -> &OwlwatchConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn coordinator(&self) -> Arc<AlertCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Clock for a batch: the newest capture time, so replays keep their
    /// original spacing.
    pub(super) fn cycle_clock(samples: &[DetectionSample]) -> DateTime<Utc> {
        samples
            .iter()
            .map(|sample| sample.captured_at)
            .max()
            .unwrap_or_else(Utc::now)
    }

    pub fn process_cycle(&self, samples: &[DetectionSample]) -> CycleReport {
        self.process_cycle_at(samples, Self::cycle_clock(samples))
    }

    /// Run every camera's sample through detection and alerting. Cameras are
    /// independent; one failing never stops the others.
    pub fn process_cycle_at(&self, samples: &[DetectionSample], now: DateTime<Utc>) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = CycleReport {
            cycle,
            cameras: samples.len(),
            ..CycleReport::default()
        };

        for sample in samples {
            let scored = match self.engine.evaluate_at(sample, now) {
                Ok(Evaluation::Scored(scored)) => scored,
                Ok(Evaluation::Skipped) => {
                    report.skipped += 1;
                    self.event_bus.emit(OwlwatchEvent::CycleSkipped {
                        camera_id: sample.camera_id.clone(),
                        lighting: sample.lighting,
                        timestamp: now,
                    });
                    continue;
                }
                Err(e) => {
                    report.errors += 1;
                    warn!("Camera '{}' skipped this cycle: {}", sample.camera_id, e);
                    self.event_bus.emit(OwlwatchEvent::SystemError {
                        component: format!("camera:{}", sample.camera_id),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if !scored.present {
                continue;
            }
            report.present += 1;

            self.event_bus.emit(OwlwatchEvent::PresenceDetected {
                camera_id: sample.camera_id.clone(),
                alert_type: scored.alert_type,
                confidence: scored.breakdown.total,
                consecutive_frames: scored.breakdown.consecutive_frames,
                timestamp: now,
            });

            if self.dry_run {
                info!(
                    "Dry run: would alert '{}' for camera '{}'",
                    scored.alert_type, sample.camera_id
                );
                continue;
            }

            let request = AlertRequest::presence(
                sample.camera_id.clone(),
                scored.alert_type,
                scored.breakdown,
                scored.bundle.lighting,
            )
            .with_image_url(sample.image_url.clone());

            if self.coordinator.process_at(request, now) {
                report.alerts_sent += 1;
            }
        }

        let finalized = self.coordinator.sweep_at(now);
        if !finalized.is_empty() {
            debug!("Finalized idle alert sessions: {:?}", finalized);
        }

        self.event_bus.emit(OwlwatchEvent::CycleCompleted {
            cycle,
            cameras: report.cameras,
            timestamp: now,
        });

        debug!("Cycle {} complete: {:?}", cycle, report);
        report
    }

    /// Ask the run loop to stop after the current cycle
    pub fn request_shutdown(&self) {
        info!("Shutdown requested by user");
        self.cancellation_token.cancel();
    }
}
